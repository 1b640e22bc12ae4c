//! Statements flowing through the pipeline and the helpers that produce them
//! from raw SQL text.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Prefix turning a plain read query into an estimation trace probe.
pub const TRACE_PREFIX: &str = "TRACE PLAN TARGET = 'estimation' ";

/// One estimator decision reported by a trace probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub table_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub expr: String,
    pub row_count: u64,
}

impl TraceRecord {
    /// Query counting the rows this decision was estimating.
    pub fn count_sql(&self) -> String {
        let expr = self.expr.trim();
        if expr.is_empty() {
            format!("SELECT COUNT(*) FROM {}", self.table_name)
        } else {
            format!("SELECT COUNT(*) FROM {} WHERE {}", self.table_name, expr)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Executed verbatim, carries no estimation signal.
    Plain(String),
    /// Returns a JSON payload of trace records.
    TraceProbe(String),
    /// Counts the actual rows behind one trace record.
    ActualCount(TraceRecord),
}

impl Statement {
    pub fn to_sql(&self) -> Cow<'_, str> {
        match self {
            Statement::Plain(sql) | Statement::TraceProbe(sql) => Cow::Borrowed(sql),
            Statement::ActualCount(record) => Cow::Owned(record.count_sql()),
        }
    }

    pub fn carries_trace(&self) -> bool {
        matches!(self, Statement::TraceProbe(_))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// How the provider treats a statement read from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    TraceProbe,
    ReadQuery,
    Destructive,
    SchemaCreate,
    Other,
}

impl StatementKind {
    pub fn classify(sql: &str) -> Self {
        let head: String = sql
            .trim_start()
            .chars()
            .take(8)
            .collect::<String>()
            .to_ascii_lowercase();

        if head.starts_with("trace") {
            StatementKind::TraceProbe
        } else if head.starts_with("select") {
            StatementKind::ReadQuery
        } else if head.starts_with("drop") || head.starts_with("truncate") {
            StatementKind::Destructive
        } else if head.starts_with("create") {
            StatementKind::SchemaCreate
        } else {
            StatementKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::TraceProbe => "trace_probe",
            StatementKind::ReadQuery => "read_query",
            StatementKind::Destructive => "destructive",
            StatementKind::SchemaCreate => "schema_create",
            StatementKind::Other => "other",
        }
    }

    /// Wrap `sql` into the statement the workers will execute.
    pub fn into_statement(self, sql: String) -> Statement {
        match self {
            StatementKind::TraceProbe => Statement::TraceProbe(sql),
            StatementKind::ReadQuery => Statement::TraceProbe(format!("{TRACE_PREFIX}{sql}")),
            StatementKind::Destructive | StatementKind::SchemaCreate | StatementKind::Other => {
                Statement::Plain(sql)
            }
        }
    }
}

/// Split a source into statements at every `;` not preceded by `\`.
///
/// Quoted literals are not recognised, so a `;` inside a string splits it.
pub fn split_statements(source: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in source.chars() {
        if ch == ';' && !escaped {
            push_trimmed(&mut statements, &current);
            current.clear();
        } else {
            current.push(ch);
        }
        escaped = ch == '\\' && !escaped;
    }
    push_trimmed(&mut statements, &current);

    statements
}

fn push_trimmed(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
