#![allow(dead_code)]

use ce_bench::statement::TRACE_PREFIX;
use ce_bench::{Error, Instance, Result, Row, TraceRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

/// In-memory instance answering trace probes and count queries from fixtures.
#[derive(Default)]
pub struct MockInstance {
    dsn: String,
    traces: HashMap<String, String>,
    counts: HashMap<String, u64>,
    fail_on: Option<String>,
    panic_on: Option<String>,
    delay: Option<Duration>,
    executed: Mutex<Vec<String>>,
}

impl MockInstance {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            ..Default::default()
        }
    }

    /// Answer the trace probe of `query` with `records`.
    pub fn with_trace(mut self, query: &str, records: Vec<TraceRecord>) -> Self {
        let payload = serde_json::to_string(&records).unwrap();
        self.traces.insert(query.to_string(), payload);
        self
    }

    /// Answer the trace probe of `query` with a raw payload.
    pub fn with_raw_trace(mut self, query: &str, payload: &str) -> Self {
        self.traces.insert(query.to_string(), payload.to_string());
        self
    }

    /// Rows matching `expr` when counted.
    pub fn with_count(mut self, expr: &str, actual: u64) -> Self {
        self.counts.insert(expr.to_string(), actual);
        self
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Panic instead of answering statements containing `needle`.
    pub fn panicking_on(mut self, needle: &str) -> Self {
        self.panic_on = Some(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

impl Instance for MockInstance {
    fn dsn(&self) -> &str {
        &self.dsn
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.executed.lock().push(sql.to_string());
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if let Some(needle) = &self.panic_on {
            if sql.contains(needle.as_str()) {
                panic!("instance crashed on {sql}");
            }
        }
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(Error::query(sql, "injected failure"));
            }
        }

        if let Some(query) = sql.strip_prefix(TRACE_PREFIX) {
            let payload = self.traces.get(query).cloned().unwrap_or_else(|| "[]".into());
            return Ok(vec![vec![payload]]);
        }

        if sql.starts_with("SELECT COUNT(*) FROM") {
            let expr = sql.split(" WHERE ").nth(1).unwrap_or("");
            let count = self.counts.get(expr).copied().unwrap_or(0);
            return Ok(vec![vec![count.to_string()]]);
        }

        Ok(Vec::new())
    }
}

pub fn trace(table: &str, kind: &str, expr: &str, row_count: u64) -> TraceRecord {
    TraceRecord {
        table_name: table.to_string(),
        kind: kind.to_string(),
        expr: expr.to_string(),
        row_count,
    }
}

/// Instance returning one row per statement immediately.
pub struct EchoInstance;

impl Instance for EchoInstance {
    fn dsn(&self) -> &str {
        "echo"
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(vec![vec![sql.to_string()]])
    }
}
