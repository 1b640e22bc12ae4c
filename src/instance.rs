use crate::error::Result;

/// One returned row, columns in select-list order.
pub type Row = Vec<String>;

/// A database instance the pipeline can execute statements against.
///
/// Connection handling lives behind this trait. Implementations must be safe
/// to share between worker threads; each worker calls `execute` concurrently.
pub trait Instance: Send + Sync {
    /// Data source name identifying the instance, used in logs.
    fn dsn(&self) -> &str;

    /// Execute `sql` and return every row it produced.
    fn execute(&self, sql: &str) -> Result<Vec<Row>>;
}
