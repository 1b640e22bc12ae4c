use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query failed: {sql}: {message}")]
    Query { sql: String, message: String },

    #[error("Malformed trace payload: {0}")]
    MalformedTrace(String),

    #[error("Malformed count result: {0}")]
    MalformedCount(String),

    #[error("Task queue is closed")]
    QueueClosed,

    #[error("Task queue was already closed")]
    QueueAlreadyClosed,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    pub fn query(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query {
            sql: sql.into(),
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Error::Io(_) => -1,
            Error::Json(_) => -2,
            Error::Config(_) => -3,
            Error::Query { .. } => -4,
            Error::MalformedTrace(_) => -5,
            Error::MalformedCount(_) => -6,
            Error::QueueClosed => -7,
            Error::QueueAlreadyClosed => -8,
            Error::Worker(_) => -9,
            Error::Report(_) => -10,
            Error::Metrics(_) => -11,
        }
    }

    /// Setup errors are raised before any pipeline thread is started.
    pub fn is_setup_error(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Json(_) | Error::Config(_))
    }
}
