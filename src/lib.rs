pub mod config;
pub mod context;
pub mod error;
pub mod estimation;
pub mod expander;
pub mod instance;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod statement;
pub mod task;
pub mod worker;

pub use config::{BenchConfig, InstanceConfig};
pub use context::RunContext;
pub use error::{Error, Result};
pub use estimation::{
    dedup, p_error, q_error, EstimationRecord, EstimationStore, EstimationSummary, Histogram,
    PercentileStats,
};
pub use instance::{Instance, Row};
pub use pipeline::{run_instances, Pipeline, RunSummary};
pub use report::{write_report, ChartRenderer, ReportOptions, SvgChart};
pub use statement::{Statement, StatementKind, TraceRecord};
pub use task::{QueryResult, Task, TaskQueue};
pub use worker::{WorkerPool, WorkerStats};
