use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for one pipeline run, kept in a run-scoped registry.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    statements: IntCounterVec,
    slow_queries: IntCounter,
    fanout_tasks: IntCounter,
    collected_records: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let statements = IntCounterVec::new(
            Opts::new("ce_bench_statements_total", "Statements handled by workers"),
            &["status"],
        )?;
        let slow_queries = IntCounter::new(
            "ce_bench_slow_queries_total",
            "Statements exceeding the slow query threshold",
        )?;
        let fanout_tasks = IntCounter::new(
            "ce_bench_fanout_tasks_total",
            "Count statements derived from trace payloads",
        )?;
        let collected_records = IntCounter::new(
            "ce_bench_collected_records_total",
            "Estimation records collected from terminal results",
        )?;

        registry.register(Box::new(statements.clone()))?;
        registry.register(Box::new(slow_queries.clone()))?;
        registry.register(Box::new(fanout_tasks.clone()))?;
        registry.register(Box::new(collected_records.clone()))?;

        Ok(Self {
            registry,
            statements,
            slow_queries,
            fanout_tasks,
            collected_records,
        })
    }

    pub fn record_statement(&self, status: &str) {
        self.statements.with_label_values(&[status]).inc();
    }

    pub fn record_slow_query(&self) {
        self.slow_queries.inc();
    }

    pub fn record_fanout(&self, count: u64) {
        self.fanout_tasks.inc_by(count);
    }

    pub fn record_collected(&self) {
        self.collected_records.inc();
    }

    pub fn statements(&self, status: &str) -> u64 {
        self.statements.with_label_values(&[status]).get()
    }

    pub fn slow_queries(&self) -> u64 {
        self.slow_queries.get()
    }

    pub fn fanout_tasks(&self) -> u64 {
        self.fanout_tasks.get()
    }

    pub fn collected_records(&self) -> u64 {
        self.collected_records.get()
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("executed", &self.statements("executed"))
            .field("slow_queries", &self.slow_queries())
            .field("fanout_tasks", &self.fanout_tasks())
            .field("collected_records", &self.collected_records())
            .finish()
    }
}
