//! State shared by every stage of one pipeline run.

use crate::config::BenchConfig;
use crate::error::{Error, Result};
use crate::metrics::PipelineMetrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;

pub struct RunContext {
    config: BenchConfig,
    producer_count: usize,
    exited_producers: AtomicUsize,
    aborted: AtomicBool,
    failure: Mutex<Option<Error>>,
    metrics: PipelineMetrics,
}

impl RunContext {
    pub fn new(config: BenchConfig, producer_count: usize) -> Result<Arc<Self>> {
        config.validate()?;
        if producer_count == 0 {
            return Err(Error::Config("A run needs at least one producer".into()));
        }

        Ok(Arc::new(Self {
            config,
            producer_count,
            exited_producers: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            metrics: PipelineMetrics::new()?,
        }))
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn producer_count(&self) -> usize {
        self.producer_count
    }

    /// Record one producer shutdown and return the number exited so far.
    pub fn producer_exited(&self) -> usize {
        self.exited_producers.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn exited_producers(&self) -> usize {
        self.exited_producers.load(Ordering::Acquire)
    }

    /// Abort the run. Only the first error is kept.
    pub fn fail(&self, err: Error) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            error!(error = %err, code = err.error_code(), "Aborting run");
            *failure = Some(err);
        }
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn take_failure(&self) -> Option<Error> {
        self.failure.lock().take()
    }
}
