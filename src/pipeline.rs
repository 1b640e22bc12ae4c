//! Wires provider, expander, worker pool and aggregator for one instance.

use crate::config::BenchConfig;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::estimation::{EstimationRecord, EstimationStore};
use crate::expander::{ExpanderStats, TraceExpander};
use crate::instance::Instance;
use crate::metrics::PipelineMetrics;
use crate::provider::{ProviderStats, StatementProvider};
use crate::task::{QueryResult, TaskQueue};
use crate::worker::{WorkerPool, WorkerStats};
use crossbeam::channel::{unbounded, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// The statement provider and the trace expander.
pub const PRODUCER_COUNT: usize = 2;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub provider: ProviderStats,
    pub expander: ExpanderStats,
    pub workers: WorkerStats,
    pub records: usize,
    pub elapsed: Duration,
    pub metrics: PipelineMetrics,
}

/// Runs every statement of `sources` against `instance` and appends the
/// resulting estimation records to `store`.
pub struct Pipeline {
    instance: Arc<dyn Instance>,
    concurrency: usize,
    ctx: Arc<RunContext>,
}

impl Pipeline {
    pub fn new(instance: Arc<dyn Instance>, concurrency: usize, config: BenchConfig) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::Config(format!(
                "Instance {} must have a concurrency of at least 1",
                instance.dsn()
            )));
        }
        let ctx = RunContext::new(config, PRODUCER_COUNT)?;
        Ok(Self {
            instance,
            concurrency,
            ctx,
        })
    }

    pub fn run(self, sources: Vec<String>, store: &EstimationStore) -> Result<RunSummary> {
        let start = Instant::now();
        let ctx = &self.ctx;
        let queue = TaskQueue::bounded(ctx.config().queue_capacity);
        let (raw_tx, raw_rx) = unbounded();
        let (final_tx, final_rx) = unbounded();

        let provider = StatementProvider::new(queue.sender()?, raw_tx, Arc::clone(ctx));
        let expander = TraceExpander::new(queue.sender()?, raw_rx, final_tx, Arc::clone(ctx));

        let pool = WorkerPool::start(
            Arc::clone(&self.instance),
            Arc::clone(&queue),
            self.concurrency,
            Arc::clone(ctx),
        )?;
        let provider_handle = match spawn_stage("ce-provider", move || provider.run(sources)) {
            Ok(handle) => handle,
            Err(err) => {
                drop(expander);
                return Err(abandon_start(ctx, &queue, pool, None, err));
            }
        };
        let expander_handle = match spawn_stage("ce-expander", move || expander.run()) {
            Ok(handle) => handle,
            Err(err) => return Err(abandon_start(ctx, &queue, pool, Some(provider_handle), err)),
        };

        let records = self.aggregate(final_rx, store);

        let provider_stats = join_stage(provider_handle);
        let expander_stats = join_stage(expander_handle);
        let workers = pool.join();

        if let Some(err) = ctx.take_failure() {
            error!(dsn = self.instance.dsn(), error = %err, "Run failed");
            return Err(err);
        }

        let summary = RunSummary {
            provider: provider_stats?,
            expander: expander_stats?,
            workers: workers?,
            records,
            elapsed: start.elapsed(),
            metrics: ctx.metrics().clone(),
        };
        info!(
            dsn = self.instance.dsn(),
            records = summary.records,
            executed = summary.workers.executed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run finished"
        );
        Ok(summary)
    }

    /// Drain terminal results until every producer has shut down.
    fn aggregate(&self, results: Receiver<QueryResult>, store: &EstimationStore) -> usize {
        let mut collected = 0;
        for result in results {
            if self.ctx.is_aborted() {
                continue;
            }
            match EstimationRecord::from_result(&result) {
                Ok(record) => {
                    store.push(record);
                    self.ctx.metrics().record_collected();
                    collected += 1;
                }
                Err(err) => self.ctx.fail(err),
            }
        }
        collected
    }
}

fn spawn_stage<T, F>(name: &str, stage: F) -> Result<JoinHandle<Result<T>>>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_string()).spawn(stage)?)
}

/// Release already running threads after a stage failed to start.
///
/// Aborting makes a running provider stop reading and emit its shutdown; closing
/// the queue lets the workers leave once that provider is gone.
fn abandon_start(
    ctx: &RunContext,
    queue: &TaskQueue,
    pool: WorkerPool,
    provider: Option<JoinHandle<Result<ProviderStats>>>,
    err: Error,
) -> Error {
    error!(error = %err, "Pipeline stage failed to start");
    ctx.fail(Error::Worker(format!("pipeline start: {err}")));
    let _ = queue.close();
    if let Some(handle) = provider {
        let _ = join_stage(handle);
    }
    let _ = pool.join();
    err
}

fn join_stage<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::Worker("pipeline stage panicked".into()))?
}

/// Run one pipeline per instance concurrently over the same sources.
///
/// Records from every instance land in one store; the first failing instance
/// decides the returned error.
pub fn run_instances(
    instances: Vec<(Arc<dyn Instance>, usize)>,
    sources: Vec<String>,
    config: &BenchConfig,
) -> Result<Vec<EstimationRecord>> {
    let pipelines = instances
        .into_iter()
        .map(|(instance, concurrency)| Pipeline::new(instance, concurrency, config.clone()))
        .collect::<Result<Vec<_>>>()?;

    let store = EstimationStore::new();
    let outcomes: Vec<Result<RunSummary>> = thread::scope(|scope| {
        let handles: Vec<_> = pipelines
            .into_iter()
            .map(|pipeline| {
                let sources = sources.clone();
                let store = &store;
                scope.spawn(move || pipeline.run(sources, store))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| Error::Worker("pipeline panicked".into()))
                    .and_then(|outcome| outcome)
            })
            .collect()
    });

    for outcome in outcomes {
        outcome?;
    }
    Ok(store.drain(config.dedup))
}
