//! Worker pool draining the shared task queue.
//!
//! Each shutdown task marks one producer as exited. The worker that observes the
//! last producer exit closes the queue; the others leave once the queue
//! disconnects.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::instance::{Instance, Row};
use crate::task::{QueryResult, Task, TaskQueue};
use crossbeam::channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub executed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub slow: u64,
    pub shutdowns: u64,
    /// Set on the worker that closed the queue.
    pub closed_queue: bool,
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.executed += other.executed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.slow += other.slow;
        self.shutdowns += other.shutdowns;
        self.closed_queue |= other.closed_queue;
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    pub fn start(
        instance: Arc<dyn Instance>,
        queue: Arc<TaskQueue>,
        concurrency: usize,
        ctx: Arc<RunContext>,
    ) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::Config("Worker pool needs at least 1 worker".into()));
        }

        let mut handles = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let worker = Worker {
                id: worker_id,
                instance: Arc::clone(&instance),
                receiver: queue.receiver(),
                queue: Arc::clone(&queue),
                ctx: Arc::clone(&ctx),
                stats: WorkerStats::default(),
            };
            let spawned = thread::Builder::new()
                .name(format!("ce-worker-{worker_id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Workers already running leave once the producers drop their senders.
                    let _ = queue.close();
                    return Err(err.into());
                }
            }
        }

        info!(dsn = instance.dsn(), workers = concurrency, "Worker pool started");
        Ok(Self { handles })
    }

    /// Wait for every worker and merge their statistics.
    pub fn join(self) -> Result<WorkerStats> {
        let mut total = WorkerStats::default();
        for handle in self.handles {
            let stats = handle
                .join()
                .map_err(|_| Error::Worker("worker thread panicked".into()))?;
            total.merge(stats);
        }
        Ok(total)
    }
}

struct Worker {
    id: usize,
    instance: Arc<dyn Instance>,
    receiver: Receiver<Task>,
    queue: Arc<TaskQueue>,
    ctx: Arc<RunContext>,
    stats: WorkerStats,
}

impl Worker {
    fn run(mut self) -> WorkerStats {
        debug!("Worker {} started", self.id);

        while let Ok(task) = self.receiver.recv() {
            match task {
                Task::Shutdown { result_sink } => {
                    drop(result_sink);
                    self.stats.shutdowns += 1;

                    let exited = self.ctx.producer_exited();
                    debug!(worker = self.id, exited, "Producer shut down");
                    if exited == self.ctx.producer_count() {
                        match self.queue.close() {
                            Ok(()) => {
                                self.stats.closed_queue = true;
                                info!(worker = self.id, "All producers exited, task queue closed");
                            }
                            Err(err) => self.ctx.fail(err),
                        }
                        break;
                    }
                }
                Task::Execute {
                    statement,
                    result_sink,
                    completion,
                } => {
                    if self.ctx.is_aborted() {
                        self.stats.skipped += 1;
                        self.ctx.metrics().record_statement("skipped");
                    } else {
                        let sql = statement.to_sql().into_owned();
                        let start = Instant::now();
                        let outcome = self.execute(&sql);
                        let elapsed = start.elapsed();

                        if elapsed > self.ctx.config().slow_query_threshold() {
                            self.stats.slow += 1;
                            self.ctx.metrics().record_slow_query();
                            warn!(
                                worker = self.id,
                                duration_ms = elapsed.as_millis() as u64,
                                sql = %sql,
                                "Slow query"
                            );
                        }

                        match outcome {
                            Ok(rows) => {
                                self.stats.executed += 1;
                                self.ctx.metrics().record_statement("executed");
                                // The consumer may already be gone once the run aborted.
                                let _ = result_sink.send(QueryResult { statement, rows });
                            }
                            Err(err) => {
                                self.stats.failed += 1;
                                self.ctx.metrics().record_statement("failed");
                                self.ctx.fail(err);
                            }
                        }
                    }

                    if let Some(done) = completion {
                        let _ = done.send(());
                    }
                }
            }
        }

        debug!("Worker {} stopped", self.id);
        self.stats
    }

    /// Run `sql` on the instance. A panicking instance becomes a worker error so
    /// the completion is still acknowledged.
    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.instance.execute(sql))).unwrap_or_else(
            |payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|msg| msg.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(Error::Worker(format!("instance panicked on {sql}: {reason}")))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchConfig;
    use crate::statement::Statement;
    use crossbeam::channel::unbounded;

    struct EchoInstance;

    impl Instance for EchoInstance {
        fn dsn(&self) -> &str {
            "echo"
        }

        fn execute(&self, sql: &str) -> Result<Vec<Row>> {
            if sql.contains("fail") {
                return Err(Error::query(sql, "forced failure"));
            }
            Ok(vec![vec![sql.to_string()]])
        }
    }

    fn start(concurrency: usize, producers: usize) -> (Arc<TaskQueue>, Arc<RunContext>, WorkerPool) {
        let queue = TaskQueue::bounded(16);
        let ctx = RunContext::new(BenchConfig::default(), producers).unwrap();
        let pool = WorkerPool::start(
            Arc::new(EchoInstance),
            Arc::clone(&queue),
            concurrency,
            Arc::clone(&ctx),
        )
        .unwrap();
        (queue, ctx, pool)
    }

    #[test]
    fn test_single_producer_round_trip() {
        let (queue, ctx, pool) = start(3, 1);
        let sender = queue.sender().unwrap();
        let (result_sink, results) = unbounded();

        for i in 0..10 {
            sender
                .send(Task::Execute {
                    statement: Statement::Plain(format!("select {i}")),
                    result_sink: result_sink.clone(),
                    completion: None,
                })
                .unwrap();
        }
        sender.send(Task::Shutdown { result_sink }).unwrap();
        drop(sender);

        let collected: Vec<QueryResult> = results.iter().collect();
        let stats = pool.join().unwrap();

        assert_eq!(collected.len(), 10);
        assert_eq!(stats.executed, 10);
        assert!(stats.closed_queue);
        assert!(queue.is_closed());
        assert!(ctx.take_failure().is_none());
    }

    #[test]
    fn test_failure_aborts_run_and_skips_remaining() {
        let (queue, ctx, pool) = start(1, 1);
        let sender = queue.sender().unwrap();
        let (result_sink, results) = unbounded();
        let (done, acks) = unbounded();

        for sql in ["select 1", "select fail", "select 2"] {
            sender
                .send(Task::Execute {
                    statement: Statement::Plain(sql.into()),
                    result_sink: result_sink.clone(),
                    completion: Some(done.clone()),
                })
                .unwrap();
        }
        sender.send(Task::Shutdown { result_sink }).unwrap();
        drop(sender);
        drop(done);

        let collected: Vec<QueryResult> = results.iter().collect();
        let stats = pool.join().unwrap();

        assert_eq!(collected.len(), 1);
        assert_eq!(acks.iter().count(), 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        assert!(matches!(ctx.take_failure(), Some(Error::Query { .. })));
    }

    struct PanickingInstance;

    impl Instance for PanickingInstance {
        fn dsn(&self) -> &str {
            "panicking"
        }

        fn execute(&self, sql: &str) -> Result<Vec<Row>> {
            if sql.contains("boom") {
                panic!("connection lost");
            }
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_instance_panic_is_acknowledged_and_fails_run() {
        let queue = TaskQueue::bounded(4);
        let ctx = RunContext::new(BenchConfig::default(), 1).unwrap();
        let pool = WorkerPool::start(
            Arc::new(PanickingInstance),
            Arc::clone(&queue),
            2,
            Arc::clone(&ctx),
        )
        .unwrap();
        let sender = queue.sender().unwrap();
        let (result_sink, _results) = unbounded();
        let (done, acks) = unbounded();

        for sql in ["insert into boom values (1)", "select 1"] {
            sender
                .send(Task::Execute {
                    statement: Statement::Plain(sql.into()),
                    result_sink: result_sink.clone(),
                    completion: Some(done.clone()),
                })
                .unwrap();
        }
        sender.send(Task::Shutdown { result_sink }).unwrap();
        drop(sender);
        drop(done);

        assert_eq!(acks.iter().count(), 2);
        let stats = pool.join().unwrap();
        assert_eq!(stats.failed, 1);
        assert!(stats.closed_queue);
        match ctx.take_failure() {
            Some(Error::Worker(message)) => assert!(message.contains("connection lost")),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_pool() {
        let queue = TaskQueue::bounded(1);
        let ctx = RunContext::new(BenchConfig::default(), 1).unwrap();
        assert!(WorkerPool::start(Arc::new(EchoInstance), queue, 0, ctx).is_err());
    }
}
