//! First pipeline producer: turns SQL sources into tasks.
//!
//! Schema-creating statements are serialized: nothing after them is read until
//! they are acknowledged. Destructive statements are held back and run one by
//! one after every source is exhausted.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::statement::{split_statements, StatementKind};
use crate::task::{CompletionTracker, QueryResult, Task};
use crossbeam::channel::Sender;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProviderStats {
    pub submitted: u64,
    pub by_kind: BTreeMap<StatementKind, u64>,
}

pub struct StatementProvider {
    queue: Sender<Task>,
    result_sink: Sender<QueryResult>,
    tracker: CompletionTracker,
    deferred: Vec<String>,
    ctx: Arc<RunContext>,
    stats: ProviderStats,
}

impl StatementProvider {
    pub fn new(queue: Sender<Task>, result_sink: Sender<QueryResult>, ctx: Arc<RunContext>) -> Self {
        Self {
            queue,
            result_sink,
            tracker: CompletionTracker::new(),
            deferred: Vec::new(),
            ctx,
            stats: ProviderStats::default(),
        }
    }

    /// Feed every statement of `sources` and finish with a shutdown task.
    ///
    /// The shutdown task is emitted even when feeding fails so the workers can
    /// complete the run.
    pub fn run<I, S>(mut self, sources: I) -> Result<ProviderStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fed = self.feed(sources).and_then(|_| self.run_deferred());
        if let Err(err) = &fed {
            if !self.ctx.is_aborted() {
                self.ctx.fail(Error::Worker(format!("statement provider: {err}")));
            }
        }

        let drained = self.tracker.wait_all();
        self.queue
            .send(Task::Shutdown {
                result_sink: self.result_sink.clone(),
            })
            .map_err(|_| Error::QueueClosed)?;

        info!(
            submitted = self.stats.submitted,
            deferred = self
                .stats
                .by_kind
                .get(&StatementKind::Destructive)
                .copied()
                .unwrap_or(0),
            "Statement provider finished"
        );
        fed.and(drained).map(|_| self.stats)
    }

    fn feed<I, S>(&mut self, sources: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let limit = self.ctx.config().max_pending_statements;

        for source in sources {
            for sql in split_statements(source.as_ref()) {
                if self.ctx.is_aborted() {
                    debug!("Run aborted, provider stops reading");
                    return Ok(());
                }

                let kind = StatementKind::classify(&sql);
                *self.stats.by_kind.entry(kind).or_default() += 1;

                match kind {
                    StatementKind::Destructive => {
                        debug!(sql = %sql, "Deferring destructive statement");
                        self.deferred.push(sql);
                    }
                    StatementKind::SchemaCreate => {
                        self.submit(kind, sql)?;
                        self.tracker.wait_all()?;
                    }
                    _ => {
                        self.submit(kind, sql)?;
                        self.tracker.wait_below(limit)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn run_deferred(&mut self) -> Result<()> {
        let deferred = std::mem::take(&mut self.deferred);
        for sql in deferred {
            if self.ctx.is_aborted() {
                break;
            }
            self.submit(StatementKind::Destructive, sql)?;
            self.tracker.wait_all()?;
        }
        Ok(())
    }

    fn submit(&mut self, kind: StatementKind, sql: String) -> Result<()> {
        let statement = kind.into_statement(sql);
        debug!(kind = kind.as_str(), sql = %statement, "Submitting statement");
        self.tracker
            .submit(&self.queue, statement, self.result_sink.clone())?;
        self.stats.submitted += 1;
        Ok(())
    }
}

/// Count statements per kind without executing anything.
pub fn classify_sources<I, S>(sources: I) -> BTreeMap<StatementKind, u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = BTreeMap::new();
    for source in sources {
        for sql in split_statements(source.as_ref()) {
            *counts.entry(StatementKind::classify(&sql)).or_default() += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchConfig;
    use crate::statement::Statement;
    use crate::task::TaskQueue;
    use crossbeam::channel::unbounded;
    use std::thread;

    /// Acknowledges tasks in order and records what it saw.
    fn drain(queue: Arc<TaskQueue>) -> thread::JoinHandle<Vec<Statement>> {
        let receiver = queue.receiver();
        thread::spawn(move || {
            let mut seen = Vec::new();
            while let Ok(task) = receiver.recv() {
                match task {
                    Task::Execute {
                        statement,
                        completion,
                        ..
                    } => {
                        seen.push(statement);
                        if let Some(done) = completion {
                            done.send(()).unwrap();
                        }
                    }
                    Task::Shutdown { .. } => {
                        queue.close().unwrap();
                        break;
                    }
                }
            }
            seen
        })
    }

    #[test]
    fn test_destructive_statements_run_last() {
        let queue = TaskQueue::bounded(4);
        let ctx = RunContext::new(BenchConfig::default(), 1).unwrap();
        let (raw_tx, _raw_rx) = unbounded();
        let consumer = drain(Arc::clone(&queue));

        let provider = StatementProvider::new(queue.sender().unwrap(), raw_tx, ctx);
        let stats = provider
            .run([
                "create table t (a int); drop table old; select * from t",
                "insert into t values (1); select a from t where a = 1",
            ])
            .unwrap();

        let seen = consumer.join().unwrap();
        let sql: Vec<String> = seen.iter().map(|s| s.to_sql().into_owned()).collect();
        assert_eq!(
            sql,
            vec![
                "create table t (a int)",
                "TRACE PLAN TARGET = 'estimation' select * from t",
                "insert into t values (1)",
                "TRACE PLAN TARGET = 'estimation' select a from t where a = 1",
                "drop table old",
            ]
        );
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.by_kind[&StatementKind::ReadQuery], 2);
        assert_eq!(stats.by_kind[&StatementKind::Destructive], 1);
    }

    #[test]
    fn test_classify_sources() {
        let counts = classify_sources(["select 1; select 2; drop table t", "create table t (a int)"]);
        assert_eq!(counts[&StatementKind::ReadQuery], 2);
        assert_eq!(counts[&StatementKind::Destructive], 1);
        assert_eq!(counts[&StatementKind::SchemaCreate], 1);
        assert!(!counts.contains_key(&StatementKind::Other));
    }
}
