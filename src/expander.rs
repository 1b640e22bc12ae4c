//! Second pipeline producer: fans trace probe results out into count queries.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::statement::{Statement, TraceRecord};
use crate::task::{CompletionTracker, QueryResult, Task};
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpanderStats {
    pub probes: u64,
    pub discarded: u64,
    pub derived: u64,
}

pub struct TraceExpander {
    queue: Sender<Task>,
    raw_results: Receiver<QueryResult>,
    final_sink: Sender<QueryResult>,
    tracker: CompletionTracker,
    ctx: Arc<RunContext>,
    stats: ExpanderStats,
}

impl TraceExpander {
    pub fn new(
        queue: Sender<Task>,
        raw_results: Receiver<QueryResult>,
        final_sink: Sender<QueryResult>,
        ctx: Arc<RunContext>,
    ) -> Self {
        Self {
            queue,
            raw_results,
            final_sink,
            tracker: CompletionTracker::new(),
            ctx,
            stats: ExpanderStats::default(),
        }
    }

    /// Expand results until the upstream producer shuts down, wait for every
    /// derived task, then emit this stage's shutdown task.
    pub fn run(mut self) -> Result<ExpanderStats> {
        let expanded = self.expand_all();
        if let Err(err) = &expanded {
            if !self.ctx.is_aborted() {
                self.ctx.fail(Error::Worker(format!("trace expander: {err}")));
            }
        }

        let drained = self.tracker.wait_all();
        self.queue
            .send(Task::Shutdown {
                result_sink: self.final_sink.clone(),
            })
            .map_err(|_| Error::QueueClosed)?;

        info!(
            probes = self.stats.probes,
            derived = self.stats.derived,
            "Trace expander finished"
        );
        expanded.and(drained).map(|_| self.stats)
    }

    fn expand_all(&mut self) -> Result<()> {
        let limit = self.ctx.config().max_fanout_in_flight;

        while let Ok(result) = self.raw_results.recv() {
            if !result.statement.carries_trace() || self.ctx.is_aborted() {
                self.stats.discarded += 1;
                continue;
            }
            self.stats.probes += 1;

            let records = match parse_trace(&result) {
                Ok(records) => records,
                Err(err) => {
                    // Keep draining so upstream can finish.
                    self.ctx.fail(err);
                    continue;
                }
            };

            debug!(
                statement = %result.statement,
                records = records.len(),
                "Expanding trace payload"
            );
            for record in records {
                self.tracker.submit(
                    &self.queue,
                    Statement::ActualCount(record),
                    self.final_sink.clone(),
                )?;
                self.stats.derived += 1;
                self.ctx.metrics().record_fanout(1);
                self.tracker.wait_below(limit)?;
            }
        }

        Ok(())
    }
}

/// Parse the single scalar payload of a trace probe result.
pub fn parse_trace(result: &QueryResult) -> Result<Vec<TraceRecord>> {
    let payload = result.scalar().ok_or_else(|| {
        Error::MalformedTrace(format!("no payload returned for {}", result.statement))
    })?;
    serde_json::from_str(payload)
        .map_err(|err| Error::MalformedTrace(format!("{}: {err}", result.statement)))
}
