//! Tasks, results and the shared queue connecting producers to workers.

use crate::error::{Error, Result};
use crate::instance::Row;
use crate::statement::Statement;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub statement: Statement,
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// First column of the first row.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first().map(String::as_str)
    }
}

#[derive(Debug)]
pub enum Task {
    Execute {
        statement: Statement,
        result_sink: Sender<QueryResult>,
        completion: Option<Sender<()>>,
    },
    /// The producer owning `result_sink` has no more work.
    Shutdown { result_sink: Sender<QueryResult> },
}

impl Task {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Task::Shutdown { .. })
    }
}

/// Bounded queue shared by every producer and worker of one run.
///
/// The queue keeps one primary sender; producers hold clones. Closing drops the
/// primary sender, after which workers see a disconnect once every producer has
/// released its clone.
pub struct TaskQueue {
    receiver: Receiver<Task>,
    sender: Mutex<Option<Sender<Task>>>,
}

impl TaskQueue {
    pub fn bounded(capacity: usize) -> Arc<Self> {
        let (sender, receiver) = bounded(capacity);
        Arc::new(Self {
            receiver,
            sender: Mutex::new(Some(sender)),
        })
    }

    /// Sender for a new producer.
    pub fn sender(&self) -> Result<Sender<Task>> {
        self.sender.lock().as_ref().cloned().ok_or(Error::QueueClosed)
    }

    pub fn receiver(&self) -> Receiver<Task> {
        self.receiver.clone()
    }

    /// Close the queue. Fails if it has already been closed.
    pub fn close(&self) -> Result<()> {
        match self.sender.lock().take() {
            Some(sender) => {
                drop(sender);
                Ok(())
            }
            None => Err(Error::QueueAlreadyClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Counts tasks a producer enqueued but has not seen acknowledged yet.
pub struct CompletionTracker {
    sender: Sender<()>,
    receiver: Receiver<()>,
    pending: usize,
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Enqueue `statement` with a tracked completion. Blocks while the queue
    /// is full.
    pub fn submit(
        &mut self,
        queue: &Sender<Task>,
        statement: Statement,
        result_sink: Sender<QueryResult>,
    ) -> Result<()> {
        queue
            .send(Task::Execute {
                statement,
                result_sink,
                completion: Some(self.sender.clone()),
            })
            .map_err(|_| Error::QueueClosed)?;
        self.pending += 1;
        Ok(())
    }

    /// Consume acknowledgments that already arrived without blocking.
    pub fn drain_ready(&mut self) -> usize {
        let mut drained = 0;
        while self.pending > 0 && self.receiver.try_recv().is_ok() {
            self.pending -= 1;
            drained += 1;
        }
        drained
    }

    /// Block until one outstanding task is acknowledged.
    pub fn wait_one(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        self.receiver
            .recv()
            .map_err(|_| Error::Worker("completion channel disconnected".into()))?;
        self.pending -= 1;
        Ok(())
    }

    /// Block until at most `limit - 1` tasks are outstanding.
    pub fn wait_below(&mut self, limit: usize) -> Result<()> {
        self.drain_ready();
        while self.pending >= limit.max(1) {
            self.wait_one()?;
        }
        Ok(())
    }

    pub fn wait_all(&mut self) -> Result<()> {
        while self.pending > 0 {
            self.wait_one()?;
        }
        Ok(())
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}
