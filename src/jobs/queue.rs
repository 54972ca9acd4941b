//! Task queue — unbounded in-memory FIFO between submitters and the worker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use super::model::WorkItem;
use crate::error::JobError;

/// Outcome of a blocking dequeue.
#[derive(Debug)]
pub enum Dequeued {
    Item(WorkItem),
    /// Nothing arrived within the wait window.
    TimedOut,
    /// The queue was closed and fully drained.
    Closed,
}

/// Unbounded FIFO of work items.
///
/// Any number of submitters may `enqueue`; a single consumer is intended.
/// The receiver sits behind a mutex so a second consumer would only wait, not
/// corrupt ordering.
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<WorkItem>,
    rx: Mutex<mpsc::UnboundedReceiver<WorkItem>>,
    len: AtomicUsize,
    closed: AtomicBool,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            len: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Append an item. Never blocks; fails only after `close()`.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), JobError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JobError::QueueClosed);
        }

        let job_id = item.job_id;
        self.len.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(item).is_err() {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return Err(JobError::QueueClosed);
        }

        debug!(job_id = %job_id, queue_size = self.len(), "Task added to queue");
        Ok(())
    }

    /// Wait up to `timeout` for the next item in submission order.
    pub async fn dequeue_blocking(&self, timeout: Duration) -> Dequeued {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(item)) => {
                self.len.fetch_sub(1, Ordering::AcqRel);
                Dequeued::Item(item)
            }
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::TimedOut,
        }
    }

    /// Number of items waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting items and drain everything still queued.
    ///
    /// Returns the drained items so the caller can release their inputs.
    /// Dropped jobs keep their `queued` record; they are not marked failed.
    pub async fn close(&self) -> Vec<WorkItem> {
        self.closed.store(true, Ordering::Release);

        let mut rx = self.rx.lock().await;
        rx.close();

        let mut dropped = Vec::new();
        while let Ok(item) = rx.try_recv() {
            self.len.fetch_sub(1, Ordering::AcqRel);
            debug!(job_id = %item.job_id, "Dropping queued task on shutdown");
            dropped.push(item);
        }

        if !dropped.is_empty() {
            info!(dropped = dropped.len(), "Task queue closed with unprocessed items");
        }
        dropped
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
