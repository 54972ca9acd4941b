//! Background worker — drains the task queue one item at a time.
//!
//! Per item: mark processing, extract text, match an identifier, look up its
//! members, persist the terminal state, then remove the transient input.
//! A failure or panic in any step fails only that job.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::model::{JobStatus, JobUpdate, Resolution, WorkItem};
use super::queue::{Dequeued, TaskQueue};
use crate::directory::Directory;
use crate::error::{Error, JobError};
use crate::extract::{PatternExtractor, TextExtractor};
use crate::store::JobStore;
use crate::uploads::UploadStore;

/// Collaborators the worker runs each item through.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<TaskQueue>,
    pub text: Arc<dyn TextExtractor>,
    pub patterns: Arc<PatternExtractor>,
    pub directory: Arc<dyn Directory>,
    pub uploads: UploadStore,
}

/// The item the worker is currently processing, if any.
pub type InFlight = Arc<Mutex<Option<WorkItem>>>;

/// Single sequential consumer of the task queue.
pub struct Worker {
    deps: WorkerDeps,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    in_flight: InFlight,
}

impl Worker {
    pub fn new(deps: WorkerDeps, running: Arc<AtomicBool>, poll_interval: Duration) -> Self {
        Self {
            deps,
            running,
            poll_interval,
            in_flight: InFlight::default(),
        }
    }

    /// Handle on the current item, readable after the worker task is aborted.
    pub fn in_flight(&self) -> InFlight {
        Arc::clone(&self.in_flight)
    }

    /// Run until the stop flag is cleared or the queue is closed.
    pub async fn run(self) {
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Worker started"
        );

        while self.running.load(Ordering::Acquire) {
            match self.deps.queue.dequeue_blocking(self.poll_interval).await {
                Dequeued::Item(item) => {
                    *self.in_flight.lock().await = Some(item.clone());
                    self.process_item(item).await;
                    self.in_flight.lock().await.take();
                }
                Dequeued::TimedOut => continue,
                Dequeued::Closed => break,
            }
        }

        info!("Worker stopped");
    }

    /// Process one work item to a terminal state. Never panics, never errors.
    ///
    /// Returns the status the job was left in, or `None` if the item was
    /// skipped because its record could not be claimed.
    pub async fn process_item(&self, item: WorkItem) -> Option<JobStatus> {
        let span = info_span!("job", job_id = %item.job_id);
        async {
            let waited = Utc::now() - item.submitted_at;
            info!(wait_ms = waited.num_milliseconds(), "Processing job");

            let outcome = self.claim_and_resolve(&item).await;
            self.deps.uploads.discard(&item.input_path).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn claim_and_resolve(&self, item: &WorkItem) -> Option<JobStatus> {
        let job_id = item.job_id;

        match self
            .deps
            .store
            .update_status(job_id, &JobUpdate::Processing)
            .await
        {
            Ok(_) => {}
            Err(Error::Job(e @ (JobError::NotFound { .. } | JobError::InvalidTransition { .. }))) => {
                warn!(error = %e, "Skipping work item");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Failed to mark job processing");
                return None;
            }
        }

        let update = match AssertUnwindSafe(self.resolve(&item.input_path))
            .catch_unwind()
            .await
        {
            Ok(update) => update,
            Err(panic) => {
                let reason = format!("internal error: {}", panic_message(&*panic));
                error!(reason = %reason, "Job processing panicked");
                JobUpdate::failed(reason)
            }
        };

        self.finish(job_id, update).await
    }

    /// Persist the terminal update. If a non-failure result cannot be
    /// written, record the write error as the job's failure instead.
    async fn finish(&self, job_id: Uuid, update: JobUpdate) -> Option<JobStatus> {
        let target = update.target();
        let record = match self.deps.store.update_status(job_id, &update).await {
            Ok(record) => record,
            Err(e) if target != JobStatus::Failed => {
                warn!(status = %target, error = %e, "Failed to persist job result, marking failed");
                let fallback = JobUpdate::failed(format!("failed to persist result: {e}"));
                match self.deps.store.update_status(job_id, &fallback).await {
                    Ok(record) => record,
                    Err(e) => {
                        error!(error = %e, "Failed to persist job failure");
                        return None;
                    }
                }
            }
            Err(e) => {
                error!(status = %target, error = %e, "Failed to persist job result");
                return None;
            }
        };

        info!(
            status = %record.status,
            identifier = record.extracted_identifier.as_deref().unwrap_or("-"),
            members = record.members.as_slice().map_or(0, <[String]>::len),
            error = record.error.as_deref().unwrap_or(""),
            "Job finished"
        );
        Some(record.status)
    }

    /// Extraction and lookup. Every failure becomes a `Failed` update.
    async fn resolve(&self, input: &Path) -> JobUpdate {
        let text = match self.deps.text.extract_text(input).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Text extraction failed");
                return JobUpdate::failed(e.to_string());
            }
        };

        let Some(identifier) = self.deps.patterns.extract(&text) else {
            debug!(chars = text.len(), "No identifier found in document");
            return JobUpdate::Completed(None);
        };
        info!(identifier = %identifier, "Extracted identifier");

        match self.deps.directory.list_members(&identifier).await {
            Ok(members) => JobUpdate::Completed(Some(Resolution {
                identifier,
                members,
            })),
            Err(e) => {
                warn!(error = %e, "Directory lookup failed");
                JobUpdate::Failed {
                    identifier: Some(identifier),
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "panic"
    }
}
