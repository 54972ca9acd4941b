//! Job lifecycle — submission, status queries, and worker supervision.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{JobRecord, JobStatus, JobUpdate, WorkItem};
use super::queue::TaskQueue;
use super::worker::{InFlight, Worker, WorkerDeps};
use crate::config::{DirectoryConfig, ServiceConfig};
use crate::directory::{Directory, GitHubDirectory};
use crate::error::{ConfigError, JobError, Result, ValidationError};
use crate::extract::{PatternExtractor, PdfTextExtractor, TextExtractor};
use crate::store::JobStore;
use crate::uploads::UploadStore;

/// How often the retention sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// The processing collaborators handed to the worker.
#[derive(Clone)]
pub struct Pipeline {
    pub text: Arc<dyn TextExtractor>,
    pub patterns: Arc<PatternExtractor>,
    pub directory: Arc<dyn Directory>,
}

impl Pipeline {
    /// PDF extraction, GitHub organization rules, and the GitHub API.
    pub fn github(config: &DirectoryConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            text: Arc::new(PdfTextExtractor::new()),
            patterns: Arc::new(PatternExtractor::github()?),
            directory: Arc::new(GitHubDirectory::new(config)?),
        })
    }
}

/// Queue statistics (the `GET /api/queue/status` body).
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub worker_running: bool,
    pub queue_size: usize,
    pub job_statistics: BTreeMap<JobStatus, u64>,
    pub total_jobs: u64,
}

struct Tasks {
    worker: JoinHandle<()>,
    in_flight: InFlight,
    sweeper: Option<JoinHandle<()>>,
}

/// Owns the queue, the store handle, the stop flag and the worker task.
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<TaskQueue>,
    uploads: UploadStore,
    pipeline: Pipeline,
    allowed_extension: String,
    poll_interval: Duration,
    retention: Option<Duration>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Option<Tasks>>,
}

impl JobService {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn JobStore>,
        uploads: UploadStore,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            store,
            queue: Arc::new(TaskQueue::new()),
            uploads,
            pipeline,
            allowed_extension: config.allowed_extension.to_ascii_lowercase(),
            poll_interval: config.poll_interval,
            retention: config.retention,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(None),
        }
    }

    /// Spawn the worker (and the retention sweeper, if configured).
    pub async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(JobError::AlreadyRunning.into());
        }
        if self.queue.is_closed() {
            return Err(JobError::QueueClosed.into());
        }

        self.running.store(true, Ordering::Release);
        let worker = Worker::new(
            WorkerDeps {
                store: Arc::clone(&self.store),
                queue: Arc::clone(&self.queue),
                text: Arc::clone(&self.pipeline.text),
                patterns: Arc::clone(&self.pipeline.patterns),
                directory: Arc::clone(&self.pipeline.directory),
                uploads: self.uploads.clone(),
            },
            Arc::clone(&self.running),
            self.poll_interval,
        );

        let sweeper = self
            .retention
            .map(|retention| spawn_retention_task(Arc::clone(&self.store), retention));

        *tasks = Some(Tasks {
            in_flight: worker.in_flight(),
            worker: tokio::spawn(worker.run()),
            sweeper,
        });
        info!("Job service started");
        Ok(())
    }

    /// Stop the worker. Queued items are dropped (their records stay queued)
    /// and their uploads are removed.
    ///
    /// Waits up to `grace` for the in-flight item, then aborts the task and
    /// fails that job. Returns the number of dropped queue items.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.running.store(false, Ordering::Release);
        let dropped = self.queue.close().await;
        for item in &dropped {
            self.uploads.discard(&item.input_path).await;
        }
        let dropped = dropped.len();

        let Some(tasks) = self.tasks.lock().await.take() else {
            return dropped;
        };
        if let Some(sweeper) = tasks.sweeper {
            sweeper.abort();
        }

        let mut worker = tasks.worker;
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => info!(dropped, "Job service stopped"),
            Ok(Err(e)) => error!(error = %e, "Worker task ended abnormally"),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs_f64(),
                    "Worker did not stop within grace period, aborting"
                );
                worker.abort();
                // Cancelled; wait until the task has released the item.
                let _ = worker.await;
            }
        }

        let interrupted = tasks.in_flight.lock().await.take();
        if let Some(item) = interrupted {
            self.fail_interrupted(item).await;
        }
        dropped
    }

    async fn fail_interrupted(&self, item: WorkItem) {
        self.uploads.discard(&item.input_path).await;
        let update = JobUpdate::failed("interrupted by shutdown");
        match self.store.update_status(item.job_id, &update).await {
            Ok(_) => warn!(job_id = %item.job_id, "In-flight job failed by shutdown"),
            Err(e) => warn!(
                job_id = %item.job_id,
                error = %e,
                "Could not mark interrupted job failed"
            ),
        }
    }

    /// Validate and accept a document. Returns the new queued record.
    pub async fn submit(&self, original_name: &str, content: &[u8]) -> Result<JobRecord> {
        self.validate(original_name, content)?;
        if self.queue.is_closed() {
            return Err(JobError::QueueClosed.into());
        }

        let id = Uuid::new_v4();
        let path = self.uploads.save(id, &self.allowed_extension, content).await?;

        let record = match self.store.create(id, original_name).await {
            Ok(record) => record,
            Err(e) => {
                self.uploads.discard(&path).await;
                return Err(e);
            }
        };

        if let Err(e) = self.queue.enqueue(WorkItem::new(id, &path)) {
            // Lost the race with shutdown: the record stays queued like any dropped item.
            self.uploads.discard(&path).await;
            return Err(e.into());
        }

        info!(
            job_id = %id,
            filename = original_name,
            bytes = content.len(),
            queue_size = self.queue.len(),
            "Job submitted"
        );
        Ok(record)
    }

    fn validate(&self, original_name: &str, content: &[u8]) -> Result<()> {
        let suffix = format!(".{}", self.allowed_extension);
        if !original_name.to_ascii_lowercase().ends_with(&suffix) {
            return Err(ValidationError::UnsupportedFileType {
                filename: original_name.to_string(),
                expected: self.allowed_extension.clone(),
            }
            .into());
        }
        if content.is_empty() {
            return Err(ValidationError::EmptyFile {
                filename: original_name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Current record for `job_id`.
    pub async fn get_status(&self, job_id: Uuid) -> Result<JobRecord> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound { id: job_id }.into())
    }

    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let mut job_statistics = self.store.count_by_status().await?;
        for status in JobStatus::ALL {
            job_statistics.entry(status).or_insert(0);
        }
        let total_jobs = job_statistics.values().sum();

        Ok(QueueStatus {
            worker_running: self.is_running().await,
            queue_size: self.queue.len(),
            job_statistics,
            total_jobs,
        })
    }

    /// True while the worker task is alive and has not been told to stop.
    pub async fn is_running(&self) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.tasks
            .lock()
            .await
            .as_ref()
            .is_some_and(|tasks| !tasks.worker.is_finished())
    }
}

/// Delete terminal records whose last update is older than `retention`.
pub async fn prune_expired(store: &dyn JobStore, retention: Duration) -> Result<u64> {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    store.prune_terminal(cutoff).await
}

/// Spawn the periodic retention sweep.
pub fn spawn_retention_task(store: Arc<dyn JobStore>, retention: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            retention_hours = retention.as_secs() / 3600,
            "Retention sweeper started"
        );
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match prune_expired(store.as_ref(), retention).await {
                Ok(0) => debug!("Retention sweep found nothing to prune"),
                Ok(pruned) => info!(pruned, "Pruned expired jobs"),
                Err(e) => warn!(error = %e, "Retention sweep failed"),
            }
        }
    })
}
