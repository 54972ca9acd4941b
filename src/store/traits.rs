//! `JobStore` trait — single async interface for job persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::jobs::model::{JobRecord, JobStatus, JobUpdate};

/// Backend-agnostic job record store.
///
/// One writer (submission path and worker) and many concurrent readers
/// (status pollers). Every mutation is a single atomic statement, so a reader
/// never observes a partially-applied update.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` record. Fails with `JobError::DuplicateId` if the id exists.
    async fn create(&self, id: Uuid, original_name: &str) -> Result<JobRecord>;

    /// Apply a forward transition and return the updated record.
    ///
    /// Fails with `JobError::NotFound` for unknown ids and
    /// `JobError::InvalidTransition` when the record is not in a state the
    /// update may follow (terminal records are never mutated).
    async fn update_status(&self, id: Uuid, update: &JobUpdate) -> Result<JobRecord>;

    /// Get a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>>;

    /// Number of records per status. Statuses with no records are omitted.
    async fn count_by_status(&self) -> Result<BTreeMap<JobStatus, u64>>;

    /// Delete terminal records last updated before `cutoff`.
    /// Returns the number of records deleted.
    async fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
