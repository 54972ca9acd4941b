//! Job records, the status state machine, and queue work items.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the task queue.
    Queued,
    /// Picked up by the worker.
    Processing,
    /// Finished, with or without an identifier.
    Completed,
    /// Finished with an error. Resubmit to retry.
    Failed,
}

impl JobStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Queued, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Statuses from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[],
            Self::Processing => &[Self::Queued],
            Self::Completed | Self::Failed => &[Self::Processing],
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Human-readable description shown to polling clients.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Queued => "Job is waiting in queue to be processed",
            Self::Processing => "Job is currently being processed",
            Self::Completed => "Job completed successfully",
            Self::Failed => "Job processing failed",
        }
    }

    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Directory members attached to a job.
///
/// `NotApplicable` means no lookup ran (no identifier, or the job failed).
/// `Empty` means the lookup ran and the directory reported nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Members {
    #[default]
    NotApplicable,
    Empty,
    Populated(Vec<String>),
}

impl Members {
    /// Members from a successful lookup.
    pub fn from_lookup(members: Vec<String>) -> Self {
        if members.is_empty() {
            Self::Empty
        } else {
            Self::Populated(members)
        }
    }

    pub fn is_applicable(&self) -> bool {
        !matches!(self, Self::NotApplicable)
    }

    pub fn as_slice(&self) -> Option<&[String]> {
        match self {
            Self::NotApplicable => None,
            Self::Empty => Some(&[]),
            Self::Populated(list) => Some(list.as_slice()),
        }
    }

    /// Encode for the `github_members` column: NULL or a JSON array.
    pub fn to_column(&self) -> Option<String> {
        self.as_slice()
            .map(|list| serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string()))
    }

    /// Decode the `github_members` column.
    pub fn from_column(raw: Option<&str>) -> Result<Self, serde_json::Error> {
        match raw {
            None => Ok(Self::NotApplicable),
            Some(json) => serde_json::from_str::<Vec<String>>(json).map(Self::from_lookup),
        }
    }
}

impl Serialize for Members {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

/// A successful directory resolution for an extracted identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identifier: String,
    pub members: Vec<String>,
}

/// A state transition applied by the worker.
///
/// The variants only admit field combinations the record invariants allow:
/// members exist only next to an identifier on a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Processing,
    /// `None` when no identifier was found in the document.
    Completed(Option<Resolution>),
    Failed {
        identifier: Option<String>,
        reason: String,
    },
}

impl JobUpdate {
    pub fn target(&self) -> JobStatus {
        match self {
            Self::Processing => JobStatus::Processing,
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            identifier: None,
            reason: reason.into(),
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Processing => None,
            Self::Completed(resolution) => resolution.as_ref().map(|r| r.identifier.as_str()),
            Self::Failed { identifier, .. } => identifier.as_deref(),
        }
    }

    pub fn members(&self) -> Members {
        match self {
            Self::Completed(Some(resolution)) => Members::from_lookup(resolution.members.clone()),
            _ => Members::NotApplicable,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Durable job record.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub original_name: String,
    pub status: JobStatus,
    pub extracted_identifier: Option<String>,
    pub members: Members,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A fresh queued record.
    pub fn queued(id: Uuid, original_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            original_name: original_name.into(),
            status: JobStatus::Queued,
            extracted_identifier: None,
            members: Members::NotApplicable,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Read-only projection returned to polling clients.
    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id,
            original_filename: self.original_name.clone(),
            status: self.status,
            extracted_company_username: self.extracted_identifier.clone(),
            github_members: self.members.clone(),
            timestamp: self.created_at,
            updated_at: self.updated_at,
            error: self.error.clone(),
            message: self.status.message(),
        }
    }
}

/// Status projection of a job (the `GET /api/jobs/{id}` body).
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub original_filename: String,
    pub status: JobStatus,
    pub extracted_company_username: Option<String>,
    pub github_members: Members,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub message: &'static str,
}

/// Queue entry pointing at a job and its transient input.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: Uuid,
    pub input_path: PathBuf,
    pub submitted_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(job_id: Uuid, input_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            input_path: input_path.into(),
            submitted_at: Utc::now(),
        }
    }
}
