//! libSQL backend — async `JobStore` implementation.
//!
//! Supports local file and in-memory databases. Every mutation is one SQL
//! statement, which SQLite applies atomically.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, JobError, Result};
use crate::jobs::model::{JobRecord, JobStatus, JobUpdate, Members};
use crate::store::migrations;
use crate::store::traits::JobStore;

/// Column order expected by `row_to_job`.
const JOB_COLUMNS: &str = "job_id, original_filename, status, extracted_company_username, github_members, error, created_at, updated_at";

/// libSQL job store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlJobStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlJobStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> std::result::Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Job database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> std::result::Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(column: &str, s: &str) -> std::result::Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("{column} {s:?}: {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a JobRecord. Column order matches JOB_COLUMNS.
fn row_to_job(row: &libsql::Row) -> std::result::Result<JobRecord, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("job_id column: {e}")))?;
    let original_name: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("original_filename column: {e}")))?;
    let status_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("status column: {e}")))?;
    let identifier: Option<String> = row.get(3).ok();
    let members_str: Option<String> = row.get(4).ok();
    let error: Option<String> = row.get(5).ok();
    let created_str: String = row
        .get(6)
        .map_err(|e| DatabaseError::Query(format!("created_at column: {e}")))?;
    let updated_str: String = row
        .get(7)
        .map_err(|e| DatabaseError::Query(format!("updated_at column: {e}")))?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("job id {id_str:?}: {e}")))?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(DatabaseError::Serialization)?;
    let members = Members::from_column(members_str.as_deref())
        .map_err(|e| DatabaseError::Serialization(format!("github_members for {id}: {e}")))?;

    Ok(JobRecord {
        id,
        original_name,
        status,
        extracted_identifier: identifier,
        members,
        error,
        created_at: parse_datetime("created_at", &created_str)?,
        updated_at: parse_datetime("updated_at", &updated_str)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl JobStore for LibSqlJobStore {
    async fn create(&self, id: Uuid, original_name: &str) -> Result<JobRecord> {
        let record = JobRecord::queued(id, original_name);
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO jobs (job_id, original_filename, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    original_name,
                    record.status.as_str(),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_job: {e}")))?;

        if inserted == 0 {
            return Err(JobError::DuplicateId { id }.into());
        }

        debug!(job_id = %id, name = original_name, "Job record created");
        Ok(record)
    }

    async fn update_status(&self, id: Uuid, update: &JobUpdate) -> Result<JobRecord> {
        let target = update.target();
        let allowed = target
            .predecessors()
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let changed = if allowed.is_empty() {
            0
        } else {
            self.conn()
                .execute(
                    &format!(
                        "UPDATE jobs SET status = ?1, extracted_company_username = ?2, github_members = ?3, error = ?4, updated_at = ?5 WHERE job_id = ?6 AND status IN ({allowed})"
                    ),
                    params![
                        target.as_str(),
                        opt_text(update.identifier()),
                        opt_text_owned(update.members().to_column()),
                        opt_text(update.error()),
                        Utc::now().to_rfc3339(),
                        id.to_string(),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("update_job_status: {e}")))?
        };

        match self.get(id).await? {
            Some(record) if changed > 0 => {
                debug!(job_id = %id, status = %target, "Job status updated in DB");
                Ok(record)
            }
            Some(record) => {
                warn!(job_id = %id, from = %record.status, to = %target, "Rejected job transition");
                Err(JobError::InvalidTransition {
                    id,
                    state: record.status.to_string(),
                    target: target.to_string(),
                }
                .into())
            }
            None => Err(JobError::NotFound { id }.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_job: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_job: {e}")).into()),
        }
    }

    async fn count_by_status(&self) -> Result<BTreeMap<JobStatus, u64>> {
        let mut rows = self
            .conn()
            .query("SELECT status, COUNT(*) FROM jobs GROUP BY status", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_jobs_by_status: {e}")))?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_jobs_by_status: {e}")))?
        {
            let status_str: String = row.get(0).unwrap_or_default();
            let count: i64 = row.get(1).unwrap_or(0);
            match status_str.parse::<JobStatus>() {
                Ok(status) => {
                    counts.insert(status, count.max(0) as u64);
                }
                Err(e) => warn!(error = %e, "Skipping unknown status in job statistics"),
            }
        }
        Ok(counts)
    }

    async fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM jobs WHERE status IN ('completed', 'failed') AND updated_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_terminal_jobs: {e}")))?;

        if count > 0 {
            info!(count, cutoff = %cutoff, "Pruned old terminal jobs from DB");
        }
        Ok(count)
    }
}
