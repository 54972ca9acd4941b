//! Error types for orgscan.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid pattern rule {name}: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Rejected submissions. No job record exists for these.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Only .{expected} files are allowed (got {filename:?})")]
    UnsupportedFileType { filename: String, expected: String },

    #[error("No file was provided")]
    MissingFile,

    #[error("Uploaded file {filename:?} is empty")]
    EmptyFile { filename: String },

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

/// Transient upload storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to save file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove file {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to prepare upload directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Text extraction errors. Always terminal for the job.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to read document {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to extract text from PDF: {0}")]
    Parse(String),

    #[error("No text could be extracted from the document")]
    NoText,
}

/// Directory lookup failures (anything other than success or not-found).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Invalid identifier {identifier:?}")]
    InvalidIdentifier { identifier: String },

    #[error("Directory request for {identifier} failed: {reason}")]
    Request { identifier: String, reason: String },

    #[error("Directory request for {identifier} timed out after {timeout:?}")]
    Timeout {
        identifier: String,
        timeout: Duration,
    },

    #[error("Directory returned HTTP {status} for {identifier}")]
    Status { identifier: String, status: u16 },

    #[error("Invalid directory response for {identifier}: {reason}")]
    Decode { identifier: String, reason: String },
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} already exists")]
    DuplicateId { id: Uuid },

    #[error("Job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Worker is already running")]
    AlreadyRunning,

    #[error("Task queue is closed")]
    QueueClosed,
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
