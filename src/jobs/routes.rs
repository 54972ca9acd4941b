//! HTTP surface — document upload, job status polling, queue statistics.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use super::model::{JobStatus, JobView};
use super::service::{JobService, QueueStatus};
use crate::error::{Error, JobError, ValidationError};

/// Multipart field carrying the document.
const FILE_FIELD: &str = "file";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
}

/// Build the router with all job endpoints.
pub fn job_routes(service: Arc<JobService>, max_upload_bytes: usize) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/documents/upload", post(upload_document))
        .route("/api/jobs/{job_id}", get(get_job))
        .route("/api/queue/status", get(queue_status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Error response rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn job_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Job not found")
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(e) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            Error::Job(JobError::NotFound { .. }) => Self::job_not_found(),
            Error::Job(JobError::QueueClosed) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down")
            }
            other => {
                error!(error = %other, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Error::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

// ── Info ────────────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "orgscan",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/documents/upload",
            "job_status": "GET /api/jobs/{job_id}",
            "queue_status": "GET /api/queue/status",
            "health": "GET /health",
        },
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "orgscan" }))
}

// ── Jobs ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct UploadResponse {
    job_id: Uuid,
    status: JobStatus,
    message: &'static str,
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Malformed multipart upload");
        ApiError::new(e.status(), ValidationError::Malformed(e.body_text()).to_string())
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await.map_err(|e| {
            warn!(error = %e, "Failed to read uploaded file");
            ApiError::new(e.status(), ValidationError::Malformed(e.body_text()).to_string())
        })?;

        let record = state.service.submit(&filename, &content).await?;
        return Ok(Json(UploadResponse {
            job_id: record.id,
            status: record.status,
            message: "Document uploaded and queued for processing",
        }));
    }

    Err(ValidationError::MissingFile.into())
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job_id = Uuid::parse_str(&job_id).map_err(|_| ApiError::job_not_found())?;
    let record = state.service.get_status(job_id).await?;
    Ok(Json(record.view()))
}

async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueStatus>, ApiError> {
    Ok(Json(state.service.queue_status().await?))
}
