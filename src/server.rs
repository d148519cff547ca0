//! HTTP surface: ask, upload, reset and health.
//!
//! All routes share one [`ResponsePipeline`] behind an async mutex, so
//! requests are handled one at a time against the single conversation.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::agent::builtin::DocumentQaTool;
use crate::documents::extractor::is_supported;
use crate::documents::{DocumentInfo, DocumentStore, IngestStats};
use crate::error::LanternError;
use crate::model::ModelClient;
use crate::pipeline::ResponsePipeline;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared state for every request.
pub struct AppState {
    pub pipeline: Mutex<ResponsePipeline>,
    pub documents: Arc<DocumentStore>,
    pub model: Arc<dyn ModelClient>,
    pub document_budget: usize,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    documents: Vec<DocumentInfo>,
}

/// Plain-text error response; the status reflects who is at fault.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unsupported(filename: &str) -> Self {
        Self {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            message: format!("Unsupported file type: {}", filename),
        }
    }
}

impl From<LanternError> for ApiError {
    fn from(e: LanternError) -> Self {
        let status = match &e {
            LanternError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LanternError::Document(_) | LanternError::Pdf(_) | LanternError::Archive(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed ({}): {}", self.status, self.message);
        } else {
            tracing::warn!("Request rejected ({}): {}", self.status, self.message);
        }
        (self.status, self.message).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/upload", post(upload))
        .route("/reset", post(reset))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    let answer = state.pipeline.lock().await.respond(prompt).await?;
    Ok(Json(AskResponse {
        question: prompt.to_string(),
        answer,
    }))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestStats>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.txt").to_string();
        if !is_supported(&filename) {
            return Err(ApiError::unsupported(&filename));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }
    let Some((filename, bytes)) = upload else {
        return Err(ApiError::bad_request("Missing multipart field 'file'"));
    };

    let mut pipeline = state.pipeline.lock().await;
    let stats = state
        .documents
        .ingest(state.model.as_ref(), &filename, &bytes)
        .await?;
    pipeline.register_tool(Arc::new(DocumentQaTool::new(
        state.documents.clone(),
        state.model.clone(),
        state.document_budget,
    )));
    Ok(Json(stats))
}

async fn reset(State(state): State<Arc<AppState>>) -> StatusCode {
    state.pipeline.lock().await.reset();
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    state.model.ping().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        model: state.model.model_name().to_string(),
        documents: state.documents.documents(),
    }))
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, bind_addr: &str) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Lantern listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
