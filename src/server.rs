//! HTTP surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload (field `file`); ingest the contract |
//! | `POST` | `/ask` | `{question, contract_id}` → `{answer, matched_chunk}` |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/`, `/static/*` | Browser UI from `server.static_dir`, when configured |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "contract_id is required" } }
//! ```
//!
//! Codes: `bad_request` (400), `payload_too_large` (413),
//! `extraction_failed` (422), `embedding_failed` / `retrieval_failed` /
//! `generation_failed` (502), `index_write_failed`, `tokenization_failed`,
//! `storage_failed`, `configuration` (500).

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use contract_rag_core::error::PipelineError;
use contract_rag_core::identity::identify;
use contract_rag_core::models::{Answer, DocumentId, IngestReport};
use contract_rag_core::pipeline::Pipeline;

use crate::app::build_pipeline;
use crate::config::{Config, ServerConfig};
use crate::storage::UploadStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    uploads: UploadStore,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, uploads: UploadStore) -> Self {
        Self { pipeline, uploads }
    }
}

/// Build the pipeline from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(build_pipeline(config).await?);
    let state = AppState::new(pipeline, UploadStore::new(config.uploads.dir.clone()));
    let app = build_router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");
    println!("Server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble routes, body limit and CORS.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/upload", post(handle_upload))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health));

    if let Some(ref dir) = server.static_dir {
        router = router
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Embedding(_)
            | PipelineError::Retrieval(_)
            | PipelineError::Generation(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Tokenization(_)
            | PipelineError::IndexWrite(_)
            | PipelineError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(code = err.code(), "request failed: {}", err);
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "bad_request"
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.body_text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

/// Store the raw upload under its content hash, then ingest it.
///
/// Returns `{contract_id, status, chunks}` with status `indexed` or
/// `duplicate`.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        if field.file_name().is_some_and(|n| n.trim().is_empty()) {
            return Err(bad_request("no file selected"));
        }
        upload = Some(field.bytes().await?);
        break;
    }
    let bytes = upload.ok_or_else(|| bad_request("multipart field 'file' is required"))?;

    let id = identify(&bytes);
    state.uploads.save(&id, &bytes).await.map_err(|e| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "storage_failed".to_string(),
        message: format!("{:#}", e),
    })?;

    let report = state.pipeline.ingest(&bytes).await?;
    Ok(Json(report))
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub contract_id: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    if req.contract_id.trim().is_empty() {
        return Err(bad_request("contract_id is required"));
    }
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let id = DocumentId::parse(&req.contract_id).map_err(|e| bad_request(e.to_string()))?;

    let answer = state.pipeline.ask(&id, &req.question).await?;
    Ok(Json(answer))
}
