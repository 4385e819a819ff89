//! HTTP API over the request pipeline.
//!
//! A thin axum layer: routing, API-key verification, multipart upload
//! plumbing, and mapping of pipeline outcomes onto HTTP statuses. All
//! admission decisions live in [`RequestPipeline`], keyed by the peer IP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/v1/pdf` | Upload a PDF (multipart field `file`) |
//! | `POST` | `/v1/chat/{doc_id}` | Ask a question about an uploaded PDF |
//! | `GET`  | `/v1/stats` | Retrieval-index occupancy |
//!
//! # Error Contract
//!
//! Error responses are JSON:
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "Rate limit exceeded" } }
//! ```
//!
//! Codes: `forbidden` (403), `bad_request` (400), `not_found` (404),
//! `rate_limited` (429), `server_busy` (503), `upstream_error` (502),
//! `internal` (500). Upstream and internal detail is logged, never sent to
//! the client.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::llm;
use crate::models::{ChatMode, ChatResult, UploadResult};
use crate::pipeline::{PipelineError, RejectReason, RequestOutcome, RequestPipeline};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pipeline: Arc<RequestPipeline>,
}

/// Starts the HTTP server.
///
/// Builds the LLM client and pipeline from configuration, binds to
/// `[server].bind`, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());
    let client = llm::create_client(&config.llm)?;
    let pipeline = Arc::new(RequestPipeline::new(config.clone(), client)?);
    run_server_with_pipeline(config, pipeline).await
}

/// Starts the server with an externally constructed pipeline.
///
/// Used by tests that inject a mock LLM client.
pub async fn run_server_with_pipeline(
    config: Arc<Config>,
    pipeline: Arc<RequestPipeline>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = build_router(config, pipeline);

    info!("pdf-chat listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(config: Arc<Config>, pipeline: Arc<RequestPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Multipart framing adds overhead on top of the PDF itself.
    let body_limit = config.storage.max_pdf_bytes + 64 * 1024;

    let state = AppState { config, pipeline };

    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/pdf", post(handle_upload))
        .route("/v1/chat/{doc_id}", post(handle_chat))
        .route("/v1/stats", get(handle_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(serde::Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(serde::Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps a terminal pipeline outcome onto a response, hiding upstream and
/// internal detail from the client.
fn outcome_to_response<T: serde::Serialize>(outcome: RequestOutcome<T>) -> Result<Json<T>, AppError> {
    match outcome {
        RequestOutcome::Completed(value) => Ok(Json(value)),
        RequestOutcome::Rejected(RejectReason::RateLimited) => Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            RejectReason::RateLimited.to_string(),
        )),
        RequestOutcome::Rejected(RejectReason::ServerBusy) => Err(AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "server_busy",
            RejectReason::ServerBusy.to_string(),
        )),
        RequestOutcome::Failed(PipelineError::InvalidInput(m)) => {
            Err(AppError::new(StatusCode::BAD_REQUEST, "bad_request", m))
        }
        RequestOutcome::Failed(PipelineError::NotFound(id)) => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("document not found: {}", id),
        )),
        RequestOutcome::Failed(PipelineError::Upstream(_)) => Err(AppError::new(
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream collaborator failed",
        )),
        RequestOutcome::Failed(PipelineError::Internal(_)) => Err(AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "an unexpected error occurred",
        )),
    }
}

/// Checks the `X-API-Key` header against the configured key.
///
/// An empty configured key disables the check (local development).
fn verify_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let expected = &state.config.server.api_key;
    if expected.is_empty() {
        return Ok(());
    }
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if presented != expected {
        let shown: String = presented.chars().take(8).collect();
        warn!(key_prefix = %shown, "invalid API key attempt");
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Invalid or missing API key",
        ));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(serde::Serialize)]
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

// ============ POST /v1/pdf ============

async fn handle_upload(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResult>, AppError> {
    verify_api_key(&state, &headers)?;

    let mut filename = None;
    let mut bytes = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            bytes = Some(field.bytes().await.map_err(|e| {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
            })?);
        }
    }

    let filename = filename
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "bad_request", "missing file field"))?;
    let bytes = bytes
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "bad_request", "missing file field"))?;

    let client_id = peer.ip().to_string();
    let outcome = state
        .pipeline
        .upload(&client_id, &filename, bytes.to_vec())
        .await;
    outcome_to_response(outcome)
}

// ============ POST /v1/chat/{doc_id} ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    mode: ChatMode,
}

async fn handle_chat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(doc_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResult>, AppError> {
    verify_api_key(&state, &headers)?;

    let client_id = peer.ip().to_string();
    let outcome = state
        .pipeline
        .chat(&client_id, &doc_id, &request.message, request.mode)
        .await;
    outcome_to_response(outcome)
}

// ============ GET /v1/stats ============

async fn handle_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<crate::retriever::IndexStats>, AppError> {
    verify_api_key(&state, &headers)?;
    Ok(Json(state.pipeline.index_stats()))
}
