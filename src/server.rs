//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and generation backend) |
//! | `POST` | `/api/ingest/text` | Ingest `{ "source", "text" }` |
//! | `POST` | `/api/upload-pdf?filename=…` | Ingest a PDF sent as the raw request body |
//! | `POST` | `/api/scrape-url` | Scrape and ingest `{ "url" }` |
//! | `POST` | `/api/chat` | Ask `{ "message", "session_id"? }` |
//! | `GET`  | `/api/documents` | List ingested documents |
//! | `GET`  | `/api/documents/{id}` | Document metadata |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its chunks |
//! | `GET`  | `/api/sessions/{id}` | Conversation history |
//!
//! # Error Contract
//!
//! Errors are returned as
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `empty_content` | 400 |
//! | `not_found` | 404 |
//! | `extraction_failed` | 422 |
//! | `scrape_failed`, `embedding_failed`, `generation_failed` | 502 |
//! | `dimension_mismatch`, `config_error`, `internal` | 500 |
//!
//! # Sessions
//!
//! Chat requests for the same `session_id` are serialised with a
//! per-session async mutex, so history is never interleaved. A session's
//! mutex is dropped from the map when its last request finishes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use ragchat_core::generate::AnswerStatus;
use ragchat_core::ingest::IngestReport;
use ragchat_core::models::Document;
use ragchat_core::session::{Session, SessionStore};
use ragchat_core::{RagEngine, RagError};

use crate::app::build_engine;
use crate::config::{Config, ServerConfig};

/// Shared state for all handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
    session_locks: SessionLocks,
}

/// Per-session async mutexes. An entry lives only while some request
/// holds or waits for it.
#[derive(Clone, Default)]
struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SessionLocks {
    async fn lock(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        SessionGuard {
            locks: self.clone(),
            session_id: session_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a session's mutex; dropping it unlocks and prunes the entry
/// once nobody else references it.
struct SessionGuard {
    locks: SessionLocks,
    session_id: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        // Clones are only made under the map lock, so a count of one here
        // means no request holds or awaits this session.
        if locks
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

/// Build the engine from `config` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(config).await?);
    let app = router(engine, &config.server)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    println!("ragchat listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

/// The full API router over an existing engine.
pub fn router(engine: Arc<RagEngine>, server: &ServerConfig) -> anyhow::Result<Router> {
    let state = AppState {
        engine,
        session_locks: SessionLocks::default(),
    };

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/api/ingest/text", post(handle_ingest_text))
        .route("/api/upload-pdf", post(handle_upload_pdf))
        .route("/api/scrape-url", post(handle_scrape_url))
        .route("/api/chat", post(handle_chat))
        .route("/api/documents", get(handle_list_documents))
        .route(
            "/api/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/api/sessions/{id}", get(handle_get_session))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.allowed_origins)?)
        .with_state(state))
}

fn cors_layer(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| HeaderValue::from_str(o))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("invalid server.allowed_origins entry: {}", e))?;
        AllowOrigin::list(origins)
    };
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::InvalidInput(_) | RagError::EmptyContent(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Scrape(_) | RagError::Embedding(_) | RagError::GenerationBackend(_) => {
                StatusCode::BAD_GATEWAY
            }
            RagError::DimensionMismatch { .. } | RagError::Config(_) | RagError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Unwrap a JSON body, keeping malformed bodies inside the error contract.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    generation: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: state.engine.backend_name().to_string(),
    })
}

// ============ Ingestion ============

#[derive(Serialize)]
struct IngestResponse {
    success: bool,
    message: String,
    doc_id: String,
    text_length: usize,
    chunks: usize,
}

impl IngestResponse {
    fn from_report(what: &str, report: IngestReport) -> Self {
        Self {
            success: true,
            message: format!(
                "{} '{}' ingested into {} chunks",
                what, report.document.source, report.chunks_written
            ),
            doc_id: report.document.id,
            text_length: report.document.char_count,
            chunks: report.chunks_written,
        }
    }
}

#[derive(Deserialize)]
struct IngestTextRequest {
    source: String,
    text: String,
}

async fn handle_ingest_text(
    State(state): State<AppState>,
    payload: Result<Json<IngestTextRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let req = json_body(payload)?;
    let report = state.engine.ingest_text(&req.source, &req.text).await?;
    Ok(Json(IngestResponse::from_report("Text", report)))
}

#[derive(Deserialize)]
struct UploadQuery {
    filename: Option<String>,
}

async fn handle_upload_pdf(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let filename = query
        .filename
        .ok_or_else(|| bad_request("filename query parameter is required"))?;
    let report = state.engine.ingest_pdf(&filename, &body).await?;
    Ok(Json(IngestResponse::from_report("PDF", report)))
}

#[derive(Deserialize)]
struct ScrapeRequest {
    url: String,
}

async fn handle_scrape_url(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let req = json_body(payload)?;
    let report = state.engine.ingest_url(&req.url).await?;
    Ok(Json(IngestResponse::from_report("Page", report)))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    success: bool,
    response: String,
    sources: Vec<String>,
    session_id: String,
    status: AnswerStatus,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let req = json_body(payload)?;
    let session_id = SessionStore::resolve_id(req.session_id.as_deref());

    let _guard = state.session_locks.lock(&session_id).await;

    let answer = state.engine.chat(Some(&session_id), &req.message).await?;
    Ok(Json(ChatResponse {
        success: true,
        response: answer.response,
        sources: answer.sources,
        session_id: answer.session_id,
        status: answer.status,
    }))
}

// ============ Documents ============

#[derive(Serialize)]
struct DocumentListResponse {
    success: bool,
    documents: Vec<Document>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.engine.list_documents().await?;
    Ok(Json(DocumentListResponse {
        success: true,
        documents,
    }))
}

#[derive(Serialize)]
struct DocumentResponse {
    success: bool,
    document: Document,
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    let document = state.engine.get_document(&id).await?;
    Ok(Json(DocumentResponse {
        success: true,
        document,
    }))
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    doc_id: String,
    removed_chunks: usize,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let removed_chunks = state.engine.delete_document(&id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        doc_id: id,
        removed_chunks,
    }))
}

// ============ GET /api/sessions/{id} ============

#[derive(Serialize)]
struct SessionResponse {
    success: bool,
    session: Session,
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.engine.session_history(&id)?;
    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_errors_map_to_statuses() {
        let cases = [
            (RagError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (RagError::EmptyContent("x".into()), StatusCode::BAD_REQUEST),
            (RagError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (RagError::Extraction("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (RagError::Scrape("x".into()), StatusCode::BAD_GATEWAY),
            (RagError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (RagError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let code = err.code();
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_cors_rejects_invalid_origin() {
        assert!(cors_layer(&["*".to_string()]).is_ok());
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_session_lock_entry_pruned_after_release() {
        let locks = SessionLocks::default();
        let guard = locks.lock("s1").await;
        let other = locks.lock("s2").await;
        assert_eq!(locks.len(), 2);

        drop(guard);
        assert_eq!(locks.len(), 1);
        drop(other);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_session_lock_serialises_and_survives_waiters() {
        let locks = SessionLocks::default();
        let first = locks.lock("s").await;

        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("s")).await;
        assert!(blocked.is_err());

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.lock("s").await;
                locks.len()
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The waiter still references the entry, so releasing keeps it.
        drop(first);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(locks.len(), 0);
    }
}
