//! HTTP routes over the engine.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use evalseal::core::VerificationReport;
use evalseal::store::Store;
use evalseal::{
    ChainReport, Engine, EngineError, EntryId, EntryReport, Envelope, ErrorKind, Evaluation,
    EvaluationRequest, HealthReport,
};

/// Header carrying the caller's identity for rate limiting.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Client key used when the header is absent.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

type AppState<S> = Arc<Engine<S>>;

/// Build the application router.
pub fn router<S: Store + 'static>(engine: Arc<Engine<S>>) -> Router {
    Router::new()
        .route("/evaluate", post(evaluate::<S>))
        .route("/verify", post(verify_envelope::<S>))
        .route("/verify/{id}", get(verify_entry::<S>))
        .route("/chain/verify", get(verify_chain::<S>))
        .route("/health", get(health::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    pub retryable: bool,
}

/// An error rendered as a JSON body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                kind: "validation".into(),
                retryable: false,
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let (status, kind) = match err.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
            ErrorKind::Replay => (StatusCode::BAD_REQUEST, "replay_detected"),
            ErrorKind::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Store and encoding details stay in the logs.
        let error = match err.kind() {
            ErrorKind::Internal => {
                tracing::error!(error = %err, "internal error");
                "internal error".to_string()
            }
            ErrorKind::Unavailable => {
                tracing::warn!(error = %err, "storage unavailable");
                "storage unavailable".to_string()
            }
            _ => err.to_string(),
        };

        Self {
            status,
            body: ErrorResponse {
                error,
                kind: kind.into(),
                retryable: err.is_retryable(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn client_id(headers: &HeaderMap) -> &str {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT)
}

async fn evaluate<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    headers: HeaderMap,
    body: Result<Json<EvaluationRequest>, JsonRejection>,
) -> Result<Json<Evaluation>, ApiError> {
    let Json(request) = body?;
    let evaluation = engine.evaluate(client_id(&headers), request).await?;
    Ok(Json(evaluation))
}

async fn verify_envelope<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    body: Result<Json<Envelope>, JsonRejection>,
) -> Result<Json<VerificationReport>, ApiError> {
    let Json(envelope) = body?;
    Ok(Json(engine.verify_envelope(&envelope)?))
}

async fn verify_entry<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(id): Path<u64>,
) -> Result<Json<EntryReport>, ApiError> {
    Ok(Json(engine.verify_entry(EntryId(id)).await?))
}

#[derive(Debug, Deserialize)]
struct ChainQuery {
    from: Option<u64>,
    to: Option<u64>,
}

async fn verify_chain<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Query(query): Query<ChainQuery>,
) -> Result<Json<ChainReport>, ApiError> {
    let report = engine
        .verify_chain(query.from.map(EntryId), query.to.map(EntryId))
        .await?;
    Ok(Json(report))
}

async fn health<S: Store + 'static>(
    State(engine): State<AppState<S>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = engine.health().await;
    let status = if report.store_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
