//! HTTP request handlers for the query API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, QuestionError};
use crate::types::{QueryResponse, Question, ResultEnvelope};

use super::AppState;

/// Build the axum router with all routes
pub(super) fn router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/query", post(query))
        .route("/query/raw", post(query_raw))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn bad_request(err: QuestionError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

/// Token exchange failures are the one error surfaced as a server error
fn auth_error(err: AuthError) -> ApiError {
    tracing::error!("Internal error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

// -- /query and /query/raw --

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    /// Narrate the results (default true)
    #[serde(default = "default_true")]
    format_response: bool,
}

fn default_true() -> bool {
    true
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = Question::new(&req.question).map_err(bad_request)?;
    let response = state
        .service
        .process(&question, req.format_response)
        .await
        .map_err(auth_error)?;
    Ok(Json(response))
}

async fn query_raw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ResultEnvelope>, ApiError> {
    let question = Question::new(&req.question).map_err(bad_request)?;
    let response = state
        .service
        .process(&question, false)
        .await
        .map_err(auth_error)?;
    Ok(Json(response.into_envelope()))
}

// -- /health --

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: f64,
}

async fn health() -> Json<HealthResponse> {
    let now = chrono::Utc::now();
    Json(HealthResponse {
        status: "healthy",
        timestamp: now.timestamp_millis() as f64 / 1000.0,
    })
}
