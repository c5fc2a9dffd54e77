//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// "upstream" when credentials are configured, "fallback_only" otherwise
    pub mode: &'static str,
    pub credential_count: usize,
    pub model_count: usize,
}

/// GET /health handler
///
/// Always 200: without credentials the service still answers via the fallback responder.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let dispatcher = state.dispatcher();
    let credential_count = dispatcher.credentials().len();
    let mode = if credential_count == 0 {
        "fallback_only"
    } else {
        "upstream"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            mode,
            credential_count,
            model_count: dispatcher.models().len(),
        }),
    )
}
