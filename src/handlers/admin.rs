//! Administrative endpoints
//!
//! Every route requires the `x-admin-token` header to match `[admin].token`.
//! With no token configured the routes always answer 403.

use crate::dispatch::PoolDiagnostics;
use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::middleware::RequestId;
use axum::{Extension, Json, extract::State, http::HeaderMap};
use serde::Serialize;

/// Admin token header name
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Clone, Serialize)]
pub struct AdminActionResponse {
    pub success: bool,
    pub action: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub success: bool,
    pub diagnostics: PoolDiagnostics,
}

fn authorize(state: &AppState, headers: &HeaderMap, request_id: RequestId) -> AppResult<()> {
    let admin = &state.config().admin;
    if !admin.is_enabled() {
        tracing::warn!(request_id = %request_id, "Admin route called but admin access is disabled");
        return Err(AppError::Forbidden(
            "admin access is disabled (no admin token configured)".to_string(),
        ));
    }

    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !admin.authorizes(presented) {
        tracing::warn!(request_id = %request_id, "Admin route called with invalid token");
        return Err(AppError::Forbidden("invalid admin token".to_string()));
    }

    Ok(())
}

/// POST /admin/cache/clear
pub async fn clear_cache(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> AppResult<Json<AdminActionResponse>> {
    authorize(&state, &headers, request_id)?;
    state.dispatcher().clear_cache().await;
    tracing::info!(request_id = %request_id, "Response cache cleared by admin");

    Ok(Json(AdminActionResponse {
        success: true,
        action: "cache_cleared",
    }))
}

/// POST /admin/pools/reset
pub async fn reset_pools(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> AppResult<Json<AdminActionResponse>> {
    authorize(&state, &headers, request_id)?;
    state.dispatcher().reset_failure_counters().await;
    tracing::info!(request_id = %request_id, "Failure counters reset by admin");

    Ok(Json(AdminActionResponse {
        success: true,
        action: "failure_counters_reset",
    }))
}

/// GET /admin/diagnostics
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> AppResult<Json<DiagnosticsResponse>> {
    authorize(&state, &headers, request_id)?;

    Ok(Json(DiagnosticsResponse {
        success: true,
        diagnostics: state.dispatcher().diagnostics().await,
    }))
}
