//! Error types for Keyrotor
//!
//! `AppError` implements `IntoResponse` for Axum handlers. `DispatchError` is the
//! only failure the dispatch orchestrator hands back to callers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failure returned by [`Dispatcher::send`](crate::dispatch::Dispatcher::send)
///
/// Every upstream error is classified inside the orchestrator; this is what is left
/// when the attempt budget is spent without a usable answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("All providers unavailable after {attempts} attempt(s): {detail}")]
    AllProvidersUnavailable { attempts: usize, detail: String },
}

impl DispatchError {
    /// Detail of the last upstream error seen before giving up
    pub fn detail(&self) -> &str {
        match self {
            Self::AllProvidersUnavailable { detail, .. } => detail,
        }
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            Self::Dispatch(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable".to_string(),
                Some(e.detail().to_string()),
            ),
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None),
        };

        let mut body = serde_json::json!({
            "success": false,
            "error": error,
        });
        if let Some(details) = details {
            body["details"] = serde_json::Value::String(details);
        }

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
