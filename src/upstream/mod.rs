//! Outbound contract to upstream text-generation providers
//!
//! One [`Upstream::complete`] call is one attempt: a bearer credential, a model
//! identifier, the full turn list and the clamped generation options go out;
//! generated text or an [`UpstreamError`] comes back.

pub mod classify;
pub mod openai;

pub use classify::{FailureKind, classify};
pub use openai::OpenAiUpstream;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Generation parameters after clamping
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

/// A single upstream call
#[derive(Debug, Clone, Copy)]
pub struct UpstreamRequest<'a> {
    pub model: &'a str,
    pub credential: &'a SecretString,
    /// Full turn list, system prompt first
    pub messages: &'a [ChatMessage],
    pub options: GenerationOptions,
}

/// Error returned by an upstream call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Provider answered with an HTTP-style error status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection could not be established or was lost
    #[error("Network error: {0}")]
    Network(String),

    /// No answer within the per-attempt timeout
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Provider answered 2xx but the payload had no usable text
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// HTTP status, if the provider returned one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message text used for keyword classification
    pub fn message(&self) -> &str {
        match self {
            Self::Http { message, .. }
            | Self::Network(message)
            | Self::InvalidResponse(message) => message,
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify this error for the attempt loop
    pub fn kind(&self) -> FailureKind {
        classify(self.status(), self.message())
    }
}

/// A provider that turns a conversation into generated text
///
/// Implementations must not retry internally; the dispatcher owns retries,
/// timeouts and failure bookkeeping.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn complete(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_status_and_message() {
        let err = UpstreamError::Http {
            status: 429,
            message: "Rate limit exceeded".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.message(), "Rate limit exceeded");
        assert_eq!(err.to_string(), "HTTP 429: Rate limit exceeded");

        let err = UpstreamError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Upstream request timed out after 30s");
        assert_eq!(err.status(), None);
        assert_eq!(err.kind(), FailureKind::Other);
    }
}
