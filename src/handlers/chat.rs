//! Chat endpoint handler
//!
//! Handles POST /chat requests: validates the conversation, hands it to the
//! dispatcher and returns the answer (real, cached or fallback).

use crate::dispatch::SendOptions;
use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::handlers::extractor::ApiJson;
use crate::middleware::RequestId;
use crate::upstream::ChatMessage;
use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};

/// Maximum total characters across all message contents
pub const MAX_CONVERSATION_LENGTH: usize = 100_000;

/// Chat request from a client
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    options: SendOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, system_prompt: impl Into<String>) -> Self {
        Self {
            messages,
            system_prompt: system_prompt.into(),
            options: SendOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Check the conversation shape before dispatching
    ///
    /// Roles are already restricted to system/user/assistant by deserialization.
    pub fn validate(&self) -> AppResult<()> {
        let Some(last) = self.messages.last() else {
            return Err(AppError::Validation(
                "messages must contain at least one message".to_string(),
            ));
        };

        if !last.is_user() {
            return Err(AppError::Validation(
                "the last message must have role 'user'".to_string(),
            ));
        }

        if last.content.trim().is_empty() {
            return Err(AppError::Validation(
                "the last user message cannot be empty or contain only whitespace".to_string(),
            ));
        }

        let total_chars: usize = self
            .messages
            .iter()
            .map(|m| m.content.chars().count())
            .sum::<usize>()
            + self.system_prompt.chars().count();
        if total_chars > MAX_CONVERSATION_LENGTH {
            return Err(AppError::Validation(format!(
                "conversation exceeds maximum length of {} characters (got {})",
                MAX_CONVERSATION_LENGTH, total_chars
            )));
        }

        Ok(())
    }
}

/// Successful chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub model: String,
    pub cached: bool,
    /// Present (and true) only for fallback answers
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// POST /chat handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    request.validate().inspect_err(|e| {
        tracing::debug!(request_id = %request_id, error = %e, "Rejected chat request");
    })?;

    tracing::debug!(
        request_id = %request_id,
        message_count = request.messages().len(),
        system_prompt_length = request.system_prompt().len(),
        use_cache = request.options().use_cache(),
        "Received chat request"
    );

    let outcome = state
        .dispatcher()
        .send(request.messages(), request.system_prompt(), request.options())
        .await
        .inspect_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Chat request failed");
        })?;

    tracing::info!(
        request_id = %request_id,
        model = %outcome.model,
        cached = outcome.cached,
        fallback = outcome.fallback,
        response_length = outcome.message.len(),
        "Chat request completed"
    );

    Ok(Json(ChatResponse {
        success: true,
        message: outcome.message,
        model: outcome.model,
        cached: outcome.cached,
        fallback: outcome.fallback,
    }))
}
