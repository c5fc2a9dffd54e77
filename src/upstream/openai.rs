//! OpenAI-compatible `/chat/completions` upstream
//!
//! Works against any provider exposing the OpenAI chat schema (OpenRouter,
//! vLLM, llama.cpp server, ...). Error bodies of the form
//! `{"error": {"message": ..., "code": ...}}` are unpacked so the classifier
//! sees the provider's own wording.

use super::{ChatMessage, Upstream, UpstreamError, UpstreamRequest};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

/// Longest raw body excerpt carried in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    code: Option<serde_json::Value>,
}

/// Upstream client for OpenAI-compatible chat completion APIs
#[derive(Debug, Clone)]
pub struct OpenAiUpstream {
    client: reqwest::Client,
    base_url: String,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenAiUpstream {
    /// Create a client for `base_url` (e.g. `https://openrouter.ai/api/v1`)
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            referer: None,
            title: None,
        })
    }

    /// Attribution headers some aggregators use for ranking (`HTTP-Referer`, `X-Title`)
    pub fn with_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.referer = referer;
        self.title = title;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Build an `UpstreamError` from a non-2xx response body
fn http_error(status: u16, body: &str) -> UpstreamError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| truncate(body));

    UpstreamError::Http { status, message }
}

/// Error embedded in a 2xx body
///
/// A numeric `code` carries the real status. Without one the error has no status
/// and is classified from its message alone.
fn embedded_error(error: ErrorBody) -> UpstreamError {
    let status = error
        .code
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());

    match status {
        Some(status) => UpstreamError::Http {
            status,
            message: error.message,
        },
        None => UpstreamError::InvalidResponse(error.message),
    }
}

#[async_trait]
impl Upstream for OpenAiUpstream {
    async fn complete(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamError> {
        let body = CompletionBody {
            model: request.model,
            messages: request.messages,
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(request.credential.expose_secret())
            .json(&body);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(http_error(status.as_u16(), &text));
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::InvalidResponse(format!("unparseable body: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(embedded_error(error));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| UpstreamError::InvalidResponse("empty completion".to_string()))
    }
}
