//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use keyrotor::dispatch::Dispatcher;
use keyrotor::pool::{CredentialPool, ModelDescriptor, ModelRotation};
use keyrotor::upstream::{ChatMessage, Upstream, UpstreamError, UpstreamRequest};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};

type Script = dyn Fn(&str, &str) -> Result<String, UpstreamError> + Send + Sync;

/// One recorded upstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub model: String,
    pub key: String,
    pub max_tokens: u32,
}

/// In-process upstream whose answer is a function of (model, key)
pub struct FakeUpstream {
    calls: Mutex<Vec<Call>>,
    script: Box<Script>,
}

impl FakeUpstream {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, &str) -> Result<String, UpstreamError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }

    pub fn always_ok(text: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Ok(text.to_string()))
    }

    pub fn always_status(status: u16, message: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Err(http(status, message)))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn complete(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamError> {
        let call = Call {
            model: request.model.to_string(),
            key: request.credential.expose_secret().to_string(),
            max_tokens: request.options.max_tokens,
        };
        self.calls.lock().unwrap().push(call.clone());
        (self.script)(&call.model, &call.key)
    }
}

pub fn http(status: u16, message: &str) -> UpstreamError {
    UpstreamError::Http {
        status,
        message: message.to_string(),
    }
}

pub fn secrets(keys: &[&str]) -> Vec<SecretString> {
    keys.iter()
        .map(|key| SecretString::from(key.to_string()))
        .collect()
}

/// Catalog from `(id, tier)` pairs
pub fn catalog(models: &[(&str, u8)]) -> Vec<ModelDescriptor> {
    models
        .iter()
        .map(|(id, tier)| ModelDescriptor::new(*id, *tier))
        .collect()
}

pub fn dispatcher(keys: &[&str], models: &[(&str, u8)], upstream: Arc<dyn Upstream>) -> Dispatcher {
    Dispatcher::new(
        CredentialPool::new(secrets(keys)),
        ModelRotation::new(catalog(models)).expect("non-empty catalog"),
        upstream,
    )
}

pub fn hello() -> Vec<ChatMessage> {
    vec![ChatMessage::user("hello")]
}

pub const SYSTEM_PROMPT: &str = "You are an assistant.";
