//! Dispatch orchestration
//!
//! [`Dispatcher::send`] walks one call through
//! `CHECK_CACHE -> ATTEMPT_LOOP -> SUCCESS | EXHAUSTED -> FALLBACK`:
//!
//! 1. A live cache entry is returned as-is, with no upstream call and no pool change.
//! 2. An empty credential pool goes straight to the fallback responder.
//! 3. Otherwise up to `min(max_attempts, catalog size)` attempts run back-to-back,
//!    each pairing the rotation table's model with the credential pool's next key.
//!    Every failure is classified and charged to the model, the credential or both.
//! 4. A non-retriable client error stops the loop. An exhausted budget whose last
//!    failure was authentication or transient falls back; anything else surfaces
//!    [`DispatchError::AllProvidersUnavailable`].

use crate::cache::{CachedResponse, ResponseCache};
use crate::config::Config;
use crate::error::{AppResult, DispatchError};
use crate::fallback::{FALLBACK_MODEL, FallbackResponder};
use crate::metrics::{AttemptLabel, DispatchLabel, Metrics};
use crate::pool::{CredentialPool, ModelRotation};
use crate::upstream::{
    ChatMessage, FailureKind, GenerationOptions, Upstream, UpstreamError, UpstreamRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-attempt timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default attempt budget (further capped by catalog size)
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Largest accepted `max_tokens`
pub const MAX_TOKENS_LIMIT: u32 = 500;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Caller-supplied generation options
///
/// Missing values take defaults; out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct SendOptions {
    /// Any JSON number; floored, then clamped to `1..=MAX_TOKENS_LIMIT`
    #[serde(default)]
    pub max_tokens: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub use_cache: Option<bool>,
}

impl SendOptions {
    /// Whether the cache may be read and written for this call (default true)
    pub fn use_cache(&self) -> bool {
        self.use_cache.unwrap_or(true)
    }

    /// Clamp numeric options into their valid ranges
    pub fn generation(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self
                .max_tokens
                .filter(|v| v.is_finite())
                .map_or(DEFAULT_MAX_TOKENS, |v| {
                    v.floor().clamp(1.0, f64::from(MAX_TOKENS_LIMIT)) as u32
                }),
            temperature: unit_interval(self.temperature, DEFAULT_TEMPERATURE),
            top_p: unit_interval(self.top_p, DEFAULT_TOP_P),
        }
    }
}

fn unit_interval(value: Option<f64>, default: f64) -> f64 {
    value
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

/// Successful result of a dispatch call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub message: String,
    pub model: String,
    pub cached: bool,
    pub fallback: bool,
}

/// How one attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(FailureKind),
}

/// One (model, credential) pairing tried during a single `send()`
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model: String,
    pub credential_index: usize,
    pub outcome: AttemptOutcome,
}

/// Failure count of one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFailureCount {
    pub model: String,
    pub tier: u8,
    pub failures: u32,
}

/// Snapshot of pool and cache state for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolDiagnostics {
    pub credential_count: usize,
    pub model_count: usize,
    /// Catalog order
    pub per_model_failure_counts: Vec<ModelFailureCount>,
    pub last_successful_model: Option<String>,
    /// Indexed by credential position; secrets are never included
    pub credential_failure_counts: Vec<u32>,
    pub cache_entries: usize,
}

/// Coordinates the cache, both rotation pools, the upstream and the fallback
pub struct Dispatcher {
    credentials: CredentialPool,
    models: ModelRotation,
    cache: ResponseCache,
    cache_enabled: bool,
    upstream: Arc<dyn Upstream>,
    fallback: FallbackResponder,
    metrics: Option<Metrics>,
    request_timeout: Duration,
    max_attempts: usize,
}

impl Dispatcher {
    /// Create a dispatcher with a default cache, 30s timeout and 10-attempt budget
    pub fn new(
        credentials: CredentialPool,
        models: ModelRotation,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            credentials,
            models,
            cache: ResponseCache::default(),
            cache_enabled: true,
            upstream,
            fallback: FallbackResponder::new(),
            metrics: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Build a dispatcher from loaded configuration
    ///
    /// # Errors
    /// Returns an error if the effective model catalog is empty.
    pub fn from_config(config: &Config, upstream: Arc<dyn Upstream>) -> AppResult<Self> {
        let pools = &config.pools;
        let credentials = CredentialPool::with_settings(
            config.credentials.secrets(),
            pools.credential_failure_threshold,
            pools.credential_cooldown(),
        );
        let models = ModelRotation::with_settings(
            config.catalog(),
            pools.model_sticky_threshold,
            pools.model_skip_threshold,
            pools.model_cooldown(),
        )?;

        Ok(Self::new(credentials, models, upstream)
            .with_cache(
                ResponseCache::with_capacity(
                    config.cache.ttl(),
                    config.cache.prompt_prefix_chars,
                    config.cache.max_entries,
                ),
                config.cache.enabled,
            )
            .with_request_timeout(config.upstream.request_timeout())
            .with_max_attempts(config.upstream.max_attempts))
    }

    pub fn with_cache(mut self, cache: ResponseCache, enabled: bool) -> Self {
        self.cache = cache;
        self.cache_enabled = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attempt budget for one call: `min(max_attempts, catalog size)`
    pub fn attempt_budget(&self) -> usize {
        self.max_attempts.min(self.models.len())
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn models(&self) -> &ModelRotation {
        &self.models
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Produce an answer for a conversation
    ///
    /// `messages` should end with the newest user turn. `system_prompt` is sent
    /// upstream as the first turn. Every upstream error is classified here; the
    /// only error returned is [`DispatchError::AllProvidersUnavailable`].
    pub async fn send(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &SendOptions,
    ) -> Result<DispatchOutcome, DispatchError> {
        let cache_key = (self.cache_enabled && options.use_cache())
            .then(|| self.cache.key(system_prompt, messages));

        if let Some(key) = &cache_key
            && let Some(hit) = self.cache.get(key).await
        {
            tracing::debug!(model = %hit.model, "Serving response from cache");
            self.record_dispatch(DispatchLabel::Cached);
            return Ok(DispatchOutcome {
                message: hit.text,
                model: hit.model,
                cached: true,
                fallback: false,
            });
        }

        if self.credentials.is_empty() {
            tracing::info!("No credentials configured, using fallback responder");
            return Ok(self.fall_back(messages, system_prompt));
        }

        let generation = options.generation();
        let upstream_messages = with_system_prompt(system_prompt, messages);
        let budget = self.attempt_budget();
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(budget);
        let mut last_failure: Option<(FailureKind, UpstreamError)> = None;

        for attempt in 1..=budget {
            let model = self.models.next().await;
            let Some(credential) = self.credentials.next().await else {
                break;
            };

            tracing::debug!(
                model = %model.id(),
                tier = model.tier(),
                credential_index = credential.index(),
                attempt = attempt,
                max_attempts = budget,
                "Dispatching upstream attempt"
            );

            let request = UpstreamRequest {
                model: model.id(),
                credential: credential.secret(),
                messages: &upstream_messages,
                options: generation,
            };

            let started = Instant::now();
            let result =
                match tokio::time::timeout(self.request_timeout, self.upstream.complete(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_elapsed) => Err(UpstreamError::Timeout(self.request_timeout)),
                };
            let elapsed = started.elapsed();

            match result {
                Ok(text) => {
                    self.record_attempt(AttemptLabel::Success, elapsed);
                    self.models.record_success(&model).await;
                    self.credentials.record_success(&credential).await;
                    attempts.push(AttemptRecord {
                        model: model.id().to_string(),
                        credential_index: credential.index(),
                        outcome: AttemptOutcome::Success,
                    });
                    tracing::debug!(attempt_log = ?attempts, "Attempts made for this call");

                    tracing::info!(
                        model = %model.id(),
                        credential_index = credential.index(),
                        attempt = attempt,
                        response_length = text.len(),
                        duration_ms = elapsed.as_millis() as u64,
                        "Upstream attempt succeeded"
                    );

                    if let Some(key) = cache_key {
                        self.cache
                            .put(
                                key,
                                CachedResponse {
                                    text: text.clone(),
                                    model: model.id().to_string(),
                                },
                            )
                            .await;
                    }

                    self.record_dispatch(DispatchLabel::Upstream);
                    return Ok(DispatchOutcome {
                        message: text,
                        model: model.id().to_string(),
                        cached: false,
                        fallback: false,
                    });
                }
                Err(error) => {
                    let kind = error.kind();
                    self.record_attempt(AttemptLabel::Failure(kind), elapsed);

                    if kind.penalizes_model() {
                        self.models.record_failure(&model).await;
                    }
                    if kind.penalizes_credential() {
                        self.credentials.record_failure(&credential).await;
                    }

                    tracing::warn!(
                        model = %model.id(),
                        credential_index = credential.index(),
                        attempt = attempt,
                        max_attempts = budget,
                        failure_kind = kind.as_str(),
                        status = ?error.status(),
                        error = %error,
                        "Upstream attempt failed"
                    );

                    attempts.push(AttemptRecord {
                        model: model.id().to_string(),
                        credential_index: credential.index(),
                        outcome: AttemptOutcome::Failed(kind),
                    });
                    last_failure = Some((kind, error));

                    if !kind.is_retryable() {
                        tracing::warn!(
                            model = %model.id(),
                            attempt = attempt,
                            "Non-retriable client error, stopping attempt loop"
                        );
                        break;
                    }
                }
            }
        }

        match last_failure {
            Some((FailureKind::Authentication | FailureKind::Transient, error)) => {
                tracing::warn!(
                    attempts = attempts.len(),
                    last_error = %error,
                    "Attempt budget exhausted on credential or capacity failures, using fallback"
                );
                tracing::debug!(attempt_log = ?attempts, "Attempts made before fallback");
                Ok(self.fall_back(messages, system_prompt))
            }
            last => {
                let detail = last
                    .map(|(_, error)| error.to_string())
                    .unwrap_or_else(|| "no upstream attempt was made".to_string());

                tracing::error!(
                    attempts = attempts.len(),
                    attempt_log = ?attempts,
                    last_error = %detail,
                    "All providers unavailable"
                );
                self.record_dispatch(DispatchLabel::Unavailable);

                Err(DispatchError::AllProvidersUnavailable {
                    attempts: attempts.len(),
                    detail,
                })
            }
        }
    }

    fn fall_back(&self, messages: &[ChatMessage], system_prompt: &str) -> DispatchOutcome {
        self.record_dispatch(DispatchLabel::Fallback);
        DispatchOutcome {
            message: self.fallback.generate(messages, system_prompt),
            model: FALLBACK_MODEL.to_string(),
            cached: false,
            fallback: true,
        }
    }

    /// Remove every cached response
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Zero the failure counts of every credential and model
    ///
    /// Pending decrements still fire later but are floored at zero.
    pub async fn reset_failure_counters(&self) {
        self.credentials.reset().await;
        self.models.reset().await;
        tracing::info!("Credential and model failure counters reset");
    }

    /// Snapshot of both pools and the cache
    pub async fn diagnostics(&self) -> PoolDiagnostics {
        let per_model_failure_counts = self
            .models
            .catalog()
            .iter()
            .zip(self.models.failure_counts().await)
            .map(|(descriptor, (model, failures))| ModelFailureCount {
                model,
                tier: descriptor.tier(),
                failures,
            })
            .collect();

        PoolDiagnostics {
            credential_count: self.credentials.len(),
            model_count: self.models.len(),
            per_model_failure_counts,
            last_successful_model: self.models.last_successful().await,
            credential_failure_counts: self.credentials.failure_counts().await,
            cache_entries: self.cache.live_entries().await,
        }
    }

    fn record_dispatch(&self, outcome: DispatchLabel) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if let Err(e) = metrics.record_dispatch(outcome) {
            tracing::warn!(
                error = %e,
                outcome = outcome.as_str(),
                "Failed to record dispatch metric"
            );
            metrics.metrics_recording_failure("record_dispatch");
        }
    }

    fn record_attempt(&self, result: AttemptLabel, elapsed: Duration) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if let Err(e) = metrics.record_attempt(result) {
            tracing::warn!(error = %e, result = result.as_str(), "Failed to record attempt metric");
            metrics.metrics_recording_failure("record_attempt");
        }
        if let Err(e) = metrics.record_upstream_duration(result, elapsed.as_secs_f64() * 1000.0) {
            tracing::warn!(error = %e, "Failed to record upstream duration metric");
            metrics.metrics_recording_failure("record_upstream_duration");
        }
    }
}

/// Prepend the system prompt as the first upstream turn (skipped when blank)
fn with_system_prompt(system_prompt: &str, messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut turns = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.trim().is_empty() {
        turns.push(ChatMessage::system(system_prompt));
    }
    turns.extend_from_slice(messages);
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ModelDescriptor;
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use std::sync::Mutex;

    /// Upstream whose answer depends on (model, key); records every call
    struct ScriptedUpstream {
        calls: Mutex<Vec<(String, String)>>,
        respond: fn(&str, &str) -> Result<String, UpstreamError>,
    }

    impl ScriptedUpstream {
        fn new(respond: fn(&str, &str) -> Result<String, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond,
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn complete(&self, request: UpstreamRequest<'_>) -> Result<String, UpstreamError> {
            let key = request.credential.expose_secret().to_string();
            self.calls
                .lock()
                .unwrap()
                .push((request.model.to_string(), key.clone()));
            (self.respond)(request.model, &key)
        }
    }

    fn http(status: u16, message: &str) -> UpstreamError {
        UpstreamError::Http {
            status,
            message: message.to_string(),
        }
    }

    fn dispatcher(keys: &[&str], models: &[&str], upstream: Arc<dyn Upstream>) -> Dispatcher {
        let secrets = keys.iter().map(|k| SecretString::from(k.to_string())).collect();
        let catalog = models
            .iter()
            .map(|id| ModelDescriptor::new(*id, 1))
            .collect();
        Dispatcher::new(
            CredentialPool::new(secrets),
            ModelRotation::new(catalog).unwrap(),
            upstream,
        )
    }

    fn hello() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[test]
    fn test_options_are_clamped() {
        let options = SendOptions {
            max_tokens: Some(4096.0),
            temperature: Some(1.7),
            top_p: Some(-0.2),
            use_cache: None,
        };
        let generation = options.generation();
        assert_eq!(generation.max_tokens, 500);
        assert_eq!(generation.temperature, 1.0);
        assert_eq!(generation.top_p, 0.0);
        assert!(options.use_cache());

        let generation = SendOptions {
            max_tokens: Some(0.0),
            temperature: Some(f64::NAN),
            ..Default::default()
        }
        .generation();
        assert_eq!(generation.max_tokens, 1);
        assert_eq!(generation.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(generation.top_p, DEFAULT_TOP_P);

        for (requested, expected) in [
            (-5.0, 1),
            (250.5, 250),
            (1e12, MAX_TOKENS_LIMIT),
            (f64::INFINITY, DEFAULT_MAX_TOKENS),
        ] {
            let generation = SendOptions {
                max_tokens: Some(requested),
                ..Default::default()
            }
            .generation();
            assert_eq!(generation.max_tokens, expected, "max_tokens {}", requested);
        }
    }

    #[test]
    fn test_options_accept_any_json_number() {
        let options: SendOptions =
            serde_json::from_str(r#"{"max_tokens": -5, "temperature": 2}"#).unwrap();
        assert_eq!(options.generation().max_tokens, 1);
        assert_eq!(options.generation().temperature, 1.0);
    }

    #[test]
    fn test_system_prompt_is_first_turn() {
        let turns = with_system_prompt("Be brief.", &hello());
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatMessage::system("Be brief."));

        assert_eq!(with_system_prompt("  ", &hello()).len(), 1);
    }

    #[tokio::test]
    async fn test_success_returns_model_and_fills_cache() {
        let upstream = ScriptedUpstream::new(|model, _| Ok(format!("answer from {}", model)));
        let dispatcher = dispatcher(&["k1"], &["m1", "m2"], upstream.clone());

        let outcome = dispatcher
            .send(&hello(), "You are an assistant.", &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.model, "m1");
        assert_eq!(outcome.message, "answer from m1");
        assert!(!outcome.cached);
        assert!(!outcome.fallback);

        let key = dispatcher.cache().key("You are an assistant.", &hello());
        let cached = dispatcher.cache().get(&key).await.expect("cache entry");
        assert_eq!(cached.model, "m1");
        assert_eq!(dispatcher.models().last_successful().await.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_second_identical_call_is_cached() {
        let upstream = ScriptedUpstream::new(|_, _| Ok("same".to_string()));
        let dispatcher = dispatcher(&["k1"], &["m1"], upstream.clone());

        let first = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();
        let second = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(first.message, second.message);
        assert!(second.cached);
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_cache() {
        let upstream = ScriptedUpstream::new(|_, _| Ok("fresh".to_string()));
        let dispatcher = dispatcher(&["k1"], &["m1"], upstream.clone());
        let options = SendOptions {
            use_cache: Some(false),
            ..Default::default()
        };

        dispatcher.send(&hello(), "sys", &options).await.unwrap();
        let second = dispatcher.send(&hello(), "sys", &options).await.unwrap();

        assert!(!second.cached);
        assert_eq!(upstream.calls().len(), 2);
        assert_eq!(dispatcher.cache().live_entries().await, 0);
    }

    #[tokio::test]
    async fn test_authentication_failure_penalizes_only_credential() {
        let upstream = ScriptedUpstream::new(|_, key| match key {
            "bad" => Err(http(401, "Invalid API key")),
            _ => Ok("ok".to_string()),
        });
        let dispatcher = dispatcher(&["bad", "good"], &["m1", "m2"], upstream.clone());

        let outcome = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.message, "ok");
        assert_eq!(upstream.calls().len(), 2);
        assert_eq!(dispatcher.credentials().failure_counts().await, vec![1, 0]);
        assert_eq!(dispatcher.models().failure_count("m1").await, Some(0));
    }

    #[tokio::test]
    async fn test_other_errors_penalize_model_and_continue() {
        let upstream = ScriptedUpstream::new(|model, _| match model {
            "m1" => Err(http(500, "internal error")),
            _ => Ok("from m2".to_string()),
        });
        let dispatcher = dispatcher(&["k1"], &["m1", "m2"], upstream.clone());

        let outcome = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.model, "m2");
        assert_eq!(dispatcher.models().failure_count("m1").await, Some(1));
        assert_eq!(dispatcher.credentials().failure_counts().await, vec![0]);
    }

    #[tokio::test]
    async fn test_client_error_stops_after_one_attempt() {
        let upstream = ScriptedUpstream::new(|_, _| Err(http(400, "messages: field required")));
        let dispatcher = dispatcher(&["k1"], &["m1", "m2", "m3"], upstream.clone());

        let err = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap_err();

        assert_eq!(upstream.calls().len(), 1);
        let DispatchError::AllProvidersUnavailable { attempts, detail } = err;
        assert_eq!(attempts, 1);
        assert!(detail.contains("field required"));
    }

    #[tokio::test]
    async fn test_budget_is_capped_by_catalog_size() {
        let upstream = ScriptedUpstream::new(|_, _| Err(http(500, "boom")));
        let dispatcher = dispatcher(&["k1"], &["m1", "m2", "m3"], upstream.clone())
            .with_max_attempts(10);

        let err = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap_err();

        assert_eq!(upstream.calls().len(), 3);
        assert!(matches!(
            err,
            DispatchError::AllProvidersUnavailable { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_pool_falls_back_without_calls() {
        let upstream = ScriptedUpstream::new(|_, _| Ok("never".to_string()));
        let dispatcher = dispatcher(&[], &["m1"], upstream.clone());

        let outcome = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        assert!(outcome.fallback);
        assert_eq!(outcome.model, FALLBACK_MODEL);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auth_exhaustion_falls_back() {
        let upstream = ScriptedUpstream::new(|_, _| Err(http(403, "API key disabled")));
        let dispatcher = dispatcher(&["k1", "k2"], &["m1", "m2"], upstream.clone());

        let outcome = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        assert!(outcome.fallback);
        assert_eq!(upstream.calls().len(), 2);
        // Fallback answers are never cached
        assert_eq!(dispatcher.cache().live_entries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_upstream_times_out_as_other() {
        struct Hanging;

        #[async_trait]
        impl Upstream for Hanging {
            async fn complete(&self, _: UpstreamRequest<'_>) -> Result<String, UpstreamError> {
                std::future::pending().await
            }
        }

        let dispatcher = dispatcher(&["k1"], &["m1"], Arc::new(Hanging))
            .with_request_timeout(Duration::from_secs(30));

        let err = dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap_err();

        assert!(err.detail().contains("timed out after 30s"));
        assert_eq!(dispatcher.models().failure_count("m1").await, Some(1));
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let upstream = ScriptedUpstream::new(|model, _| match model {
            "m1" => Err(http(503, "overloaded")),
            _ => Ok("ok".to_string()),
        });
        let dispatcher = dispatcher(&["k1", "k2"], &["m1", "m2"], upstream);

        dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        let diagnostics = dispatcher.diagnostics().await;
        assert_eq!(diagnostics.credential_count, 2);
        assert_eq!(diagnostics.model_count, 2);
        assert_eq!(diagnostics.per_model_failure_counts[0].failures, 1);
        assert_eq!(diagnostics.last_successful_model.as_deref(), Some("m2"));
        assert_eq!(diagnostics.credential_failure_counts.iter().sum::<u32>(), 1);
        assert_eq!(diagnostics.cache_entries, 1);

        dispatcher.reset_failure_counters().await;
        dispatcher.clear_cache().await;

        let diagnostics = dispatcher.diagnostics().await;
        assert!(
            diagnostics
                .per_model_failure_counts
                .iter()
                .all(|m| m.failures == 0)
        );
        assert_eq!(diagnostics.credential_failure_counts, vec![0, 0]);
        assert_eq!(diagnostics.cache_entries, 0);
        assert_eq!(diagnostics.last_successful_model.as_deref(), Some("m2"));
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let metrics = Metrics::new().unwrap();
        let upstream = ScriptedUpstream::new(|_, _| Ok("ok".to_string()));
        let dispatcher =
            dispatcher(&["k1"], &["m1"], upstream).with_metrics(metrics.clone());

        dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();
        dispatcher
            .send(&hello(), "sys", &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(metrics.dispatch_count(DispatchLabel::Upstream), 1);
        assert_eq!(metrics.dispatch_count(DispatchLabel::Cached), 1);
        assert_eq!(metrics.attempt_count(AttemptLabel::Success), 1);
    }
}
