//! HTTP request handlers for the Keyrotor API

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::upstream::{OpenAiUpstream, Upstream};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod chat;
pub mod extractor;
pub mod health;
pub mod metrics;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create state that talks to the configured OpenAI-compatible upstream
    ///
    /// # Errors
    /// Returns an error if the HTTP client, the metrics registry or the model
    /// rotation cannot be created.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let upstream = OpenAiUpstream::new(config.upstream.base_url.clone())?
            .with_attribution(config.upstream.referer.clone(), config.upstream.title.clone());
        Self::with_upstream(config, Arc::new(upstream))
    }

    /// Create state around an explicit upstream implementation
    pub fn with_upstream(config: Arc<Config>, upstream: Arc<dyn Upstream>) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("Failed to initialize metrics: {}", e)))?;
        let dispatcher = Dispatcher::from_config(&config, upstream)?.with_metrics(metrics.clone());

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            metrics: Arc::new(metrics),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the full HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .route("/admin/cache/clear", post(admin::clear_cache))
        .route("/admin/pools/reset", post(admin::reset_pools))
        .route("/admin/diagnostics", get(admin::diagnostics))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 3000

[credentials]
keys = ["k1", "k2"]

[[models]]
id = "m1"
tier = 1
"#;

    #[test]
    fn test_appstate_new_creates_state() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let state = AppState::new(Arc::new(config)).expect("should create AppState");

        assert_eq!(state.config().server.port, 3000);
        assert_eq!(state.dispatcher().credentials().len(), 2);
        assert_eq!(state.dispatcher().models().len(), 1);
    }

    #[test]
    fn test_appstate_is_clonable() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let state = AppState::new(Arc::new(config)).unwrap();
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.dispatcher, &cloned.dispatcher));
    }
}
