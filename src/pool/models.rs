//! Model rotation table
//!
//! Picks the upstream model for each attempt from a tier-ordered catalog.
//! The last model that succeeded is reused while it stays below the sticky
//! threshold; otherwise a cursor walks the catalog and skips models with too
//! many recent failures.

use super::catalog::ModelDescriptor;
use super::schedule_decrement;
use crate::error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default failure count below which the last successful model is reused
pub const DEFAULT_STICKY_THRESHOLD: u32 = 3;
/// Default failure count at which a model is skipped during rotation
pub const DEFAULT_SKIP_THRESHOLD: u32 = 5;
/// Default time after which a single model failure is forgotten
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

struct RotationState {
    failures: Vec<u32>,
    cursor: usize,
    last_success: Option<usize>,
}

fn failures(state: &mut RotationState) -> &mut Vec<u32> {
    &mut state.failures
}

/// Failure-aware rotation over the model catalog
pub struct ModelRotation {
    catalog: Vec<ModelDescriptor>,
    state: Arc<RwLock<RotationState>>,
    sticky_threshold: u32,
    skip_threshold: u32,
    cooldown: Duration,
}

impl ModelRotation {
    /// Create a rotation table with default thresholds
    ///
    /// # Errors
    /// Returns an error if the catalog is empty.
    pub fn new(catalog: Vec<ModelDescriptor>) -> AppResult<Self> {
        Self::with_settings(
            catalog,
            DEFAULT_STICKY_THRESHOLD,
            DEFAULT_SKIP_THRESHOLD,
            DEFAULT_COOLDOWN,
        )
    }

    /// Create a rotation table with explicit thresholds and cooldown
    ///
    /// The catalog is stable-sorted by tier so configured order is kept within a tier.
    ///
    /// # Errors
    /// Returns an error if the catalog is empty.
    pub fn with_settings(
        mut catalog: Vec<ModelDescriptor>,
        sticky_threshold: u32,
        skip_threshold: u32,
        cooldown: Duration,
    ) -> AppResult<Self> {
        if catalog.is_empty() {
            return Err(AppError::Config(
                "Model catalog is empty. At least one model identifier is required.".to_string(),
            ));
        }
        catalog.sort_by_key(|model| model.tier());

        tracing::info!(
            model_count = catalog.len(),
            sticky_threshold = sticky_threshold,
            skip_threshold = skip_threshold,
            cooldown_seconds = cooldown.as_secs(),
            "Model rotation initialized"
        );

        Ok(Self {
            state: Arc::new(RwLock::new(RotationState {
                failures: vec![0; catalog.len()],
                cursor: 0,
                last_success: None,
            })),
            catalog,
            sticky_threshold,
            skip_threshold,
            cooldown,
        })
    }

    /// Number of models in the catalog
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Always false; construction rejects an empty catalog
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Tier-ordered catalog
    pub fn catalog(&self) -> &[ModelDescriptor] {
        &self.catalog
    }

    /// Pick the model for the next attempt
    pub async fn next(&self) -> ModelDescriptor {
        let mut state = self.state.write().await;

        if let Some(last) = state.last_success
            && state.failures[last] < self.sticky_threshold
        {
            return self.catalog[last].clone();
        }

        let len = self.catalog.len();
        let start = state.cursor;
        let available = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| state.failures[idx] < self.skip_threshold);

        let index = match available {
            Some(idx) => idx,
            None => {
                tracing::warn!(
                    model_count = len,
                    skip_threshold = self.skip_threshold,
                    "All models over failure threshold, resetting every count. \
                    A sustained upstream outage will be retried in full."
                );
                state.failures.iter_mut().for_each(|count| *count = 0);
                0
            }
        };
        state.cursor = (index + 1) % len;

        self.catalog[index].clone()
    }

    fn position(&self, model: &ModelDescriptor) -> Option<usize> {
        self.catalog.iter().position(|m| m.id() == model.id())
    }

    /// Count a failure against a model and schedule its decay
    pub async fn record_failure(&self, model: &ModelDescriptor) {
        let Some(index) = self.position(model) else {
            tracing::warn!(model = %model.id(), "Attempted to record failure for unknown model");
            return;
        };

        {
            let mut state = self.state.write().await;
            state.failures[index] += 1;
            let count = state.failures[index];

            if count == self.skip_threshold {
                tracing::warn!(
                    model = %model.id(),
                    failure_count = count,
                    "Model reached failure threshold, skipping until it cools down"
                );
            } else {
                tracing::debug!(
                    model = %model.id(),
                    failure_count = count,
                    "Model failure recorded"
                );
            }
        }

        schedule_decrement(&self.state, index, self.cooldown, failures);
    }

    /// Clear a model's failure count and make it the sticky preference
    pub async fn record_success(&self, model: &ModelDescriptor) {
        let Some(index) = self.position(model) else {
            tracing::warn!(model = %model.id(), "Attempted to record success for unknown model");
            return;
        };

        let mut state = self.state.write().await;
        state.failures[index] = 0;
        if state.last_success != Some(index) {
            tracing::info!(model = %model.id(), "Sticky model preference updated");
        }
        state.last_success = Some(index);
    }

    /// Reset every failure count to zero (the sticky preference is kept)
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.failures.iter_mut().for_each(|count| *count = 0);
    }

    /// Identifier of the last model that succeeded
    pub async fn last_successful(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .last_success
            .map(|idx| self.catalog[idx].id().to_string())
    }

    /// Failure count of every model in catalog order
    pub async fn failure_counts(&self) -> Vec<(String, u32)> {
        let state = self.state.read().await;
        self.catalog
            .iter()
            .zip(state.failures.iter())
            .map(|(model, count)| (model.id().to_string(), *count))
            .collect()
    }

    /// Failure count of a single model, `None` if it is not in the catalog
    pub async fn failure_count(&self, id: &str) -> Option<u32> {
        let index = self.catalog.iter().position(|m| m.id() == id)?;
        Some(self.state.read().await.failures[index])
    }
}
