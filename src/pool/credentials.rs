//! Credential pool
//!
//! Holds the configured API credentials and hands them out round-robin, skipping
//! credentials that have failed too often recently.
//!
//! - `failure_threshold` (3) recent failures → skipped by `next()`
//! - every failure is forgiven again after `cooldown` (5 minutes)
//! - all credentials over the threshold → every count resets to 0

use super::schedule_decrement;
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default number of recent failures after which a credential is skipped
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Default time after which a single credential failure is forgotten
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// A credential handed out by the pool
///
/// Identified by its position in the pool; the secret itself is never logged.
#[derive(Clone)]
pub struct Credential {
    index: usize,
    secret: Arc<SecretString>,
}

impl Credential {
    /// Position of this credential in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bearer secret for the upstream request
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

struct CredentialState {
    failures: Vec<u32>,
    cursor: usize,
}

fn failures(state: &mut CredentialState) -> &mut Vec<u32> {
    &mut state.failures
}

/// Round-robin pool of API credentials with decaying failure counts
pub struct CredentialPool {
    secrets: Vec<Arc<SecretString>>,
    state: Arc<RwLock<CredentialState>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CredentialPool {
    /// Create a pool with the default threshold and cooldown
    pub fn new(secrets: Vec<SecretString>) -> Self {
        Self::with_settings(secrets, DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }

    /// Create a pool with explicit failure threshold and cooldown
    pub fn with_settings(
        secrets: Vec<SecretString>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        let secrets: Vec<_> = secrets.into_iter().map(Arc::new).collect();

        tracing::info!(
            credential_count = secrets.len(),
            failure_threshold = failure_threshold,
            cooldown_seconds = cooldown.as_secs(),
            "Credential pool initialized"
        );

        Self {
            state: Arc::new(RwLock::new(CredentialState {
                failures: vec![0; secrets.len()],
                cursor: 0,
            })),
            secrets,
            failure_threshold,
            cooldown,
        }
    }

    /// Number of configured credentials
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// True when no credentials are configured
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Pick the next credential to try
    ///
    /// Advances the rotation cursor on every call and returns the first credential
    /// at or after it whose failure count is below the threshold. When every
    /// credential is over the threshold all counts are reset and the first
    /// credential is returned. Returns `None` only for an empty pool.
    pub async fn next(&self) -> Option<Credential> {
        if self.secrets.is_empty() {
            return None;
        }

        let mut state = self.state.write().await;
        let len = self.secrets.len();
        let start = state.cursor;
        state.cursor = (start + 1) % len;

        let available = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| state.failures[idx] < self.failure_threshold);

        let index = match available {
            Some(idx) => idx,
            None => {
                tracing::warn!(
                    credential_count = len,
                    failure_threshold = self.failure_threshold,
                    "All credentials over failure threshold, resetting every count. \
                    A sustained upstream outage will be retried in full."
                );
                state.failures.iter_mut().for_each(|count| *count = 0);
                0
            }
        };

        Some(Credential {
            index,
            secret: Arc::clone(&self.secrets[index]),
        })
    }

    /// Count a failure against a credential and schedule its decay
    pub async fn record_failure(&self, credential: &Credential) {
        {
            let mut state = self.state.write().await;
            let Some(count) = state.failures.get_mut(credential.index) else {
                tracing::warn!(
                    credential_index = credential.index,
                    "Attempted to record failure for unknown credential"
                );
                return;
            };
            *count += 1;

            if *count == self.failure_threshold {
                tracing::warn!(
                    credential_index = credential.index,
                    failure_count = *count,
                    "Credential reached failure threshold, skipping until it cools down"
                );
            } else {
                tracing::debug!(
                    credential_index = credential.index,
                    failure_count = *count,
                    "Credential failure recorded"
                );
            }
        }

        schedule_decrement(&self.state, credential.index, self.cooldown, failures);
    }

    /// Clear a credential's failure count after a successful call
    pub async fn record_success(&self, credential: &Credential) {
        let mut state = self.state.write().await;
        if let Some(count) = state.failures.get_mut(credential.index) {
            if *count > 0 {
                tracing::debug!(
                    credential_index = credential.index,
                    previous_failures = *count,
                    "Credential recovered"
                );
            }
            *count = 0;
        }
    }

    /// Reset every failure count to zero
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.failures.iter_mut().for_each(|count| *count = 0);
    }

    /// Current failure count of every credential, by pool position
    pub async fn failure_counts(&self) -> Vec<u32> {
        self.state.read().await.failures.clone()
    }
}
