//! Short-lived response cache
//!
//! Keys are SHA-256 digests of the system prompt prefix and the latest user
//! message. Two conversations that share both collide on purpose: earlier turns
//! are not part of the key.
//!
//! Entries live in a bounded moka cache that evicts on its own TTL and capacity.
//! Freshness is also checked on read against the insertion instant, and an
//! expired entry found on read is removed immediately.

use crate::upstream::ChatMessage;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Default number of system prompt characters that take part in the key
pub const DEFAULT_PROMPT_PREFIX_CHARS: usize = 50;
/// Default upper bound on stored entries
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// A cached upstream answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Generated text
    pub text: String,
    /// Model identifier that produced the text
    pub model: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

/// Concurrent key → response memo with TTL and a capacity bound
pub struct ResponseCache {
    inner: Cache<String, CacheEntry>,
    ttl: Duration,
    prompt_prefix_chars: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_PROMPT_PREFIX_CHARS)
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration, prompt_prefix_chars: usize) -> Self {
        Self::with_capacity(ttl, prompt_prefix_chars, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, prompt_prefix_chars: usize, max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            ttl,
            prompt_prefix_chars,
        }
    }

    /// Compute the cache key for a conversation
    ///
    /// Uses the first `prompt_prefix_chars` characters of the system prompt and the
    /// full text of the most recent user message. Character-based truncation keeps
    /// multi-byte text intact. The prefix is length-framed so no split of the same
    /// bytes between prefix and message can collide.
    pub fn key(&self, system_prompt: &str, messages: &[ChatMessage]) -> String {
        let prefix: String = system_prompt.chars().take(self.prompt_prefix_chars).collect();
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update((prefix.len() as u64).to_be_bytes());
        hasher.update(prefix.as_bytes());
        hasher.update(last_user.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a live entry; expired entries are a miss and are dropped
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let entry = self.inner.get(key).await?;

        if entry.is_fresh(self.ttl) {
            return Some(entry.response);
        }

        tracing::debug!(
            cache_key = %key,
            age_seconds = entry.inserted_at.elapsed().as_secs(),
            "Cache entry expired"
        );
        self.inner.invalidate(key).await;
        None
    }

    /// Insert or overwrite an entry
    pub async fn put(&self, key: String, response: CachedResponse) {
        self.inner
            .insert(
                key,
                CacheEntry {
                    response,
                    inserted_at: Instant::now(),
                },
            )
            .await;
    }

    /// Remove every entry
    pub async fn clear(&self) {
        self.inner.run_pending_tasks().await;
        let removed = self.inner.entry_count();
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        tracing::info!(removed_entries = removed, "Response cache cleared");
    }

    /// Number of entries that are still within their TTL
    pub async fn live_entries(&self) -> usize {
        self.inner
            .iter()
            .filter(|(_, entry)| entry.is_fresh(self.ttl))
            .count()
    }

    /// Number of entries held, fresh or not, after pending evictions run
    pub async fn stored_entries(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
