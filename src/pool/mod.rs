//! Rotation pools for upstream credentials and model identifiers
//!
//! Both pools keep a rolling failure count per member. A failure's weight is
//! removed again by a deferred decrement once its cooldown window has passed.

pub mod catalog;
pub mod credentials;
pub mod models;

pub use catalog::{DEFAULT_CATALOG, ModelDescriptor};
pub use credentials::{Credential, CredentialPool};
pub use models::ModelRotation;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Schedule a single fire-and-forget decrement of `failures[index]`
///
/// The task only holds a weak reference, so a dropped pool is never kept alive
/// by pending decrements. Counts are floored at zero.
pub(crate) fn schedule_decrement<S>(
    state: &Arc<RwLock<S>>,
    index: usize,
    after: Duration,
    counts: fn(&mut S) -> &mut Vec<u32>,
) where
    S: Send + Sync + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(
            index = index,
            "No tokio runtime available, failure count will not decay"
        );
        return;
    };

    let weak = Arc::downgrade(state);
    runtime.spawn(async move {
        tokio::time::sleep(after).await;

        let Some(state) = weak.upgrade() else {
            return;
        };
        let mut guard = state.write().await;
        if let Some(count) = counts(&mut *guard).get_mut(index) {
            *count = count.saturating_sub(1);
        }
    });
}
