//! Built-in catalog of upstream model identifiers
//!
//! Ordered best-quality first. Rotation never reorders this list, it only skips
//! entries whose failure count is too high.

use serde::{Deserialize, Serialize};

/// One selectable upstream model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ModelDescriptor {
    id: String,
    tier: u8,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, tier: u8) -> Self {
        Self {
            id: id.into(),
            tier,
        }
    }

    /// Upstream model identifier sent with each request
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Priority rank (lower = preferred)
    pub fn tier(&self) -> u8 {
        self.tier
    }
}

/// Tier-ordered built-in catalog as `(identifier, tier)` pairs
pub const DEFAULT_CATALOG: &[(&str, u8)] = &[
    // Tier 1: strongest general-purpose instruct models
    ("meta-llama/llama-3.3-70b-instruct:free", 1),
    ("deepseek/deepseek-chat-v3-0324:free", 1),
    ("google/gemini-2.0-flash-exp:free", 1),
    // Tier 2: solid mid-size models
    ("qwen/qwen-2.5-72b-instruct:free", 2),
    ("mistralai/mistral-small-3.1-24b-instruct:free", 2),
    ("google/gemma-3-27b-it:free", 2),
    // Tier 3: small models, most permissive availability
    ("mistralai/mistral-7b-instruct:free", 3),
    ("meta-llama/llama-3.2-3b-instruct:free", 3),
    ("qwen/qwen-2.5-7b-instruct:free", 3),
    ("google/gemma-2-9b-it:free", 3),
    ("microsoft/phi-3-mini-128k-instruct:free", 3),
    ("huggingfaceh4/zephyr-7b-beta:free", 3),
];

/// Build the built-in catalog as descriptors
pub fn default_catalog() -> Vec<ModelDescriptor> {
    DEFAULT_CATALOG
        .iter()
        .map(|(id, tier)| ModelDescriptor::new(*id, *tier))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_catalog_is_tier_ordered() {
        let catalog = default_catalog();
        assert!(
            catalog.windows(2).all(|pair| pair[0].tier() <= pair[1].tier()),
            "catalog must list better tiers first"
        );
    }

    #[test]
    fn test_default_catalog_ids_are_unique() {
        let ids: HashSet<&str> = DEFAULT_CATALOG.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), DEFAULT_CATALOG.len());
    }

    #[test]
    fn test_default_catalog_exceeds_attempt_budget() {
        // Ten attempts per call should never revisit a model on a cold start
        assert!(DEFAULT_CATALOG.len() >= 10);
    }
}
