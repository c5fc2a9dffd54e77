//! Configuration management for Keyrotor
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::pool::ModelDescriptor;
use crate::pool::catalog::default_catalog;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Environment variable holding extra comma-separated API keys
pub const API_KEYS_ENV: &str = "KEYROTOR_API_KEYS";

/// Upper bound for any per-attempt timeout
const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Replaces the built-in catalog when non-empty
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Attempt budget per call; the effective budget is capped by catalog size
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Optional `HTTP-Referer` attribution header
    #[serde(default)]
    pub referer: Option<String>,
    /// Optional `X-Title` attribution header
    #[serde(default)]
    pub title: Option<String>,
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
            max_attempts: default_max_attempts(),
            referer: None,
            title: None,
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> usize {
    10
}

/// API credentials loaded at startup
///
/// Keys are private and redacted from `Debug` output.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    keys: Vec<String>,
}

impl CredentialsConfig {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// Number of configured keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys wrapped as secrets, in configuration order
    pub fn secrets(&self) -> Vec<SecretString> {
        self.keys
            .iter()
            .map(|key| SecretString::from(key.clone()))
            .collect()
    }

    /// Append comma-separated keys (as found in [`API_KEYS_ENV`]); blanks are skipped
    pub fn extend_from_list(&mut self, list: &str) {
        self.keys.extend(
            list.split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
        );
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .finish()
    }
}

/// Failure thresholds and cooldowns for both rotation pools
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "default_credential_failure_threshold")]
    pub credential_failure_threshold: u32,
    #[serde(default = "default_credential_cooldown")]
    pub credential_cooldown_seconds: u64,
    #[serde(default = "default_model_sticky_threshold")]
    pub model_sticky_threshold: u32,
    #[serde(default = "default_model_skip_threshold")]
    pub model_skip_threshold: u32,
    #[serde(default = "default_model_cooldown")]
    pub model_cooldown_seconds: u64,
}

impl PoolsConfig {
    pub fn credential_cooldown(&self) -> Duration {
        Duration::from_secs(self.credential_cooldown_seconds)
    }

    pub fn model_cooldown(&self) -> Duration {
        Duration::from_secs(self.model_cooldown_seconds)
    }
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            credential_failure_threshold: default_credential_failure_threshold(),
            credential_cooldown_seconds: default_credential_cooldown(),
            model_sticky_threshold: default_model_sticky_threshold(),
            model_skip_threshold: default_model_skip_threshold(),
            model_cooldown_seconds: default_model_cooldown(),
        }
    }
}

fn default_credential_failure_threshold() -> u32 {
    3
}

fn default_credential_cooldown() -> u64 {
    300
}

fn default_model_sticky_threshold() -> u32 {
    3
}

fn default_model_skip_threshold() -> u32 {
    5
}

fn default_model_cooldown() -> u64 {
    600
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_prompt_prefix_chars")]
    pub prompt_prefix_chars: usize,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_cache_ttl(),
            prompt_prefix_chars: default_prompt_prefix_chars(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_prompt_prefix_chars() -> usize {
    50
}

fn default_cache_max_entries() -> u64 {
    10_000
}

/// Administrative access settings
///
/// Admin routes are refused entirely while no token is configured.
#[derive(Clone, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    token: Option<SecretString>,
}

impl AdminConfig {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(SecretString::from),
        }
    }

    /// Check a presented token against the configured one in constant time
    pub fn authorizes(&self, presented: &str) -> bool {
        self.token.as_ref().is_some_and(|expected| {
            let expected = expected.expose_secret();
            !expected.is_empty() && constant_time_eq(expected, presented)
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn is_blank(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| token.expose_secret().trim().is_empty())
    }
}

/// Compare two strings without short-circuiting on the first differing byte
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Model catalog in effect: configured `[[models]]` or the built-in list
    pub fn catalog(&self) -> Vec<ModelDescriptor> {
        if self.models.is_empty() {
            default_catalog()
        } else {
            self.models.clone()
        }
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`, but can also
    /// be called explicitly when constructing Config via other means.
    pub fn validate(&self) -> AppResult<()> {
        let upstream = &self.upstream;
        if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "upstream.base_url '{}' must start with 'http://' or 'https://'",
                upstream.base_url
            )));
        }

        if upstream.request_timeout_seconds == 0
            || upstream.request_timeout_seconds > MAX_TIMEOUT_SECONDS
        {
            return Err(AppError::Config(format!(
                "upstream.request_timeout_seconds must be between 1 and {}, got {}",
                MAX_TIMEOUT_SECONDS, upstream.request_timeout_seconds
            )));
        }

        if upstream.max_attempts == 0 {
            return Err(AppError::Config(
                "upstream.max_attempts must be at least 1".to_string(),
            ));
        }

        if let Some(position) = self.credentials.keys.iter().position(|k| k.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "credentials.keys[{}] is empty. Remove it or provide a real key.",
                position
            )));
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.id().trim().is_empty() {
                return Err(AppError::Config(
                    "models entries must have a non-empty id".to_string(),
                ));
            }
            if !seen.insert(model.id()) {
                return Err(AppError::Config(format!(
                    "models contains duplicate id '{}'",
                    model.id()
                )));
            }
        }

        let pools = &self.pools;
        for (name, value) in [
            (
                "pools.credential_failure_threshold",
                pools.credential_failure_threshold,
            ),
            ("pools.model_sticky_threshold", pools.model_sticky_threshold),
            ("pools.model_skip_threshold", pools.model_skip_threshold),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be at least 1", name)));
            }
        }
        if pools.credential_cooldown_seconds == 0 || pools.model_cooldown_seconds == 0 {
            return Err(AppError::Config(
                "pools cooldowns must be greater than 0 seconds".to_string(),
            ));
        }

        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache.ttl_seconds must be greater than 0 when the cache is enabled".to_string(),
            ));
        }
        if self.cache.prompt_prefix_chars == 0 {
            return Err(AppError::Config(
                "cache.prompt_prefix_chars must be greater than 0".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(AppError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.admin.is_blank() {
            return Err(AppError::Config(
                "admin.token must not be empty. Omit it to disable admin routes.".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
