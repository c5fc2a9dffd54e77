//! Command-line interface for Keyrotor
//!
//! Provides CLI argument parsing and subcommands for the server.

use clap::{Parser, Subcommand};

/// Keyrotor - failure-aware router over a pool of upstream text-generation providers
#[derive(Parser)]
#[command(name = "keyrotor")]
#[command(version)]
#[command(about = "Adaptive request router for unreliable text-generation providers")]
#[command(
    long_about = "Keyrotor rotates API credentials and model identifiers across an upstream \
    provider, quarantines failing pairs, caches recent answers and degrades to canned \
    responses when nothing upstream is reachable."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a sample configuration file
    ///
    /// Outputs a commented configuration template to stdout or a file.
    Config {
        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Configuration template with comments
pub fn generate_config_template() -> &'static str {
    r#"# Keyrotor Configuration
# =======================
#
# HTTP server, upstream provider, credential and model pools, response cache
# and observability settings.

# -----------------------------------------------------------------------------
# SERVER
# -----------------------------------------------------------------------------

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# -----------------------------------------------------------------------------
# UPSTREAM PROVIDER
# -----------------------------------------------------------------------------

[upstream]
# OpenAI-compatible base URL; requests go to {base_url}/chat/completions
base_url = "https://openrouter.ai/api/v1"

# Per-attempt timeout in seconds (1-300)
request_timeout_seconds = 30

# Attempts per request; the effective budget is capped by the number of models
max_attempts = 10

# Optional attribution headers (HTTP-Referer / X-Title)
# referer = "https://example.com"
# title = "My App"

# -----------------------------------------------------------------------------
# CREDENTIALS
# -----------------------------------------------------------------------------
#
# Keys may also be supplied as a comma-separated list in KEYROTOR_API_KEYS.
# With no keys at all every request is answered by the fallback responder.

[credentials]
keys = []

# -----------------------------------------------------------------------------
# MODELS (Optional)
# -----------------------------------------------------------------------------
#
# Replaces the built-in catalog. Lower tier = preferred. Order within a tier is kept.
#
# [[models]]
# id = "meta-llama/llama-3.3-70b-instruct:free"
# tier = 1
#
# [[models]]
# id = "mistralai/mistral-7b-instruct:free"
# tier = 3

# -----------------------------------------------------------------------------
# POOLS
# -----------------------------------------------------------------------------

[pools]
# A credential is skipped once it has this many recent failures
credential_failure_threshold = 3
# Each credential failure is forgotten after this many seconds
credential_cooldown_seconds = 300

# The last successful model is reused while below this many failures
model_sticky_threshold = 3
# A model is skipped once it has this many recent failures
model_skip_threshold = 5
# Each model failure is forgotten after this many seconds
model_cooldown_seconds = 600

# -----------------------------------------------------------------------------
# CACHE
# -----------------------------------------------------------------------------

[cache]
enabled = true
ttl_seconds = 300
# Characters of the system prompt that take part in the cache key
prompt_prefix_chars = 50
# Upper bound on stored answers; the least useful are evicted first
max_entries = 10000

# -----------------------------------------------------------------------------
# ADMIN (Optional)
# -----------------------------------------------------------------------------
#
# Admin routes require the x-admin-token header. Without a token they answer 403.
#
# [admin]
# token = "change-me"

# -----------------------------------------------------------------------------
# OBSERVABILITY
# -----------------------------------------------------------------------------

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
