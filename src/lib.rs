//! Keyrotor - adaptive request router for unreliable text-generation providers
//!
//! Rotates API credentials and model identifiers across an upstream provider,
//! quarantines failing pairs with decaying failure counts, memoizes recent
//! answers and answers from canned text when nothing upstream is reachable.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod pool;
pub mod telemetry;
pub mod upstream;
