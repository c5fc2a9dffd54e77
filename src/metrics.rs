//! Prometheus metrics collection for Keyrotor
//!
//! This module provides metrics instrumentation for tracking:
//! - Dispatch outcomes (cache hit, upstream answer, fallback, unavailable)
//! - Upstream attempts by classified result
//! - Upstream call latency
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::upstream::FailureKind;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// How a dispatch call resolved, as a type-safe metrics label
///
/// Restricting the label to a closed enum keeps cardinality fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchLabel {
    /// Served from the response cache
    Cached,
    /// Answered by an upstream provider
    Upstream,
    /// Answered by the fallback responder
    Fallback,
    /// Surfaced as all-providers-unavailable
    Unavailable,
}

impl DispatchLabel {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchLabel::Cached => "cached",
            DispatchLabel::Upstream => "upstream",
            DispatchLabel::Fallback => "fallback",
            DispatchLabel::Unavailable => "unavailable",
        }
    }
}

/// Result of a single upstream attempt, as a type-safe metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptLabel {
    Success,
    Failure(FailureKind),
}

impl AttemptLabel {
    /// Convert attempt result to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptLabel::Success => "success",
            AttemptLabel::Failure(kind) => kind.as_str(),
        }
    }
}

/// Metrics collector for Keyrotor
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    dispatch_total: IntCounterVec,
    upstream_attempts: IntCounterVec,
    upstream_duration: HistogramVec,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 4 outcomes
        let dispatch_total = IntCounterVec::new(
            Opts::new(
                "keyrotor_dispatch_total",
                "Total number of dispatch calls by outcome",
            ),
            &["outcome"],
        )?;

        // Cardinality: success + 4 failure kinds
        let upstream_attempts = IntCounterVec::new(
            Opts::new(
                "keyrotor_upstream_attempts_total",
                "Total number of upstream attempts by classified result",
            ),
            &["result"],
        )?;

        let upstream_duration = HistogramVec::new(
            HistogramOpts::new(
                "keyrotor_upstream_duration_ms",
                "Upstream call latency in milliseconds, including failed calls",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["result"],
        )?;

        // Prometheus internal errors; frequent increments need investigation
        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "keyrotor_metrics_recording_failures_total",
                "Total number of metrics recording operation failures by operation",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(dispatch_total.clone()))?;
        registry.register(Box::new(upstream_attempts.clone()))?;
        registry.register(Box::new(upstream_duration.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            dispatch_total,
            upstream_attempts,
            upstream_duration,
            metrics_recording_failures,
        })
    }

    pub fn record_dispatch(&self, outcome: DispatchLabel) -> Result<(), prometheus::Error> {
        self.dispatch_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_attempt(&self, result: AttemptLabel) -> Result<(), prometheus::Error> {
        self.upstream_attempts
            .get_metric_with_label_values(&[result.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_upstream_duration(
        &self,
        result: AttemptLabel,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite (not NaN or Infinity), got: {}",
                duration_ms
            )));
        }

        if duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be non-negative (duration cannot be negative), got: {}",
                duration_ms
            )));
        }

        self.upstream_duration
            .get_metric_with_label_values(&[result.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.counter_sum("keyrotor_metrics_recording_failures_total")
    }

    /// Current value of `keyrotor_dispatch_total` for one outcome
    pub fn dispatch_count(&self, outcome: DispatchLabel) -> u64 {
        self.dispatch_total.with_label_values(&[outcome.as_str()]).get()
    }

    /// Current value of `keyrotor_upstream_attempts_total` for one result
    pub fn attempt_count(&self, result: AttemptLabel) -> u64 {
        self.upstream_attempts
            .with_label_values(&[result.as_str()])
            .get()
    }

    fn counter_sum(&self, name: &str) -> u64 {
        let metric_families = self.registry.gather();
        metric_families
            .iter()
            .find(|mf| mf.name() == name)
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Encode all registered metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            let metric_names: Vec<_> = metric_families.iter().map(|mf| mf.name()).collect();

            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                metric_names = ?metric_names,
                "Prometheus text encoder failed"
            );

            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );

            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}
