//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the peer host.
//! The contract itself never reads them.
//!
//! # Metrics
//!
//! - `cbdc_invocations_total{function,outcome}` - Endorsed invocations by result class
//! - `cbdc_commits_total{outcome}` - Commit attempts (committed, conflict, failed)
//! - `cbdc_invoke_duration_seconds` - Histogram of endorsement latencies

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Invocations by function and outcome
    pub invocations_total: IntCounterVec,

    /// Commit attempts by outcome
    pub commits_total: IntCounterVec,

    /// Endorsement duration histogram
    pub invoke_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let invocations_total = IntCounterVec::new(
            Opts::new("cbdc_invocations_total", "Endorsed invocations by result class"),
            &["function", "outcome"],
        )?;
        registry.register(Box::new(invocations_total.clone()))?;

        let commits_total = IntCounterVec::new(
            Opts::new("cbdc_commits_total", "Commit attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        let invoke_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cbdc_invoke_duration_seconds",
                "Histogram of endorsement latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(invoke_duration.clone()))?;

        Ok(Self {
            invocations_total,
            commits_total,
            invoke_duration,
            registry,
        })
    }

    /// Record an endorsed invocation; `outcome` is "ok" or an error kind
    pub fn record_invocation(&self, function: &str, outcome: &str) {
        self.invocations_total
            .with_label_values(&[function, outcome])
            .inc();
    }

    /// Record a commit attempt
    pub fn record_commit(&self, outcome: &str) {
        self.commits_total.with_label_values(&[outcome]).inc();
    }

    /// Record endorsement duration
    pub fn record_invoke_duration(&self, duration_seconds: f64) {
        self.invoke_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every collector
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
