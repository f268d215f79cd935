//! Counters and histograms emitted by the generation pipeline.
//!
//! The pipeline only talks to [`MetricsSink`]; wiring a real metrics backend is
//! a matter of implementing the trait. [`TracingMetrics`] forwards every sample
//! as a `tracing` event and [`InMemoryMetrics`] keeps them for inspection.

use dashmap::DashMap;

pub mod names {
    pub const ATTEMPTS: &str = "generation.attempts";
    pub const ATTEMPT_FAILURES: &str = "generation.attempt_failures";
    pub const ATTEMPT_LATENCY_MS: &str = "generation.attempt_latency_ms";
    pub const LATENCY_MS: &str = "generation.latency_ms";
    pub const RETRIES_EXHAUSTED: &str = "generation.retries_exhausted";
    pub const CACHE_HITS: &str = "generation.cache_hits";
    pub const CACHE_MISSES: &str = "generation.cache_misses";
    pub const QUALITY_SCORE: &str = "generation.quality_score";
    pub const REGENERATIONS: &str = "generation.regenerations";
    pub const OUTCOME: &str = "generation.outcome";
}

pub type Labels<'a> = &'a [(&'static str, &'a str)];

pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str, value: u64, labels: Labels<'_>);

    fn observe(&self, name: &'static str, value: f64, labels: Labels<'_>);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str, _value: u64, _labels: Labels<'_>) {}

    fn observe(&self, _name: &'static str, _value: f64, _labels: Labels<'_>) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment(&self, name: &'static str, value: u64, labels: Labels<'_>) {
        tracing::debug!(
            target: "questgen::metrics",
            metric = name,
            value,
            labels = %render_labels(labels),
            "counter"
        );
    }

    fn observe(&self, name: &'static str, value: f64, labels: Labels<'_>) {
        tracing::debug!(
            target: "questgen::metrics",
            metric = name,
            value,
            labels = %render_labels(labels),
            "histogram"
        );
    }
}

/// Keeps counters and raw histogram samples keyed by `name{label=value,..}`.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<String, u64>,
    histograms: DashMap<String, Vec<f64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter value for an exact key, e.g. `generation.outcome{verdict=accepted}`.
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).map(|value| *value).unwrap_or(0)
    }

    /// Sum of a counter across all label combinations.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| matches_name(entry.key(), name))
            .map(|entry| *entry.value())
            .sum()
    }

    pub fn observations(&self, name: &str) -> Vec<f64> {
        self.histograms
            .iter()
            .filter(|entry| matches_name(entry.key(), name))
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &'static str, value: u64, labels: Labels<'_>) {
        *self.counters.entry(metric_key(name, labels)).or_insert(0) += value;
    }

    fn observe(&self, name: &'static str, value: f64, labels: Labels<'_>) {
        self.histograms
            .entry(metric_key(name, labels))
            .or_default()
            .push(value);
    }
}

fn matches_name(key: &str, name: &str) -> bool {
    key == name || key.strip_prefix(name).is_some_and(|rest| rest.starts_with('{'))
}

fn render_labels(labels: Labels<'_>) -> String {
    let mut sorted: Vec<_> = labels.iter().collect();
    sorted.sort_by_key(|(key, _)| *key);
    sorted
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn metric_key(name: &str, labels: Labels<'_>) -> String {
    if labels.is_empty() {
        name.to_string()
    } else {
        format!("{name}{{{}}}", render_labels(labels))
    }
}
