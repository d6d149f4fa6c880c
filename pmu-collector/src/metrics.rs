// PMU Collector - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the collector.
//!
//! This module defines all Prometheus metrics exposed on `/metrics`
//! and provides functions to update them from ingest outcomes.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

lazy_static! {
    // ============================================================
    // Ingest
    // ============================================================

    /// Batches received, labeled by outcome.
    /// Outcomes: processed, empty, rejected
    pub static ref BATCHES_TOTAL: CounterVec = register_counter_vec!(
        "pmu_collector_batches_total",
        "Batches received by outcome",
        &["outcome"]
    ).unwrap();

    /// Samples received, labeled by channel.
    pub static ref SAMPLES_RECEIVED_TOTAL: CounterVec = register_counter_vec!(
        "pmu_collector_samples_received_total",
        "Samples received by channel",
        &["channel"]
    ).unwrap();

    // ============================================================
    // Persistence
    // ============================================================

    /// Rows written by the store.
    pub static ref SAMPLES_PERSISTED_TOTAL: Counter = register_counter!(
        "pmu_collector_samples_persisted_total",
        "Rows written to the measurement store"
    ).unwrap();

    /// Bulk writes that failed or timed out.
    pub static ref PERSISTENCE_FAILURES_TOTAL: Counter = register_counter!(
        "pmu_collector_persistence_failures_total",
        "Bulk writes that failed or timed out"
    ).unwrap();

    // ============================================================
    // Analysis
    // ============================================================

    /// Analysis failures, labeled by metric (frequency, phase) and reason.
    pub static ref ANALYSIS_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "pmu_collector_analysis_failures_total",
        "Analysis failures by metric",
        &["metric", "reason"]
    ).unwrap();

    /// Last estimated line frequency.
    pub static ref LINE_FREQUENCY_HZ: Gauge = register_gauge!(
        "pmu_line_frequency_hz",
        "Last estimated line frequency in Hz"
    ).unwrap();

    /// Last estimated phase angle.
    pub static ref PHASE_ANGLE_DEGREES: Gauge = register_gauge!(
        "pmu_phase_angle_degrees",
        "Last estimated voltage/current phase angle in degrees"
    ).unwrap();

    /// Last mean voltage-to-current peak lag.
    pub static ref PEAK_LAG_SECONDS: Gauge = register_gauge!(
        "pmu_peak_lag_seconds",
        "Last mean voltage-to-current peak lag in seconds"
    ).unwrap();
}

/// Batch outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Processed,
    Empty,
    Rejected,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::Processed => "processed",
            BatchOutcome::Empty => "empty",
            BatchOutcome::Rejected => "rejected",
        }
    }
}

/// Count one received batch.
pub fn record_batch(outcome: BatchOutcome) {
    BATCHES_TOTAL.with_label_values(&[outcome.as_str()]).inc();
}

/// Count received samples of one channel.
pub fn record_samples_received(channel: &str, count: usize) {
    SAMPLES_RECEIVED_TOTAL
        .with_label_values(&[channel])
        .inc_by(count as f64);
}

/// Count a bulk write.
pub fn record_persisted(rows: usize) {
    SAMPLES_PERSISTED_TOTAL.inc_by(rows as f64);
}

/// Count a failed bulk write.
pub fn record_persistence_failure() {
    PERSISTENCE_FAILURES_TOTAL.inc();
}

/// Count an analysis failure.
pub fn record_analysis_failure(metric: &str, reason: &str) {
    ANALYSIS_FAILURES_TOTAL
        .with_label_values(&[metric, reason])
        .inc();
}

/// Update the frequency gauge.
pub fn update_frequency(hz: f64) {
    LINE_FREQUENCY_HZ.set(hz);
}

/// Update the phase gauges.
pub fn update_phase(degrees: f64, avg_lag_ns: f64) {
    PHASE_ANGLE_DEGREES.set(degrees);
    PEAK_LAG_SECONDS.set(avg_lag_ns / 1e9);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
