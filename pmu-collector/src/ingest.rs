// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch ingest
//!
//! One request body is one batch. A body that does not decode is rejected
//! and nothing else happens. An empty batch is logged and accepted. Any
//! other batch is analysed and persisted concurrently, and neither outcome
//! affects the other or the response.

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::metrics::{self, BatchOutcome};
use crate::store::MeasurementStore;
use chrono::{DateTime, Utc};
use pmu::{analyze, Analysis, AnalysisConfig, MeasurementRecord, SampleKind};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// State shared by all request handlers
pub struct AppState {
    /// Row sink
    pub store: Arc<dyn MeasurementStore>,
    /// Frequency and phase settings
    pub analysis: AnalysisConfig,
    /// Upper bound on one bulk write
    pub persist_timeout: Duration,
    /// Server start time
    pub started: Instant,
    last: RwLock<Option<IngestSummary>>,
}

impl AppState {
    /// Create the state for `store`
    pub fn new(store: Arc<dyn MeasurementStore>, config: &CollectorConfig) -> Self {
        Self {
            store,
            analysis: config.analysis.clone(),
            persist_timeout: config.persist_timeout,
            started: Instant::now(),
            last: RwLock::new(None),
        }
    }

    /// Summary of the last non-empty batch
    pub fn last_ingest(&self) -> Option<IngestSummary> {
        self.last.read().ok().and_then(|last| last.clone())
    }

    fn set_last(&self, summary: IngestSummary) {
        if let Ok(mut last) = self.last.write() {
            *last = Some(summary);
        }
    }
}

/// What happened to one non-empty batch
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    /// When the batch was received
    pub received_at: DateTime<Utc>,
    /// Samples in the batch
    pub samples: usize,
    /// Voltage samples in the batch
    pub voltage_samples: usize,
    /// Current samples in the batch
    pub current_samples: usize,
    /// First to last capture time
    pub span_ns: i64,
    /// Estimated line frequency
    pub frequency_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_error: Option<String>,
    /// Estimated phase angle
    pub phase_degrees: Option<f64>,
    /// Mean voltage-to-current peak lag
    pub avg_lag_ns: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_error: Option<String>,
    /// Frequency the phase search was bounded with
    pub phase_reference_hz: Option<f64>,
    /// Rows written by the store
    pub persisted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

/// Result of [`process_batch`]
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Batch had no samples
    Empty,
    /// Batch was analysed and handed to the store
    Processed(IngestSummary),
}

/// Decode, analyse and persist one request body
///
/// # Errors
///
/// Only a body that fails to decode is an error. Analysis and persistence
/// failures are logged, counted and reported in the summary.
pub async fn process_batch(state: &AppState, body: &[u8]) -> Result<IngestOutcome> {
    let series = match pmu::wire::decode(body) {
        Ok(series) => series,
        Err(e) => {
            warn!(bytes = body.len(), "Rejected batch: {}", e);
            metrics::record_batch(BatchOutcome::Rejected);
            return Err(e.into());
        }
    };

    if series.is_empty() {
        info!("Received empty batch");
        metrics::record_batch(BatchOutcome::Empty);
        return Ok(IngestOutcome::Empty);
    }

    let received_at = Utc::now();
    let voltage_samples = series.count(SampleKind::Voltage);
    let current_samples = series.count(SampleKind::Current);
    metrics::record_samples_received(SampleKind::Voltage.as_str(), voltage_samples);
    metrics::record_samples_received(SampleKind::Current.as_str(), current_samples);

    let samples = series.len();
    let span_ns = series.span_nanos();
    let records = series.to_records();

    let config = state.analysis.clone();
    let analysis = tokio::task::spawn_blocking(move || analyze(&series, &config));
    let persisted = persist(Arc::clone(&state.store), records, state.persist_timeout);

    let (analysis, persisted) = tokio::join!(analysis, persisted);
    let analysis = match analysis {
        Ok(analysis) => Some(analysis),
        Err(e) => {
            error!("Analysis task failed: {}", e);
            None
        }
    };

    let mut summary = IngestSummary {
        received_at,
        samples,
        voltage_samples,
        current_samples,
        span_ns,
        frequency_hz: None,
        frequency_error: None,
        phase_degrees: None,
        avg_lag_ns: None,
        phase_error: None,
        phase_reference_hz: None,
        persisted: None,
        persistence_error: None,
    };
    if let Some(analysis) = &analysis {
        report_analysis(analysis, &mut summary);
    }
    match persisted {
        Ok(rows) => {
            metrics::record_persisted(rows);
            summary.persisted = Some(rows);
        }
        Err(e) => {
            metrics::record_persistence_failure();
            summary.persistence_error = Some(e.to_string());
        }
    }

    metrics::record_batch(BatchOutcome::Processed);
    info!(
        samples,
        frequency_hz = ?summary.frequency_hz,
        phase_degrees = ?summary.phase_degrees,
        persisted = ?summary.persisted,
        "Processed batch"
    );

    state.set_last(summary.clone());
    Ok(IngestOutcome::Processed(summary))
}

fn report_analysis(analysis: &Analysis, summary: &mut IngestSummary) {
    summary.phase_reference_hz = Some(analysis.phase_reference_hz);

    match &analysis.frequency {
        Ok(estimate) => {
            metrics::update_frequency(estimate.hz);
            summary.frequency_hz = Some(estimate.hz);
            debug!(
                hz = estimate.hz,
                crossings = estimate.zero_crossings,
                baseline = estimate.baseline,
                "Frequency estimated"
            );
        }
        Err(e) => {
            metrics::record_analysis_failure("frequency", e.reason());
            summary.frequency_error = Some(e.to_string());
            info!("No frequency estimate: {}", e);
        }
    }

    match &analysis.phase {
        Ok(estimate) => {
            metrics::update_phase(estimate.degrees, estimate.avg_lag_ns);
            summary.phase_degrees = Some(estimate.degrees);
            summary.avg_lag_ns = Some(estimate.avg_lag_ns);
            debug!(
                degrees = estimate.degrees,
                avg_lag_ns = estimate.avg_lag_ns,
                intervals = estimate.lag_count,
                nominal = analysis.used_nominal_frequency(),
                "Phase estimated"
            );
        }
        Err(e) => {
            metrics::record_analysis_failure("phase", e.reason());
            summary.phase_error = Some(e.to_string());
            info!("No phase estimate: {}", e);
        }
    }
}

/// Run one bulk write on the blocking pool, bounded by `timeout`
///
/// A failed write is logged together with the rows it attempted.
async fn persist(
    store: Arc<dyn MeasurementStore>,
    records: Vec<MeasurementRecord>,
    timeout: Duration,
) -> Result<usize> {
    let name = store.name();
    let count = records.len();
    let first = records.first().map(|r| r.epoch_nano);
    let last = records.last().map(|r| r.epoch_nano);

    let task = tokio::task::spawn_blocking(move || {
        let result = store.append(&records);
        (result, records)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok((Ok(rows), _))) => Ok(rows),
        Ok(Ok((Err(e), records))) => {
            error!(
                store = name,
                rows = count,
                first_epoch_nano = ?first,
                last_epoch_nano = ?last,
                "Persistence failed: {}",
                e
            );
            debug!(store = name, ?records, "Rows not persisted");
            Err(e)
        }
        Ok(Err(e)) => {
            error!(store = name, rows = count, "Persistence task failed: {}", e);
            Err(CollectorError::Persistence(e.to_string()))
        }
        Err(_) => {
            error!(
                store = name,
                rows = count,
                first_epoch_nano = ?first,
                last_epoch_nano = ?last,
                "Persistence timed out after {:?}",
                timeout
            );
            Err(CollectorError::Timeout(timeout))
        }
    }
}
