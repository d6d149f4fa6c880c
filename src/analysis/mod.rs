// PMU - Power measurement telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Line frequency and phase analysis
//!
//! Two independent metrics are derived from a decoded [`Series`]:
//!
//! - [`estimate_frequency`]: zero-crossing frequency of the voltage channel
//! - [`estimate_phase`]: mean lag between voltage and current peaks
//!
//! [`analyze`] runs both and reports each outcome separately, so a failure
//! of one never hides the other. Phase estimation needs a cycle length to
//! bound its search; when frequency estimation fails it falls back to the
//! configured nominal frequency.

mod frequency;
mod phase;
mod window;

pub use frequency::{count_crossings, estimate_frequency, FrequencyEstimate};
pub use phase::{estimate_phase, peak_lags, PhaseEstimate, PHASE_SCALE};
pub use window::PeakWindow;

use crate::error::AnalysisError;
use crate::protocol::{Series, NANOS_PER_SECOND};
use std::time::Duration;

/// Analysis configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Window at the start of a series used to compute the baseline (default: 1 s)
    pub baseline_window: Duration,
    /// Frequency assumed by phase estimation when no estimate exists (default: 60 Hz)
    pub nominal_frequency_hz: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            baseline_window: Duration::from_secs(1),
            nominal_frequency_hz: 60.0,
        }
    }
}

impl AnalysisConfig {
    /// Create a configuration with a custom nominal frequency
    pub fn with_nominal_frequency(nominal_frequency_hz: f64) -> Self {
        Self {
            nominal_frequency_hz,
            ..Default::default()
        }
    }

    /// Baseline window length in nanoseconds
    pub fn baseline_window_ns(&self) -> i64 {
        i64::try_from(self.baseline_window.as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Outcome of analysing one series, one result per metric
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Line frequency estimate
    pub frequency: Result<FrequencyEstimate, AnalysisError>,
    /// Phase lag estimate
    pub phase: Result<PhaseEstimate, AnalysisError>,
    /// Frequency the phase search was bounded with
    pub phase_reference_hz: f64,
    /// True when `phase_reference_hz` is the configured nominal frequency
    pub used_nominal: bool,
}

impl Analysis {
    /// Estimated frequency, if available
    pub fn frequency_hz(&self) -> Option<f64> {
        self.frequency.as_ref().ok().map(|f| f.hz)
    }

    /// Estimated phase angle in degrees, if available
    pub fn phase_degrees(&self) -> Option<f64> {
        self.phase.as_ref().ok().map(|p| p.degrees)
    }

    /// True when the phase search used the nominal frequency
    ///
    /// This covers a failed estimate and one that is zero or not finite.
    pub fn used_nominal_frequency(&self) -> bool {
        self.used_nominal
    }
}

/// Run frequency and phase estimation on a series
pub fn analyze(series: &Series, config: &AnalysisConfig) -> Analysis {
    let frequency = estimate_frequency(series, config);

    let (phase_reference_hz, used_nominal) = match &frequency {
        Ok(estimate) if estimate.hz.is_finite() && estimate.hz > 0.0 => (estimate.hz, false),
        _ => (config.nominal_frequency_hz, true),
    };
    let phase = estimate_phase(series, phase_reference_hz);

    Analysis {
        frequency,
        phase,
        phase_reference_hz,
        used_nominal,
    }
}

/// Convert a frequency to a cycle duration in nanoseconds
pub fn cycle_nanos(frequency_hz: f64) -> f64 {
    NANOS_PER_SECOND as f64 / frequency_hz
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Sample;

    #[test]
    fn test_config_default() {
        let config = AnalysisConfig::default();
        assert_eq!(config.baseline_window, Duration::from_secs(1));
        assert_eq!(config.baseline_window_ns(), 1_000_000_000);
        assert_eq!(config.nominal_frequency_hz, 60.0);
    }

    #[test]
    fn test_config_with_nominal_frequency() {
        let config = AnalysisConfig::with_nominal_frequency(50.0);
        assert_eq!(config.nominal_frequency_hz, 50.0);
        assert_eq!(cycle_nanos(50.0), 20_000_000.0);
    }

    #[test]
    fn test_phase_survives_frequency_failure() {
        // 10 ms of data: too short for a baseline, still has one lag
        let series: Series = vec![
            Sample::voltage(0, 0, 0),
            Sample::current(0, 0, 500_000),
            Sample::voltage(9, 0, 1_000_000),
            Sample::current(1, 0, 1_500_000),
            Sample::voltage(1, 0, 2_000_000),
            Sample::current(9, 0, 2_500_000),
            Sample::current(0, 0, 3_500_000),
        ]
        .into();

        let analysis = analyze(&series, &AnalysisConfig::default());
        assert!(matches!(
            analysis.frequency,
            Err(AnalysisError::SpanTooShort { .. })
        ));
        assert!(analysis.used_nominal_frequency());
        assert_eq!(analysis.phase_reference_hz, 60.0);
        let phase = analysis.phase.unwrap();
        assert_eq!(phase.avg_lag_ns, 1_500_000.0);
    }

    #[test]
    fn test_zero_frequency_estimate_falls_back_to_nominal() {
        // flat voltage over 2 s: a valid estimate of 0 Hz
        let series: Series = (0..=200)
            .map(|i| Sample::voltage(5, 0, i * 10_000_000))
            .collect();

        let analysis = analyze(&series, &AnalysisConfig::with_nominal_frequency(50.0));
        assert_eq!(analysis.frequency_hz(), Some(0.0));
        assert!(analysis.used_nominal_frequency());
        assert_eq!(analysis.phase_reference_hz, 50.0);
    }

    #[test]
    fn test_empty_series_reports_both() {
        let analysis = analyze(&Series::new(), &AnalysisConfig::default());
        assert_eq!(analysis.frequency, Err(AnalysisError::EmptySeries));
        assert_eq!(analysis.phase, Err(AnalysisError::NoLagIntervals));
        assert!(analysis.frequency_hz().is_none());
        assert!(analysis.phase_degrees().is_none());
    }
}
