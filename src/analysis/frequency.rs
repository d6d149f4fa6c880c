// PMU - Power measurement telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Zero-crossing line frequency estimation
//!
//! Only VOLTAGE samples take part. The reference level (baseline) is the mean
//! raw code of the voltage samples captured during the first baseline window
//! of the series; crossings are then counted over the whole voltage
//! sub-sequence and two crossings make one cycle.

use crate::analysis::AnalysisConfig;
use crate::error::AnalysisError;
use crate::protocol::{SampleKind, Series, NANOS_PER_SECOND};

/// Result of a frequency estimation
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyEstimate {
    /// Estimated line frequency in Hz
    pub hz: f64,
    /// Number of baseline crossings in the voltage sub-sequence
    pub zero_crossings: u64,
    /// Mean raw voltage code over the baseline window
    pub baseline: f64,
    /// Voltage samples that formed the baseline
    pub baseline_samples: usize,
    /// Time between the first and last sample of the series, any channel
    pub span_ns: i64,
}

impl FrequencyEstimate {
    /// Duration of one line cycle in nanoseconds
    pub fn cycle_ns(&self) -> f64 {
        NANOS_PER_SECOND as f64 / self.hz
    }
}

/// Estimate the line frequency of a series
///
/// # Errors
///
/// - [`AnalysisError::EmptySeries`] when there are no samples
/// - [`AnalysisError::NoVoltageSamples`] when no sample is tagged VOLTAGE
/// - [`AnalysisError::SpanOverflow`] when the first and last timestamps are
///   more than `i64::MAX` nanoseconds apart
/// - [`AnalysisError::SpanTooShort`] when the series covers less than the
///   baseline window
/// - [`AnalysisError::EmptyBaselineWindow`] when no voltage sample lands in
///   the baseline window
pub fn estimate_frequency(
    series: &Series,
    config: &AnalysisConfig,
) -> Result<FrequencyEstimate, AnalysisError> {
    let start = series.first().ok_or(AnalysisError::EmptySeries)?.captured_at;

    if series.count(SampleKind::Voltage) == 0 {
        return Err(AnalysisError::NoVoltageSamples);
    }

    let window_ns = config.baseline_window_ns();
    let span_ns = series
        .checked_span_nanos()
        .ok_or_else(|| AnalysisError::SpanOverflow {
            first: start,
            last: series.last().map_or(start, |s| s.captured_at),
        })?;
    if span_ns < window_ns {
        return Err(AnalysisError::SpanTooShort {
            span_ns,
            required_ns: window_ns,
        });
    }

    let window_end = start.saturating_add(window_ns);
    let (sum, count) = series
        .channel(SampleKind::Voltage)
        .filter(|s| s.captured_at >= start && s.captured_at < window_end)
        .fold((0i128, 0usize), |(sum, count), s| {
            (sum + s.raw_code as i128, count + 1)
        });
    if count == 0 {
        return Err(AnalysisError::EmptyBaselineWindow);
    }
    // Fractional mean; integer division would bias the baseline toward zero
    let baseline = sum as f64 / count as f64;

    let zero_crossings = count_crossings(
        series.channel(SampleKind::Voltage).map(|s| s.raw_code as f64),
        baseline,
    );

    let span_secs = span_ns as f64 / NANOS_PER_SECOND as f64;
    let hz = (zero_crossings as f64 / 2.0) / span_secs;

    Ok(FrequencyEstimate {
        hz,
        zero_crossings,
        baseline,
        baseline_samples: count,
        span_ns,
    })
}

/// Count transitions across `baseline` between consecutive values
///
/// A crossing is strictly-above followed by at-or-below, or strictly-below
/// followed by at-or-above.
pub fn count_crossings<I>(values: I, baseline: f64) -> u64
where
    I: IntoIterator<Item = f64>,
{
    let mut values = values.into_iter();
    let Some(mut last) = values.next() else {
        return 0;
    };

    let mut crossings = 0;
    for value in values {
        if (last > baseline && value <= baseline) || (last < baseline && value >= baseline) {
            crossings += 1;
        }
        last = value;
    }
    crossings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Sample;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_count_crossings_rules() {
        // above -> at baseline counts, at baseline -> above does not
        assert_eq!(count_crossings([1.0, 0.0, 1.0], 0.0), 1);
        assert_eq!(count_crossings([-1.0, 0.0, -1.0], 0.0), 1);
        assert_eq!(count_crossings([1.0, -1.0, 1.0, -1.0], 0.0), 3);
        assert_eq!(count_crossings([0.0, 0.0, 0.0], 0.0), 0);
        assert_eq!(count_crossings(std::iter::empty(), 0.0), 0);
    }

    #[test]
    fn test_empty_series() {
        let result = estimate_frequency(&Series::new(), &config());
        assert_eq!(result, Err(AnalysisError::EmptySeries));
    }

    #[test]
    fn test_no_voltage_samples() {
        let series: Series = (0..10)
            .map(|i| Sample::current(i, 0, i * NANOS_PER_SECOND))
            .collect();
        let result = estimate_frequency(&series, &config());
        assert_eq!(result, Err(AnalysisError::NoVoltageSamples));
    }

    #[test]
    fn test_span_too_short() {
        let series: Series = (0..100)
            .map(|i| Sample::voltage(i % 2, 0, i * 1_000_000))
            .collect();
        let result = estimate_frequency(&series, &config());
        assert!(matches!(result, Err(AnalysisError::SpanTooShort { .. })));
    }

    #[test]
    fn test_span_overflow_is_reported() {
        let mut series = Series::new();
        series.push(Sample::voltage(1, 0, i64::MIN + 5));
        series.push(Sample::voltage(-1, 0, i64::MAX - 5));
        let result = estimate_frequency(&series, &config());
        assert_eq!(
            result,
            Err(AnalysisError::SpanOverflow {
                first: i64::MIN + 5,
                last: i64::MAX - 5,
            })
        );
    }

    #[test]
    fn test_empty_baseline_window() {
        // voltage only shows up after the first second
        let mut series: Series = (0..10)
            .map(|i| Sample::current(0, 0, i * 100_000_000))
            .collect();
        series.push(Sample::voltage(1, 0, 1_500_000_000));
        series.push(Sample::voltage(-1, 0, 1_600_000_000));
        let result = estimate_frequency(&series, &config());
        assert_eq!(result, Err(AnalysisError::EmptyBaselineWindow));
    }

    #[test]
    fn test_square_wave() {
        // 10 Hz square wave sampled at 100 Hz for 2 s
        let series: Series = (0..=200)
            .map(|i| {
                let raw = if (i / 5) % 2 == 0 { 100 } else { -100 };
                Sample::voltage(raw, 0, i * 10_000_000)
            })
            .collect();
        let estimate = estimate_frequency(&series, &config()).unwrap();
        assert_eq!(estimate.baseline, 0.0);
        assert_eq!(estimate.baseline_samples, 100);
        assert_eq!(estimate.zero_crossings, 40);
        assert!((estimate.hz - 10.0).abs() < 1e-9);
        assert!((estimate.cycle_ns() - 100_000_000.0).abs() < 1e-3);
    }
}
