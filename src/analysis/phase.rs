// PMU - Power measurement telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Voltage/current peak lag estimation
//!
//! Peaks are found per channel with a three-point window over that channel's
//! own samples. For each voltage peak the later current samples are searched
//! for the next current peak no later than one line cycle after it; the lags
//! found are averaged and turned into an angle.
//!
//! The angle uses `radians = (avg_lag / cycle) * 2`. This is not the textbook
//! `2π * lag / period`; it is kept as-is until the intended scale is confirmed.

use std::f64::consts::PI;

use crate::analysis::cycle_nanos;
use crate::analysis::window::PeakWindow;
use crate::error::AnalysisError;
use crate::protocol::{Sample, Series};

/// Scale applied to `avg_lag / cycle` to get radians
pub const PHASE_SCALE: f64 = 2.0;

/// Result of a phase estimation
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseEstimate {
    /// Mean voltage-to-current peak lag in nanoseconds
    pub avg_lag_ns: f64,
    /// Number of lag intervals averaged
    pub lag_count: usize,
    /// Cycle duration used to bound the search, in nanoseconds
    pub cycle_ns: f64,
    /// Phase angle in radians
    pub radians: f64,
    /// Phase angle in degrees
    pub degrees: f64,
}

/// Estimate the voltage/current phase lag of a series at `frequency_hz`
///
/// # Errors
///
/// - [`AnalysisError::InvalidFrequency`] for a zero, negative or non-finite
///   frequency
/// - [`AnalysisError::NoLagIntervals`] when no voltage peak is followed by a
///   current peak within one cycle ("no estimate available")
pub fn estimate_phase(series: &Series, frequency_hz: f64) -> Result<PhaseEstimate, AnalysisError> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(AnalysisError::InvalidFrequency(frequency_hz));
    }
    let cycle_ns = cycle_nanos(frequency_hz);

    let lags = peak_lags(series.samples(), cycle_ns);
    if lags.is_empty() {
        return Err(AnalysisError::NoLagIntervals);
    }

    let avg_lag_ns = lags.iter().map(|&l| l as f64).sum::<f64>() / lags.len() as f64;
    let radians = (avg_lag_ns / cycle_ns) * PHASE_SCALE;

    Ok(PhaseEstimate {
        avg_lag_ns,
        lag_count: lags.len(),
        cycle_ns,
        radians,
        degrees: radians * (180.0 / PI),
    })
}

/// One current-channel sample, with the peak it confirms (if any)
#[derive(Debug, Clone, Copy)]
struct CurrentStep {
    /// Position in the interleaved series
    index: usize,
    captured_at: i64,
    peak_at: Option<i64>,
}

/// Collect every voltage-peak to current-peak lag (ns) found within one cycle
///
/// The current channel is walked once up front; each voltage peak then scans
/// forward from its own position until a usable current peak or a current
/// sample past the one-cycle deadline.
pub fn peak_lags(samples: &[Sample], cycle_ns: f64) -> Vec<i64> {
    let steps = current_steps(samples);
    let cycle = cycle_ns.round() as i64;

    let mut voltage = PeakWindow::new();
    let mut lags = Vec::new();

    for (i, sample) in samples.iter().enumerate() {
        if !sample.is_voltage() {
            continue;
        }
        let Some(peak) = voltage.advance(*sample) else {
            continue;
        };
        let from = steps.partition_point(|step| step.index <= i);
        if let Some(lag) = next_current_peak(&steps[from..], peak.captured_at, cycle) {
            lags.push(lag);
        }
    }

    lags
}

fn current_steps(samples: &[Sample]) -> Vec<CurrentStep> {
    let mut window = PeakWindow::new();
    samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_current())
        .map(|(index, s)| CurrentStep {
            index,
            captured_at: s.captured_at,
            peak_at: window.advance(*s).map(|p| p.captured_at),
        })
        .collect()
}

/// First current peak at or after `tv` and no more than `cycle` later
fn next_current_peak(steps: &[CurrentStep], tv: i64, cycle: i64) -> Option<i64> {
    let deadline = tv.saturating_add(cycle);

    for step in steps {
        if let Some(tc) = step.peak_at {
            if tc > deadline {
                return None;
            }
            if tc >= tv {
                return Some(tc - tv);
            }
        }
        if step.captured_at > deadline {
            return None;
        }
    }
    None
}
