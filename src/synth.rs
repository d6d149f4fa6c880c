// PMU - Power measurement telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Synthetic line waveforms
//!
//! Generates voltage/current series with known frequency and lag, for the
//! simulated acquisition source, tests and benchmarks.
//!
//! ```rust
//! use pmu::synth::{InterleavedSynth, Waveform};
//! use std::time::Duration;
//!
//! let synth = InterleavedSynth::new(Waveform::sine(60.0, 1000.0), 1200.0)
//!     .with_current(Waveform::sine(60.0, 200.0))
//!     .with_current_lag(Duration::from_millis(2));
//! let series = synth.generate(Duration::from_secs(2));
//! assert_eq!(series.len(), 2 * 2400);
//! ```

use std::f64::consts::PI;
use std::time::Duration;

use crate::adc::AdcScale;
use crate::protocol::{Sample, SampleKind, Series, NANOS_PER_SECOND};

/// Sinusoidal waveform in raw ADC codes
///
/// `value(t) = offset + amplitude * sin(2*PI*frequency_hz*t + phase_rad)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waveform {
    /// Frequency in Hz
    pub frequency_hz: f64,
    /// Peak amplitude in codes
    pub amplitude: f64,
    /// Phase at t = 0, in radians
    pub phase_rad: f64,
    /// DC offset in codes
    pub offset: f64,
}

impl Waveform {
    /// Pure sine with zero phase and offset
    pub fn sine(frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            frequency_hz,
            amplitude,
            phase_rad: 0.0,
            offset: 0.0,
        }
    }

    /// Flat line at `offset`
    pub fn flat(offset: f64) -> Self {
        Self {
            frequency_hz: 0.0,
            amplitude: 0.0,
            phase_rad: 0.0,
            offset,
        }
    }

    /// Set the phase at t = 0
    pub fn with_phase(mut self, phase_rad: f64) -> Self {
        self.phase_rad = phase_rad;
        self
    }

    /// Set the DC offset
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Value at `t_secs` seconds
    pub fn value_at(&self, t_secs: f64) -> f64 {
        let angle = 2.0 * PI * self.frequency_hz * t_secs + self.phase_rad;
        self.offset + self.amplitude * angle.sin()
    }

    /// Value at `t_secs`, rounded to an ADC code
    pub fn code_at(&self, t_secs: f64) -> i64 {
        self.value_at(t_secs).round() as i64
    }
}

/// Builds series of alternating VOLTAGE/CURRENT samples
///
/// Each tick of the per-channel sample rate yields one voltage sample at the
/// tick and one current sample half a sample period later.
#[derive(Debug, Clone, PartialEq)]
pub struct InterleavedSynth {
    /// Voltage channel waveform
    pub voltage: Waveform,
    /// Current channel waveform
    pub current: Waveform,
    /// Samples per second on each channel
    pub sample_rate_hz: f64,
    /// Time by which the current waveform trails the voltage waveform
    pub current_lag: Duration,
    /// Timestamp of the first sample, epoch nanoseconds
    pub start_nanos: i64,
    /// Scale used to fill in nanovolts
    pub adc: AdcScale,
}

impl InterleavedSynth {
    /// Create a synth with a flat current channel
    pub fn new(voltage: Waveform, sample_rate_hz: f64) -> Self {
        Self {
            voltage,
            current: Waveform::flat(0.0),
            sample_rate_hz,
            current_lag: Duration::ZERO,
            start_nanos: 0,
            adc: AdcScale::default(),
        }
    }

    /// Set the current waveform
    pub fn with_current(mut self, current: Waveform) -> Self {
        self.current = current;
        self
    }

    /// Delay the current waveform by `lag`
    pub fn with_current_lag(mut self, lag: Duration) -> Self {
        self.current_lag = lag;
        self
    }

    /// Set the first timestamp
    pub fn with_start(mut self, start_nanos: i64) -> Self {
        self.start_nanos = start_nanos;
        self
    }

    /// Sample period in nanoseconds
    pub fn period_ns(&self) -> f64 {
        NANOS_PER_SECOND as f64 / self.sample_rate_hz
    }

    /// Raw code of `kind` at `t_secs` seconds after start
    pub fn code_at(&self, kind: SampleKind, t_secs: f64) -> i64 {
        match kind {
            SampleKind::Voltage => self.voltage.code_at(t_secs),
            SampleKind::Current => self
                .current
                .code_at(t_secs - self.current_lag.as_secs_f64()),
        }
    }

    /// Build the sample of `kind` at `t_secs` seconds after start
    pub fn sample_at(&self, kind: SampleKind, t_secs: f64) -> Sample {
        let raw = self.code_at(kind, t_secs);
        let captured_at = self.start_nanos + (t_secs * NANOS_PER_SECOND as f64).round() as i64;
        Sample::new(kind, raw, self.adc.to_nanovolts(raw), captured_at)
    }

    /// Generate `duration` worth of interleaved samples
    pub fn generate(&self, duration: Duration) -> Series {
        let ticks = (duration.as_secs_f64() * self.sample_rate_hz).round() as usize;
        let period = 1.0 / self.sample_rate_hz;

        let mut series = Series::with_capacity(ticks * 2);
        for tick in 0..ticks {
            let t = tick as f64 * period;
            series.push(self.sample_at(SampleKind::Voltage, t));
            series.push(self.sample_at(SampleKind::Current, t + period / 2.0));
        }
        series
    }
}
