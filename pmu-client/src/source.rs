// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Raw sample sources
//!
//! A [`SampleSource`] hands out raw ADC codes for one channel, blocking until
//! the next reading is available. Sources run on blocking threads, never on
//! the async runtime.

use pmu::synth::Waveform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::time::{Duration, Instant};

/// Blocking supplier of raw readings for one channel
pub trait SampleSource: Send {
    /// Wait for the next raw code
    ///
    /// Returns `Ok(None)` once the source has terminated; an error means the
    /// underlying device is unavailable.
    fn read(&mut self) -> io::Result<Option<i64>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read(&mut self) -> io::Result<Option<i64>> {
        (**self).read()
    }
}

/// Rate-paced source sampling a synthetic waveform
///
/// Stands in for the physical converter: one code per tick at
/// `rate_hz`, taken from `waveform` at the elapsed time, plus optional
/// uniform noise.
#[derive(Debug)]
pub struct SimulatedSource {
    waveform: Waveform,
    interval: Duration,
    noise: i64,
    limit: Option<u64>,
    produced: u64,
    started: Option<Instant>,
    next_due: Option<Instant>,
    rng: StdRng,
}

impl SimulatedSource {
    /// Default acquisition rate in Hz
    pub const DEFAULT_RATE_HZ: f64 = 1_200.0;

    /// Create a source sampling `waveform` at the default rate
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            interval: Duration::from_secs_f64(1.0 / Self::DEFAULT_RATE_HZ),
            noise: 0,
            limit: None,
            produced: 0,
            started: None,
            next_due: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// 60 Hz line at the given amplitude
    pub fn line(amplitude: f64) -> Self {
        Self::new(Waveform::sine(60.0, amplitude))
    }

    /// Set the acquisition rate; non-positive rates disable pacing
    pub fn with_rate(mut self, rate_hz: f64) -> Self {
        self.interval = if rate_hz > 0.0 && rate_hz.is_finite() {
            Duration::from_secs_f64(1.0 / rate_hz)
        } else {
            Duration::ZERO
        };
        self
    }

    /// Add uniform noise in `-noise..=noise` codes
    pub fn with_noise(mut self, noise: i64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// Terminate after `samples` readings
    pub fn with_limit(mut self, samples: u64) -> Self {
        self.limit = Some(samples);
        self
    }

    /// Seed the noise generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Readings handed out so far
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn wait_for_tick(&mut self) -> Instant {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due + self.interval);
        due
    }
}

impl SampleSource for SimulatedSource {
    fn read(&mut self) -> io::Result<Option<i64>> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        let tick = self.wait_for_tick();
        let started = *self.started.get_or_insert(tick);
        let t = tick.duration_since(started).as_secs_f64();

        let mut code = self.waveform.code_at(t);
        if self.noise > 0 {
            code += self.rng.gen_range(-self.noise..=self.noise);
        }
        self.produced += 1;
        Ok(Some(code))
    }
}

/// Source replaying a finite sequence of codes
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    codes: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = i64> + Send,
{
    /// Wrap anything that yields codes
    pub fn new(codes: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            codes: codes.into_iter(),
        }
    }
}

impl<I> SampleSource for IterSource<I>
where
    I: Iterator<Item = i64> + Send,
{
    fn read(&mut self) -> io::Result<Option<i64>> {
        Ok(self.codes.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_source_terminates() {
        let mut source = IterSource::new(vec![3, -4]);
        assert_eq!(source.read().unwrap(), Some(3));
        assert_eq!(source.read().unwrap(), Some(-4));
        assert_eq!(source.read().unwrap(), None);
    }

    #[test]
    fn test_simulated_limit() {
        let mut source = SimulatedSource::line(100.0).with_rate(0.0).with_limit(3);
        for _ in 0..3 {
            assert!(source.read().unwrap().is_some());
        }
        assert_eq!(source.read().unwrap(), None);
        assert_eq!(source.produced(), 3);
    }

    #[test]
    fn test_simulated_pacing() {
        let mut source = SimulatedSource::line(100.0).with_rate(1_000.0).with_limit(20);
        let start = Instant::now();
        while source.read().unwrap().is_some() {}
        // 20 ticks at 1 kHz, the first one immediate
        assert!(start.elapsed() >= Duration::from_millis(19));
    }

    #[test]
    fn test_simulated_noise_bounded() {
        let mut source = SimulatedSource::new(Waveform::flat(500.0))
            .with_rate(0.0)
            .with_noise(10)
            .with_seed(42)
            .with_limit(200);
        while let Some(code) = source.read().unwrap() {
            assert!((490..=510).contains(&code));
        }
    }

    #[test]
    fn test_boxed_source() {
        let mut source: Box<dyn SampleSource> = Box::new(IterSource::new([1]));
        assert_eq!(source.read().unwrap(), Some(1));
        assert_eq!(source.read().unwrap(), None);
    }
}
