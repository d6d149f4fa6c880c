//! Protocol definitions for PMU
//!
//! This module defines the core types exchanged between client and collector:
//! - Channel kinds
//! - Samples and the series (batch) that carries them
//! - The flat record form handed to storage

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content type marking a request body as an encoded [`Series`]
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// Nanoseconds per second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Physical analog input a sample was read from
///
/// `Default` (from the wire derive) is [`SampleKind::Voltage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum SampleKind {
    /// Line voltage channel
    Voltage = 0,
    /// Load current channel
    Current = 1,
}

impl SampleKind {
    /// Lowercase label used by storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Voltage => "voltage",
            SampleKind::Current => "current",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Voltage => write!(f, "VOLTAGE"),
            SampleKind::Current => write!(f, "CURRENT"),
        }
    }
}

/// One analog reading
///
/// Samples are plain values; once created they are never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sample {
    /// Channel the reading came from
    pub channel: SampleKind,
    /// Raw ADC code
    pub raw_code: i64,
    /// Converted value in nanovolts
    pub nanovolts: i64,
    /// Capture time in epoch nanoseconds (monotonic within one client run)
    pub captured_at: i64,
}

impl Sample {
    /// Create a new sample
    pub fn new(channel: SampleKind, raw_code: i64, nanovolts: i64, captured_at: i64) -> Self {
        Self {
            channel,
            raw_code,
            nanovolts,
            captured_at,
        }
    }

    /// Shorthand for a voltage sample
    pub fn voltage(raw_code: i64, nanovolts: i64, captured_at: i64) -> Self {
        Self::new(SampleKind::Voltage, raw_code, nanovolts, captured_at)
    }

    /// Shorthand for a current sample
    pub fn current(raw_code: i64, nanovolts: i64, captured_at: i64) -> Self {
        Self::new(SampleKind::Current, raw_code, nanovolts, captured_at)
    }

    /// Check if this sample was read from the voltage channel
    pub fn is_voltage(&self) -> bool {
        self.channel == SampleKind::Voltage
    }

    /// Check if this sample was read from the current channel
    pub fn is_current(&self) -> bool {
        self.channel == SampleKind::Current
    }
}

/// An ordered batch of samples, sent as one transmission unit
///
/// Samples of one channel appear in non-decreasing `captured_at` order.
/// Samples of different channels interleave in funnel arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Create a new empty series
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty series with room for `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Append a sample
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples in arrival order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterate over the samples in arrival order
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Iterate over the samples of one channel
    pub fn channel(&self, kind: SampleKind) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter().filter(move |s| s.channel == kind)
    }

    /// Number of samples read from one channel
    pub fn count(&self, kind: SampleKind) -> usize {
        self.channel(kind).count()
    }

    /// First sample in arrival order
    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    /// Last sample in arrival order
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Time between the first and the last sample, any channel, in nanoseconds
    ///
    /// Saturates at the `i64` bounds; see [`Series::checked_span_nanos`].
    pub fn span_nanos(&self) -> i64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.captured_at.saturating_sub(first.captured_at),
            _ => 0,
        }
    }

    /// Like [`Series::span_nanos`], but None when the span does not fit an `i64`
    pub fn checked_span_nanos(&self) -> Option<i64> {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.captured_at.checked_sub(first.captured_at),
            _ => Some(0),
        }
    }

    /// Flatten into storage records, keeping arrival order
    pub fn to_records(&self) -> Vec<MeasurementRecord> {
        self.samples.iter().map(MeasurementRecord::from).collect()
    }

    /// Consume the series and return its samples
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

impl From<Vec<Sample>> for Series {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl FromIterator<Sample> for Series {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Persisted form of a sample: one row per sample, no batch identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Lowercase channel label (`voltage` / `current`)
    pub sample_kind: String,
    /// Converted value in nanovolts
    pub nano_volts: i64,
    /// Raw ADC code
    pub raw_sample: i64,
    /// Capture time in epoch nanoseconds
    pub epoch_nano: i64,
}

impl From<&Sample> for MeasurementRecord {
    fn from(sample: &Sample) -> Self {
        Self {
            sample_kind: sample.channel.as_str().to_string(),
            nano_volts: sample.nanovolts,
            raw_sample: sample.raw_code,
            epoch_nano: sample.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_series() -> Series {
        vec![
            Sample::voltage(10, 100, 1_000),
            Sample::current(5, 50, 1_100),
            Sample::voltage(12, 120, 2_000),
            Sample::current(6, 60, 2_100),
        ]
        .into()
    }

    #[test]
    fn test_sample_kind_labels() {
        assert_eq!(SampleKind::Voltage.as_str(), "voltage");
        assert_eq!(SampleKind::Current.as_str(), "current");
        assert_eq!(format!("{}", SampleKind::Voltage), "VOLTAGE");
    }

    #[test]
    fn test_series_channel_filter() {
        let series = mixed_series();
        assert_eq!(series.len(), 4);
        assert_eq!(series.count(SampleKind::Voltage), 2);
        assert_eq!(series.count(SampleKind::Current), 2);
        assert!(series.channel(SampleKind::Current).all(|s| s.is_current()));
    }

    #[test]
    fn test_series_span() {
        assert_eq!(mixed_series().span_nanos(), 1_100);
        assert_eq!(Series::new().span_nanos(), 0);
    }

    #[test]
    fn test_series_span_at_timestamp_extremes() {
        let series: Series = vec![
            Sample::voltage(1, 0, i64::MIN + 5),
            Sample::voltage(2, 0, i64::MAX - 5),
        ]
        .into();
        assert_eq!(series.span_nanos(), i64::MAX);
        assert_eq!(series.checked_span_nanos(), None);

        let reversed: Series = vec![
            Sample::voltage(1, 0, i64::MAX - 5),
            Sample::voltage(2, 0, i64::MIN + 5),
        ]
        .into();
        assert_eq!(reversed.span_nanos(), i64::MIN);
        assert_eq!(mixed_series().checked_span_nanos(), Some(1_100));
    }

    #[test]
    fn test_records_keep_order() {
        let records = mixed_series().to_records();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].sample_kind, "voltage");
        assert_eq!(records[1].sample_kind, "current");
        assert_eq!(records[1].nano_volts, 50);
        assert_eq!(records[3].epoch_nano, 2_100);
    }
}
