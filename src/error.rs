// PMU - Power measurement telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for PMU
//!
//! This module defines the error types shared by the client and the collector.

use thiserror::Error;

/// Result type alias for PMU operations
pub type Result<T> = std::result::Result<T, PmuError>;

/// Main error type for PMU operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PmuError {
    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Analysis error
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Errors while serializing a series for the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Encoded payload exceeds the configured limit
    #[error("Payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Errors while decoding an inbound payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not a valid series message
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Measurement carries a sample kind this build does not know
    #[error("Unknown sample kind {value} at measurement {index}")]
    UnknownSampleKind { index: usize, value: i32 },
}

/// Reasons an analysis metric cannot be produced for a series
///
/// Each metric reports its own failure; one failing never suppresses another.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Series holds no samples at all
    #[error("Series is empty")]
    EmptySeries,

    /// Series spans less than the baseline window
    #[error("Series spans {span_ns}ns, need at least {required_ns}ns for a baseline")]
    SpanTooShort { span_ns: i64, required_ns: i64 },

    /// Series holds no VOLTAGE samples
    #[error("Series contains no voltage samples")]
    NoVoltageSamples,

    /// No VOLTAGE sample falls inside the baseline window
    #[error("No voltage samples inside the baseline window")]
    EmptyBaselineWindow,

    /// Frequency is zero, negative or not finite
    #[error("Invalid line frequency: {0} Hz")]
    InvalidFrequency(f64),

    /// No voltage peak was followed by a current peak within one cycle
    #[error("No voltage/current lag intervals found")]
    NoLagIntervals,

    /// First and last timestamps are too far apart to measure in nanoseconds
    #[error("Series timestamps {first} to {last} do not fit a nanosecond span")]
    SpanOverflow { first: i64, last: i64 },
}

impl AnalysisError {
    /// True when the failure comes from the data itself (too little of it)
    /// rather than from a bad input parameter or corrupt timestamps
    pub fn is_insufficient_data(&self) -> bool {
        !matches!(
            self,
            AnalysisError::InvalidFrequency(_) | AnalysisError::SpanOverflow { .. }
        )
    }

    /// Short snake_case label, suitable for metric labels
    pub fn reason(&self) -> &'static str {
        match self {
            AnalysisError::EmptySeries => "empty_series",
            AnalysisError::SpanTooShort { .. } => "span_too_short",
            AnalysisError::NoVoltageSamples => "no_voltage_samples",
            AnalysisError::EmptyBaselineWindow => "empty_baseline_window",
            AnalysisError::InvalidFrequency(_) => "invalid_frequency",
            AnalysisError::NoLagIntervals => "no_lag_intervals",
            AnalysisError::SpanOverflow { .. } => "span_overflow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PmuError::Decode(DecodeError::UnknownSampleKind { index: 3, value: 9 });
        let msg = format!("{}", err);
        assert!(msg.contains("sample kind"));
        assert!(msg.contains('9'));
    }

    #[test]
    fn test_error_conversion() {
        let err: PmuError = AnalysisError::NoLagIntervals.into();
        assert!(matches!(err, PmuError::Analysis(_)));
    }

    #[test]
    fn test_insufficient_data_classification() {
        assert!(AnalysisError::EmptySeries.is_insufficient_data());
        assert!(AnalysisError::NoLagIntervals.is_insufficient_data());
        assert!(!AnalysisError::InvalidFrequency(0.0).is_insufficient_data());
        assert!(!AnalysisError::SpanOverflow { first: 0, last: 0 }.is_insufficient_data());
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(AnalysisError::NoLagIntervals.reason(), "no_lag_intervals");
        let short = AnalysisError::SpanTooShort {
            span_ns: 1,
            required_ns: 2,
        };
        assert_eq!(short.reason(), "span_too_short");
    }
}
