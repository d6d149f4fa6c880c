//! # PMU - Power measurement telemetry
//!
//! Shared core of the power measurement pipeline: the sample model, the wire
//! codec spoken between client and collector, and the line analysis run by
//! the collector.
//!
//! ## Key Features
//!
//! - **Two channels**: every sample is tagged VOLTAGE or CURRENT
//! - **Compact wire format**: batches travel as one protobuf message
//! - **Frequency**: zero-crossing estimate over the voltage channel
//! - **Phase**: mean voltage-to-current peak lag within one cycle
//!
//! ## Quick Start
//!
//! ```rust
//! use pmu::analysis::{analyze, AnalysisConfig};
//! use pmu::synth::{InterleavedSynth, Waveform};
//! use pmu::wire;
//! use std::time::Duration;
//!
//! // Two seconds of a 60 Hz line
//! let series = InterleavedSynth::new(Waveform::sine(60.0, 1_000.0), 1_200.0)
//!     .generate(Duration::from_secs(2));
//!
//! // Client side: encode the batch
//! let payload = wire::encode(&series, wire::MAX_PAYLOAD_SIZE).unwrap();
//!
//! // Collector side: decode and analyse
//! let decoded = wire::decode(&payload).unwrap();
//! let analysis = analyze(&decoded, &AnalysisConfig::default());
//! assert!((analysis.frequency_hz().unwrap() - 60.0).abs() < 1.0);
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Samples, series and storage records
//! - [`wire`]: Protobuf encoding of a series
//! - [`adc`]: Raw code to nanovolt conversion
//! - [`analysis`]: Frequency and phase estimation
//! - [`synth`]: Synthetic waveforms for simulation and tests

// Modules
pub mod adc;
pub mod analysis;
pub mod error;
pub mod protocol;
pub mod synth;
pub mod wire;

// Re-exports for convenient access
pub use adc::AdcScale;
pub use analysis::{analyze, Analysis, AnalysisConfig, FrequencyEstimate, PhaseEstimate};
pub use error::{AnalysisError, DecodeError, EncodeError, PmuError, Result};
pub use protocol::{MeasurementRecord, Sample, SampleKind, Series, CONTENT_TYPE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let series: Series = vec![
            Sample::voltage(1_000, 91_552_734, 1),
            Sample::current(-20, -1_831_054, 2),
        ]
        .into();

        let payload = wire::encode(&series, wire::MAX_PAYLOAD_SIZE).unwrap();
        let decoded = wire::decode(&payload).unwrap();

        assert_eq!(decoded, series);
    }
}
