// PMU - Power measurement telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Wire format for series
//!
//! A series travels as one protobuf message so that any protobuf consumer can
//! read it without this crate:
//!
//! ```text
//! message Series {
//!   enum SampleKind { VOLTAGE = 0; CURRENT = 1; }
//!   message Measurement {
//!     SampleKind sampleKind = 1;
//!     int64 nanovolts = 2;
//!     int64 rawSample = 3;
//!     int64 epochNanos = 4;
//!   }
//!   repeated Measurement measurements = 1;
//! }
//! ```
//!
//! [`encode`] and [`decode`] are the only entry points; the message structs
//! stay private to this boundary.

use bytes::Bytes;
use prost::Message;

use crate::error::{DecodeError, EncodeError};
use crate::protocol::{Sample, SampleKind, Series};

/// Default upper bound for an encoded series (16 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

#[derive(Clone, PartialEq, Message)]
struct WireSeries {
    #[prost(message, repeated, tag = "1")]
    measurements: Vec<WireMeasurement>,
}

#[derive(Clone, PartialEq, Message)]
struct WireMeasurement {
    #[prost(enumeration = "SampleKind", tag = "1")]
    sample_kind: i32,
    #[prost(int64, tag = "2")]
    nanovolts: i64,
    #[prost(int64, tag = "3")]
    raw_sample: i64,
    #[prost(int64, tag = "4")]
    epoch_nanos: i64,
}

impl From<&Sample> for WireMeasurement {
    fn from(sample: &Sample) -> Self {
        Self {
            sample_kind: sample.channel as i32,
            nanovolts: sample.nanovolts,
            raw_sample: sample.raw_code,
            epoch_nanos: sample.captured_at,
        }
    }
}

/// Serialize a series, rejecting payloads over `max_size` bytes
pub fn encode(series: &Series, max_size: usize) -> Result<Bytes, EncodeError> {
    let message = WireSeries {
        measurements: series.iter().map(WireMeasurement::from).collect(),
    };

    let size = message.encoded_len();
    if size > max_size {
        return Err(EncodeError::PayloadTooLarge {
            size,
            max: max_size,
        });
    }

    Ok(Bytes::from(message.encode_to_vec()))
}

/// Parse a series from a request body
///
/// Fails as a whole: a single bad measurement rejects the entire payload.
pub fn decode(payload: &[u8]) -> Result<Series, DecodeError> {
    let message =
        WireSeries::decode(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let mut series = Series::with_capacity(message.measurements.len());
    for (index, m) in message.measurements.into_iter().enumerate() {
        let channel = SampleKind::try_from(m.sample_kind).map_err(|_| {
            DecodeError::UnknownSampleKind {
                index,
                value: m.sample_kind,
            }
        })?;
        series.push(Sample::new(channel, m.raw_sample, m.nanovolts, m.epoch_nanos));
    }

    Ok(series)
}
