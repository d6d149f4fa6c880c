// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for PMU Client

use pmu::SampleKind;
use std::time::Duration;
use thiserror::Error;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Sample source could not deliver a reading
    #[error("Acquisition failed on {channel} channel: {reason}")]
    Acquisition { channel: SampleKind, reason: String },

    /// Batch could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] pmu::EncodeError),

    /// Collector answered with a non-success status
    #[error("Collector rejected batch with status {0}")]
    Status(u16),

    /// Network transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Send did not complete in time
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Funnel was closed while a producer was pushing
    #[error("Sample funnel closed")]
    FunnelClosed,
}

impl ClientError {
    /// Create an acquisition error for a channel
    pub fn acquisition(channel: SampleKind, reason: impl Into<String>) -> Self {
        Self::Acquisition {
            channel,
            reason: reason.into(),
        }
    }

    /// True for failures that another attempt might not repeat
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Status(500..=599)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
