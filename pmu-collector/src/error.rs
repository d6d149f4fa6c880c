// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for PMU Collector

use std::time::Duration;
use thiserror::Error;

/// Main error type for collector operations
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Request body is not a valid batch
    #[error("Decode error: {0}")]
    Decode(#[from] pmu::DecodeError),

    /// Rows could not be written
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Schema change could not be applied
    #[error("Migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// Schema is not in a usable state
    #[error("Schema error: {0}")]
    Schema(String),

    /// Write did not finish in time
    #[error("Persistence timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollectorError {
    /// True when the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_is_client_error() {
        let err: CollectorError = pmu::DecodeError::Malformed("eof".into()).into();
        assert!(err.is_client_error());
        assert!(!CollectorError::Persistence("disk full".into()).is_client_error());
    }

    #[test]
    fn test_migration_message() {
        let err = CollectorError::Migration {
            version: 3,
            reason: "no such column".into(),
        };
        assert_eq!(err.to_string(), "Migration 3 failed: no such column");
    }
}
