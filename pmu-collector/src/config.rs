// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Collector configuration

use pmu::wire::MAX_PAYLOAD_SIZE;
use pmu::AnalysisConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Address the HTTP server binds to (default: 0.0.0.0:8080)
    pub listen: SocketAddr,
    /// Directory holding `schema.json` and `pmu.csv`; in-memory store when `None`
    pub data_dir: Option<PathBuf>,
    /// Upper bound on one bulk write (default: 5 s)
    pub persist_timeout: Duration,
    /// Largest accepted request body (default: 16 MiB)
    pub max_body_bytes: usize,
    /// Frequency and phase settings
    pub analysis: AnalysisConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: None,
            persist_timeout: Duration::from_secs(5),
            max_body_bytes: MAX_PAYLOAD_SIZE,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Create a configuration persisting to `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }
}
