// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # PMU Collector
//!
//! HTTP collector for PMU batches.
//!
//! ## Usage
//!
//! ```bash
//! # Persist to ./data on the default port
//! pmu-collector --data-dir ./data
//!
//! # Keep rows in memory, 50 Hz grid
//! pmu-collector --memory --nominal-hz 50 --port 9090
//! ```

use clap::Parser;
use pmu::AnalysisConfig;
use pmu_collector::{build_state, router, CollectorConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// PMU batch collector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Directory for schema.json and pmu.csv
    #[arg(short, long, default_value = "data", conflicts_with = "memory")]
    data_dir: PathBuf,

    /// Keep rows in memory instead of on disk
    #[arg(long)]
    memory: bool,

    /// Per-batch persistence timeout in milliseconds
    #[arg(long, default_value = "5000")]
    persist_timeout_ms: u64,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = pmu::wire::MAX_PAYLOAD_SIZE)]
    max_body_bytes: usize,

    /// Line frequency assumed when a batch has no frequency estimate
    #[arg(long, default_value = "60")]
    nominal_hz: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> CollectorConfig {
        CollectorConfig {
            listen: SocketAddr::new(self.bind, self.port),
            data_dir: (!self.memory).then(|| self.data_dir.clone()),
            persist_timeout: Duration::from_millis(self.persist_timeout_ms),
            max_body_bytes: self.max_body_bytes,
            analysis: AnalysisConfig::with_nominal_frequency(self.nominal_hz),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("PMU Collector v{}", pmu_collector::VERSION);

    let config = args.config();
    let state = match build_state(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let app = router(state, config.max_body_bytes);

    info!("Starting server on http://{}", config.listen);
    let listener = match TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.listen, e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Interrupted, shutting down");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
