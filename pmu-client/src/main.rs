// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # PMU Client
//!
//! Runs the acquisition pipeline against simulated voltage and current
//! channels and posts every batch to a collector.
//!
//! ## Usage
//!
//! ```bash
//! # Stream a 60 Hz line to a local collector
//! pmu-client --collector http://localhost:8080
//!
//! # Ten seconds of data in batches of 2400, retrying failed sends
//! pmu-client --seconds 10 --batch-size 2400 --retries 3
//! ```

use clap::Parser;
use pmu::synth::Waveform;
use pmu_client::{
    DeliveryPolicy, HttpTransport, Pipeline, PipelineConfig, RetryStrategy, SimulatedSource,
    TransmitConfig,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// PMU acquisition client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Collector URL batches are POSTed to
    #[arg(short, long, default_value = "http://localhost:8080")]
    collector: String,

    /// Samples per batch
    #[arg(short, long, default_value = "1024")]
    batch_size: usize,

    /// Funnel capacity in samples
    #[arg(long, default_value = "20480")]
    funnel_capacity: usize,

    /// Maximum concurrent sends
    #[arg(long, default_value = "4")]
    max_in_flight: usize,

    /// Sealed batches queued for sending before the batcher waits
    #[arg(long, default_value = "16")]
    queue_depth: usize,

    /// Per-send timeout in milliseconds
    #[arg(long, default_value = "5000")]
    send_timeout_ms: u64,

    /// Log progress every this many samples
    #[arg(long, default_value = "10000")]
    progress_every: u64,

    /// Retries per failed batch (0 drops failed batches)
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Samples per second on each channel
    #[arg(short, long, default_value = "1200")]
    rate: f64,

    /// Simulated line frequency in Hz
    #[arg(long, default_value = "60")]
    line_hz: f64,

    /// Current lag behind voltage in degrees
    #[arg(long, default_value = "30")]
    lag_degrees: f64,

    /// Uniform noise amplitude in ADC codes
    #[arg(long, default_value = "0")]
    noise: i64,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let delivery = if self.retries == 0 {
            DeliveryPolicy::Drop
        } else {
            DeliveryPolicy::Retry(RetryStrategy::exponential(
                self.retries,
                Duration::from_millis(200),
            ))
        };

        PipelineConfig {
            batch_size: self.batch_size,
            funnel_capacity: self.funnel_capacity,
            progress_every: self.progress_every,
            transmit: TransmitConfig {
                collector_url: self.collector.clone(),
                max_in_flight: self.max_in_flight,
                queue_depth: self.queue_depth,
                send_timeout: Duration::from_millis(self.send_timeout_ms),
                delivery,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn source(&self, waveform: Waveform) -> SimulatedSource {
        let source = SimulatedSource::new(waveform)
            .with_rate(self.rate)
            .with_noise(self.noise);
        match self.seconds {
            Some(seconds) => source.with_limit((seconds.max(0.0) * self.rate) as u64),
            None => source,
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

    info!("PMU Client v{}", pmu_client::VERSION);

    let pipeline = match Pipeline::new(args.pipeline_config()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Converter codes for a line near full scale, current well below it
    let voltage = Waveform::sine(args.line_hz, 20_000.0);
    let current = Waveform::sine(args.line_hz, 4_000.0).with_phase(-args.lag_degrees.to_radians());

    let transport = Arc::new(HttpTransport::from_config(&pipeline.config().transmit));
    info!("Sending to {}", transport.url());

    let run = pipeline.run(args.source(voltage), args.source(current), transport);

    tokio::select! {
        result = run => match result {
            Ok(report) => {
                info!(
                    "Done: {} samples, {} batches sent, {} dropped",
                    report.samples_produced(),
                    report.transmit.sent,
                    report.transmit.dropped
                );
                if report.producers.iter().any(|p| p.failed()) {
                    return ExitCode::FAILURE;
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Pipeline failed: {}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            ExitCode::SUCCESS
        }
    }
}
