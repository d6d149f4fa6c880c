// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # PMU Client - Acquisition pipeline
//!
//! Reads the voltage and current channels, merges them into batches and
//! ships every batch to the collector.
//!
//! ## Features
//!
//! - **Two independent producers**: one blocking reader per channel
//! - **Backpressure**: a full funnel parks the producers, nothing is dropped
//! - **Size-triggered batches**: sealed on the sample reaching the threshold
//! - **Bounded sends**: capped concurrency, per-send timeout, explicit
//!   delivery policy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pmu_client::{HttpTransport, Pipeline, PipelineConfig, SimulatedSource};
//! use std::sync::Arc;
//!
//! # async fn demo() -> pmu_client::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let transport = Arc::new(HttpTransport::new("http://localhost:8080"));
//!
//! let report = pipeline
//!     .run(
//!         SimulatedSource::line(20_000.0).with_limit(12_000),
//!         SimulatedSource::line(4_000.0).with_limit(12_000),
//!         transport,
//!     )
//!     .await?;
//! println!("sent {} batches", report.transmit.sent);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ Voltage      │   │ Current      │   SampleSource (blocking)
//! │ producer     │   │ producer     │
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!                 ▼
//!        ┌─────────────────┐
//!        │ Funnel (bounded)│   backpressure on producers
//!        └────────┬────────┘
//!                 ▼
//!        ┌─────────────────┐
//!        │ Batcher         │   seals every batch_size samples
//!        └────────┬────────┘
//!                 ▼
//!        ┌─────────────────┐
//!        │ Transmitter     │   max_in_flight sends → POST to collector
//!        └─────────────────┘
//! ```

mod batcher;
mod clock;
mod config;
mod error;
mod funnel;
mod pipeline;
mod producer;
mod retry;
mod source;
mod transmitter;

// Public API
pub use batcher::{BatchAccumulator, Batcher, BatcherReport};
pub use clock::MonotonicClock;
pub use config::{DeliveryPolicy, PipelineConfig, TransmitConfig};
pub use error::{ClientError, Result};
pub use funnel::{funnel, FunnelReceiver, FunnelSender};
pub use pipeline::{Pipeline, PipelineReport};
pub use producer::{ChannelProducer, ProducerExit, ProducerReport};
pub use retry::{retry_async, Attempts, RetryStrategy};
pub use source::{IterSource, SampleSource, SimulatedSource};
pub use transmitter::{
    HttpTransport, TransmitStats, TransmitSummary, Transmitter, TransmitterHandle, Transport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
