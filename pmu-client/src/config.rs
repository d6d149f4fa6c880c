// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for PMU Client

use crate::error::{ClientError, Result};
use crate::retry::RetryStrategy;
use pmu::wire::MAX_PAYLOAD_SIZE;
use pmu::AdcScale;
use std::time::Duration;

/// Pipeline-level configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Samples per batch; reaching it seals the batch (default: 1024)
    pub batch_size: usize,

    /// Funnel capacity in samples; producers block when full (default: 20480)
    pub funnel_capacity: usize,

    /// Conversion applied to raw codes by the producers
    pub adc: AdcScale,

    /// Log a throughput line every this many samples, 0 disables (default: 10000)
    pub progress_every: u64,

    /// Transmitter settings
    pub transmit: TransmitConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            funnel_capacity: 20_480,
            adc: AdcScale::default(),
            progress_every: 10_000,
            transmit: TransmitConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with a custom batch size
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Default::default()
        }
    }

    /// Create a configuration with custom batch size and funnel capacity
    pub fn with_capacity(batch_size: usize, funnel_capacity: usize) -> Self {
        Self {
            batch_size,
            funnel_capacity,
            ..Default::default()
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClientError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.funnel_capacity == 0 {
            return Err(ClientError::InvalidConfig(
                "funnel_capacity must be > 0".into(),
            ));
        }
        self.transmit.validate()
    }
}

/// What to do with a batch whose send failed
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeliveryPolicy {
    /// Log and discard the batch (best effort)
    #[default]
    Drop,
    /// Re-send according to the strategy, then discard
    Retry(RetryStrategy),
}

impl DeliveryPolicy {
    /// Retry schedule implied by this policy
    pub fn strategy(&self) -> RetryStrategy {
        match self {
            Self::Drop => RetryStrategy::None,
            Self::Retry(strategy) => strategy.clone(),
        }
    }
}

/// Transmitter configuration
#[derive(Debug, Clone)]
pub struct TransmitConfig {
    /// Collector endpoint receiving POSTed batches
    pub collector_url: String,

    /// Maximum concurrent sends (default: 4)
    pub max_in_flight: usize,

    /// Sealed batches waiting for a send slot before the batcher waits (default: 16)
    pub queue_depth: usize,

    /// Bound on a single send attempt (default: 5 s)
    pub send_timeout: Duration,

    /// Failure handling (default: drop)
    pub delivery: DeliveryPolicy,

    /// Largest encoded batch accepted for sending (default: 16 MiB)
    pub max_payload_bytes: usize,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://localhost:8080".to_string(),
            max_in_flight: 4,
            queue_depth: 16,
            send_timeout: Duration::from_secs(5),
            delivery: DeliveryPolicy::Drop,
            max_payload_bytes: MAX_PAYLOAD_SIZE,
        }
    }
}

impl TransmitConfig {
    /// Create a configuration for a collector URL
    pub fn with_url(collector_url: impl Into<String>) -> Self {
        Self {
            collector_url: collector_url.into(),
            ..Default::default()
        }
    }

    /// Create a configuration with a delivery policy
    pub fn with_delivery(delivery: DeliveryPolicy) -> Self {
        Self {
            delivery,
            ..Default::default()
        }
    }

    /// Reject values the transmitter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(ClientError::InvalidConfig(
                "max_in_flight must be > 0".into(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(ClientError::InvalidConfig("queue_depth must be > 0".into()));
        }
        if self.send_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "send_timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}
