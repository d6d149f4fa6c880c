// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! End-to-end acquisition pipeline
//!
//! Wires two channel producers, the funnel, the batcher and the transmitter
//! together and runs them until both sources have ended and every queued
//! batch has been sent or dropped.

use crate::batcher::{Batcher, BatcherReport};
use crate::clock::MonotonicClock;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::funnel::funnel;
use crate::producer::{ChannelProducer, ProducerReport};
use crate::source::SampleSource;
use crate::transmitter::{Transmitter, TransmitSummary, Transport};
use pmu::SampleKind;
use std::sync::Arc;

/// Outcome of a pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    /// One report per channel producer
    pub producers: Vec<ProducerReport>,
    /// Batcher counters
    pub batcher: BatcherReport,
    /// Transmitter counters
    pub transmit: TransmitSummary,
}

impl PipelineReport {
    /// Samples pushed by all producers
    pub fn samples_produced(&self) -> u64 {
        self.producers.iter().map(|p| p.produced).sum()
    }

    /// Report for one channel
    pub fn producer(&self, channel: SampleKind) -> Option<&ProducerReport> {
        self.producers.iter().find(|p| p.channel == channel)
    }
}

/// Two-channel acquisition pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    clock: MonotonicClock,
}

impl Pipeline {
    /// Create a pipeline, validating the configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: MonotonicClock::new(),
        })
    }

    /// Stamp samples with the given clock
    pub fn with_clock(mut self, clock: MonotonicClock) -> Self {
        self.clock = clock;
        self
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run until both sources end and the transmitter settles
    pub async fn run<V, C>(
        &self,
        voltage: V,
        current: C,
        transport: Arc<dyn Transport>,
    ) -> Result<PipelineReport>
    where
        V: SampleSource + 'static,
        C: SampleSource + 'static,
    {
        let (tx, rx) = funnel(self.config.funnel_capacity);

        let voltage: Box<dyn SampleSource> = Box::new(voltage);
        let current: Box<dyn SampleSource> = Box::new(current);
        let producers = [
            ChannelProducer::new(SampleKind::Voltage, voltage, tx.clone()),
            ChannelProducer::new(SampleKind::Current, current, tx),
        ]
        .map(|producer| {
            producer
                .with_clock(self.clock)
                .with_adc(self.config.adc)
                .spawn()
        });

        let transmitter = Transmitter::new(self.config.transmit.clone(), transport).start();
        let batcher = Batcher::new(self.config.batch_size, transmitter.outbox())
            .with_progress(self.config.progress_every);

        tracing::info!(
            batch_size = self.config.batch_size,
            funnel_capacity = self.config.funnel_capacity,
            max_in_flight = self.config.transmit.max_in_flight,
            "pipeline started"
        );

        let batcher_report = batcher.run(rx).await;
        let transmit = transmitter.finish().await;

        let mut reports = Vec::with_capacity(producers.len());
        for handle in producers {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => tracing::error!(error = %err, "producer task failed"),
            }
        }

        tracing::info!(
            samples = batcher_report.samples,
            batches = batcher_report.batches,
            overflowed = batcher_report.overflowed,
            sent = transmit.sent,
            dropped = transmit.dropped,
            "pipeline finished"
        );

        Ok(PipelineReport {
            producers: reports,
            batcher: batcher_report,
            transmit,
        })
    }
}
