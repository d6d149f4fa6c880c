// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channel producers
//!
//! A producer owns one [`SampleSource`], tags every raw code with its channel
//! and capture time, converts it to nanovolts and pushes it into the funnel.

use crate::clock::MonotonicClock;
use crate::error::ClientError;
use crate::funnel::FunnelSender;
use crate::source::SampleSource;
use pmu::{AdcScale, Sample, SampleKind};
use tokio::task::JoinHandle;

/// Why a producer stopped
#[derive(Debug)]
pub enum ProducerExit {
    /// Source reported end of stream
    SourceEnded,
    /// Source failed; this channel is halted
    Failed(ClientError),
    /// Funnel consumer went away
    FunnelClosed,
}

/// Summary returned by a finished producer
#[derive(Debug)]
pub struct ProducerReport {
    /// Channel the producer served
    pub channel: SampleKind,
    /// Samples pushed into the funnel
    pub produced: u64,
    /// Reason the producer stopped
    pub exit: ProducerExit,
}

impl ProducerReport {
    /// True when the producer stopped because of an acquisition failure
    pub fn failed(&self) -> bool {
        matches!(self.exit, ProducerExit::Failed(_))
    }
}

/// Reads one channel and feeds the funnel
pub struct ChannelProducer<S> {
    channel: SampleKind,
    source: S,
    clock: MonotonicClock,
    adc: AdcScale,
    funnel: FunnelSender,
}

impl<S: SampleSource + 'static> ChannelProducer<S> {
    /// Create a producer for `channel`
    pub fn new(channel: SampleKind, source: S, funnel: FunnelSender) -> Self {
        Self {
            channel,
            source,
            clock: MonotonicClock::new(),
            adc: AdcScale::default(),
            funnel,
        }
    }

    /// Stamp samples with a shared clock
    pub fn with_clock(mut self, clock: MonotonicClock) -> Self {
        self.clock = clock;
        self
    }

    /// Convert codes with a custom ADC scale
    pub fn with_adc(mut self, adc: AdcScale) -> Self {
        self.adc = adc;
        self
    }

    /// Run on the current thread until the source ends or fails
    ///
    /// Blocks while the funnel is full.
    pub fn run(mut self) -> ProducerReport {
        let mut produced = 0;
        let exit = loop {
            let raw = match self.source.read() {
                Ok(Some(raw)) => raw,
                Ok(None) => break ProducerExit::SourceEnded,
                Err(err) => {
                    let err = ClientError::acquisition(self.channel, err.to_string());
                    tracing::error!(channel = %self.channel, error = %err, "producer halted");
                    break ProducerExit::Failed(err);
                }
            };

            let sample = Sample::new(
                self.channel,
                raw,
                self.adc.to_nanovolts(raw),
                self.clock.now_nanos(),
            );
            if self.funnel.blocking_push(sample).is_err() {
                break ProducerExit::FunnelClosed;
            }
            produced += 1;
        };

        tracing::info!(channel = %self.channel, produced, ?exit, "producer stopped");
        ProducerReport {
            channel: self.channel,
            produced,
            exit,
        }
    }

    /// Run on the blocking thread pool
    pub fn spawn(self) -> JoinHandle<ProducerReport> {
        tokio::task::spawn_blocking(move || self.run())
    }
}
