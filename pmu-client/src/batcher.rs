// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch accumulation
//!
//! [`BatchAccumulator`] collects samples and seals a [`Series`] on the sample
//! that brings it to the size threshold. [`Batcher`] drives it from the
//! funnel and offers each sealed batch to the transmitter queue. The
//! batcher never waits on the transmitter: a batch that finds the queue
//! full is dropped and counted, so only the funnel exerts backpressure.
//!
//! # Example
//!
//! ```rust
//! use pmu::Sample;
//! use pmu_client::BatchAccumulator;
//!
//! let mut acc = BatchAccumulator::new(2);
//! assert!(acc.push(Sample::voltage(1, 0, 0)).is_none());
//! let batch = acc.push(Sample::current(2, 0, 1)).unwrap();
//! assert_eq!(batch.len(), 2);
//! assert!(acc.is_empty());
//! ```

use crate::funnel::FunnelReceiver;
use pmu::{Sample, Series};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// In-progress batch with a size threshold
#[derive(Debug)]
pub struct BatchAccumulator {
    batch: Series,
    threshold: usize,
}

impl BatchAccumulator {
    /// Create an accumulator sealing every `threshold` samples
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            batch: Series::with_capacity(threshold),
            threshold,
        }
    }

    /// Append a sample; returns the sealed batch if this sample completed it
    pub fn push(&mut self, sample: Sample) -> Option<Series> {
        self.batch.push(sample);
        if self.batch.len() >= self.threshold {
            Some(self.take())
        } else {
            None
        }
    }

    /// Seal whatever has accumulated, if anything
    pub fn drain(&mut self) -> Option<Series> {
        if self.batch.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Samples in the in-progress batch
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Check if the in-progress batch is empty
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Size threshold
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn take(&mut self) -> Series {
        std::mem::replace(&mut self.batch, Series::with_capacity(self.threshold))
    }
}

/// Counters of a finished batcher run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherReport {
    /// Batches handed to the transmitter
    pub batches: u64,
    /// Samples pulled from the funnel
    pub samples: u64,
    /// Trailing partial batches sealed on drain (0 or 1)
    pub partial_batches: u64,
    /// Batches lost because the transmitter queue was closed
    pub undelivered: u64,
    /// Batches dropped because the transmitter queue was full
    pub overflowed: u64,
}

/// Drains the funnel into sealed batches
pub struct Batcher {
    accumulator: BatchAccumulator,
    outbox: mpsc::Sender<Series>,
    progress_every: u64,
}

impl Batcher {
    /// Create a batcher sealing every `batch_size` samples into `outbox`
    pub fn new(batch_size: usize, outbox: mpsc::Sender<Series>) -> Self {
        Self {
            accumulator: BatchAccumulator::new(batch_size),
            outbox,
            progress_every: 0,
        }
    }

    /// Log throughput every `samples` samples (0 disables)
    pub fn with_progress(mut self, samples: u64) -> Self {
        self.progress_every = samples;
        self
    }

    /// Pull until the funnel is closed and drained, then seal the remainder
    pub async fn run(mut self, mut funnel: FunnelReceiver) -> BatcherReport {
        let started = Instant::now();
        let mut report = BatcherReport::default();

        while let Some(sample) = funnel.pull().await {
            report.samples += 1;
            if self.progress_every > 0 && report.samples % self.progress_every == 0 {
                let elapsed = started.elapsed();
                let per_sec = report.samples as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    samples = report.samples,
                    ?elapsed,
                    per_sec = per_sec as u64,
                    "acquisition progress"
                );
            }

            if let Some(batch) = self.accumulator.push(sample) {
                self.hand_off(batch, &mut report);
            }
        }

        if let Some(batch) = self.accumulator.drain() {
            report.partial_batches += 1;
            self.hand_off(batch, &mut report);
        }

        tracing::info!(
            batches = report.batches,
            samples = report.samples,
            overflowed = report.overflowed,
            "batcher drained"
        );
        report
    }

    fn hand_off(&self, batch: Series, report: &mut BatcherReport) {
        let len = batch.len();
        match self.outbox.try_send(batch) {
            Ok(()) => {
                report.batches += 1;
                tracing::debug!(samples = len, "batch sealed");
            }
            Err(TrySendError::Full(_)) => {
                report.overflowed += 1;
                tracing::warn!(samples = len, "transmitter queue full, batch dropped");
            }
            Err(TrySendError::Closed(_)) => {
                report.undelivered += 1;
                tracing::error!(samples = len, "transmitter gone, batch dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::funnel;

    fn sample(i: i64) -> Sample {
        Sample::voltage(i, 0, i)
    }

    #[test]
    fn test_seals_on_threshold_element() {
        let mut acc = BatchAccumulator::new(3);
        assert!(acc.push(sample(0)).is_none());
        assert!(acc.push(sample(1)).is_none());
        let sealed = acc.push(sample(2)).unwrap();
        assert_eq!(sealed.len(), 3);
        assert_eq!(sealed.samples()[2].raw_code, 2);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_drain_partial() {
        let mut acc = BatchAccumulator::new(10);
        assert!(acc.drain().is_none());
        acc.push(sample(0));
        acc.push(sample(1));
        assert_eq!(acc.drain().map(|b| b.len()), Some(2));
        assert!(acc.drain().is_none());
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let mut acc = BatchAccumulator::new(0);
        assert_eq!(acc.threshold(), 1);
        assert!(acc.push(sample(0)).is_some());
    }

    #[tokio::test]
    async fn test_run_splits_and_flushes() {
        let (tx, rx) = funnel(32);
        let (outbox, mut sealed) = mpsc::channel(8);
        for i in 0..7 {
            tx.push(sample(i)).await.unwrap();
        }
        drop(tx);

        let report = Batcher::new(3, outbox).run(rx).await;
        assert_eq!(report.samples, 7);
        assert_eq!(report.batches, 3);
        assert_eq!(report.partial_batches, 1);

        let sizes: Vec<usize> = std::iter::from_fn(|| sealed.try_recv().ok())
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_no_send_below_threshold_until_drain() {
        let (tx, rx) = funnel(32);
        let (outbox, mut sealed) = mpsc::channel(8);
        let task = tokio::spawn(Batcher::new(5, outbox).run(rx));

        for i in 0..4 {
            tx.push(sample(i)).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(sealed.try_recv().is_err());

        drop(tx);
        let report = task.await.unwrap();
        assert_eq!(report.batches, 1);
        assert_eq!(sealed.recv().await.map(|b| b.len()), Some(4));
    }

    #[tokio::test]
    async fn test_full_outbox_does_not_stall_batcher() {
        let (tx, rx) = funnel(8);
        // nobody drains the outbox, so it is full after one batch
        let (outbox, _sealed) = mpsc::channel(1);
        let task = tokio::spawn(Batcher::new(2, outbox).run(rx));

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            for i in 0..40 {
                tx.push(sample(i)).await.unwrap();
            }
        })
        .await
        .expect("producers must not block behind a full transmitter queue");
        drop(tx);

        let report = task.await.unwrap();
        assert_eq!(report.samples, 40);
        assert_eq!(report.batches, 1);
        assert_eq!(report.overflowed, 19);
        assert_eq!(report.undelivered, 0);
    }
}
