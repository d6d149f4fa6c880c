// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded sample funnel
//!
//! Merges the samples of every producer into one first-come-first-served
//! stream. Pushing into a full funnel waits for space; nothing is ever
//! dropped. The stream ends once every [`FunnelSender`] is gone and the
//! buffered samples are pulled.

use crate::error::{ClientError, Result};
use pmu::Sample;
use tokio::sync::mpsc;

/// Create a funnel holding at most `capacity` samples
///
/// # Panics
///
/// Panics if `capacity` is zero; [`crate::PipelineConfig::validate`] rejects it.
pub fn funnel(capacity: usize) -> (FunnelSender, FunnelReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (FunnelSender { tx }, FunnelReceiver { rx })
}

/// Producer side of the funnel
#[derive(Debug, Clone)]
pub struct FunnelSender {
    tx: mpsc::Sender<Sample>,
}

impl FunnelSender {
    /// Push a sample, waiting while the funnel is full
    pub async fn push(&self, sample: Sample) -> Result<()> {
        self.tx
            .send(sample)
            .await
            .map_err(|_| ClientError::FunnelClosed)
    }

    /// Push from a blocking thread, parking it while the funnel is full
    ///
    /// Must not be called from within the async runtime.
    pub fn blocking_push(&self, sample: Sample) -> Result<()> {
        self.tx
            .blocking_send(sample)
            .map_err(|_| ClientError::FunnelClosed)
    }

    /// Samples currently buffered
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Check if no samples are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered samples
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer side of the funnel
#[derive(Debug)]
pub struct FunnelReceiver {
    rx: mpsc::Receiver<Sample>,
}

impl FunnelReceiver {
    /// Pull the next sample, waiting while the funnel is empty
    ///
    /// Returns None once every sender is dropped and the funnel is drained.
    pub async fn pull(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }
}
