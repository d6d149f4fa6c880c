// PMU Client - Acquisition pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Batch transmission
//!
//! Sealed batches wait in a bounded queue. A dispatcher task takes them one
//! at a time, encodes them and sends them on a bounded pool of concurrent
//! send tasks. Each attempt is bounded by the send timeout; failed batches
//! are dropped or retried according to the [`DeliveryPolicy`](crate::DeliveryPolicy).
//!
//! ```text
//!  Batcher ──► queue (queue_depth) ──► dispatcher ──► send task ┐
//!                                                 ├─► send task ├─► Transport
//!                                                 └─► send task ┘   (max_in_flight)
//! ```

use crate::config::TransmitConfig;
use crate::error::{ClientError, Result};
use crate::retry::{retry_async, RetryStrategy};
use async_trait::async_trait;
use bytes::Bytes;
use pmu::{wire, Series};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Carries one encoded batch to the collector
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload`; Ok only when the collector acknowledged it
    async fn send(&self, payload: Bytes) -> Result<()>;
}

/// POSTs batches to an HTTP collector
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Create a transport for the configured collector
    pub fn from_config(config: &TransmitConfig) -> Self {
        Self::new(config.collector_url.clone())
    }

    /// Collector URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Bytes) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, pmu::CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Status(status.as_u16()))
        }
    }
}

/// Live transmission counters
#[derive(Debug, Default)]
pub struct TransmitStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
    failed_attempts: AtomicU64,
    serialization_failures: AtomicU64,
    samples_sent: AtomicU64,
}

impl TransmitStats {
    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> TransmitSummary {
        TransmitSummary {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
            samples_sent: self.samples_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`TransmitStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitSummary {
    /// Batches acknowledged by the collector
    pub sent: u64,
    /// Batches given up on
    pub dropped: u64,
    /// Re-send attempts made
    pub retried: u64,
    /// Send attempts that failed
    pub failed_attempts: u64,
    /// Batches that could not be encoded
    pub serialization_failures: u64,
    /// Samples in acknowledged batches
    pub samples_sent: u64,
}

/// Handle to a running transmitter
pub struct TransmitterHandle {
    outbox: mpsc::Sender<Series>,
    stats: Arc<TransmitStats>,
    task: JoinHandle<()>,
}

impl TransmitterHandle {
    /// Queue for sealed batches
    pub fn outbox(&self) -> mpsc::Sender<Series> {
        self.outbox.clone()
    }

    /// Live counters
    pub fn stats(&self) -> Arc<TransmitStats> {
        Arc::clone(&self.stats)
    }

    /// Close the queue and wait for every queued and in-flight send to settle
    ///
    /// Other clones of the outbox must be dropped for this to return.
    pub async fn finish(self) -> TransmitSummary {
        let Self {
            outbox,
            stats,
            task,
        } = self;
        drop(outbox);
        if let Err(err) = task.await {
            tracing::error!(error = %err, "transmitter dispatcher failed");
        }
        stats.snapshot()
    }
}

/// Bounded pool of batch senders
pub struct Transmitter {
    config: TransmitConfig,
    transport: Arc<dyn Transport>,
}

impl Transmitter {
    /// Create a transmitter sending through `transport`
    pub fn new(config: TransmitConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Start the dispatcher task
    pub fn start(self) -> TransmitterHandle {
        let (outbox, queue) = mpsc::channel(self.config.queue_depth.max(1));
        let stats = Arc::new(TransmitStats::default());
        let task = tokio::spawn(self.dispatch(queue, Arc::clone(&stats)));
        TransmitterHandle {
            outbox,
            stats,
            task,
        }
    }

    async fn dispatch(self, mut queue: mpsc::Receiver<Series>, stats: Arc<TransmitStats>) {
        let slots = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let strategy = self.config.delivery.strategy();
        let mut in_flight = JoinSet::new();

        loop {
            let permit = match Arc::clone(&slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let Some(batch) = queue.recv().await else {
                break;
            };

            let job = SendJob {
                transport: Arc::clone(&self.transport),
                stats: Arc::clone(&stats),
                strategy: strategy.clone(),
                timeout: self.config.send_timeout,
                max_payload: self.config.max_payload_bytes,
            };
            in_flight.spawn(async move {
                job.deliver(batch).await;
                drop(permit);
            });

            while let Some(done) = in_flight.try_join_next() {
                log_join_error(done);
            }
        }

        while let Some(done) = in_flight.join_next().await {
            log_join_error(done);
        }
        tracing::debug!("transmitter queue closed");
    }
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "send task failed");
    }
}

struct SendJob {
    transport: Arc<dyn Transport>,
    stats: Arc<TransmitStats>,
    strategy: RetryStrategy,
    timeout: Duration,
    max_payload: usize,
}

impl SendJob {
    async fn deliver(self, batch: Series) {
        let samples = batch.len();
        let payload = match wire::encode(&batch, self.max_payload) {
            Ok(payload) => payload,
            Err(err) => {
                self.stats
                    .serialization_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(samples, error = %err, "batch dropped: serialization failed");
                return;
            }
        };
        // sealed batch is not kept once encoded
        drop(batch);

        let outcome = retry_async(&self.strategy, ClientError::is_transient, || {
            self.attempt(payload.clone())
        })
        .await;

        let retries = u64::from(outcome.attempts.saturating_sub(1));
        self.stats.retried.fetch_add(retries, Ordering::Relaxed);

        match outcome.result {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .samples_sent
                    .fetch_add(samples as u64, Ordering::Relaxed);
                tracing::debug!(samples, bytes = payload.len(), "batch sent");
            }
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    samples,
                    attempts = outcome.attempts,
                    error = %err,
                    "batch dropped"
                );
            }
        }
    }

    async fn attempt(&self, payload: Bytes) -> Result<()> {
        let result = match tokio::time::timeout(self.timeout, self.transport.send(payload)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        };
        if result.is_err() {
            self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryPolicy;
    use pmu::Sample;
    use std::sync::atomic::AtomicUsize;

    struct CountingTransport {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _payload: Bytes) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                Err(ClientError::Status(503))
            } else {
                Ok(())
            }
        }
    }

    fn batch(len: i64) -> Series {
        (0..len).map(|i| Sample::voltage(i, 0, i)).collect()
    }

    #[test]
    fn test_http_transport_uses_configured_url() {
        let config = TransmitConfig::with_url("http://collector.local:9090/ingest");
        let transport = HttpTransport::from_config(&config);
        assert_eq!(transport.url(), "http://collector.local:9090/ingest");
    }

    #[tokio::test]
    async fn test_sends_every_batch() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let handle = Transmitter::new(TransmitConfig::default(), transport.clone()).start();
        let outbox = handle.outbox();
        for _ in 0..5 {
            outbox.send(batch(10)).await.unwrap();
        }
        drop(outbox);

        let summary = handle.finish().await;
        assert_eq!(summary.sent, 5);
        assert_eq!(summary.samples_sent, 50);
        assert_eq!(summary.dropped, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_dropped() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let config = TransmitConfig {
            max_payload_bytes: 8,
            ..Default::default()
        };
        let handle = Transmitter::new(config, transport.clone()).start();
        handle.outbox().send(batch(100)).await.unwrap();

        let summary = handle.finish().await;
        assert_eq!(summary.serialization_failures, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_policy_recovers() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let config = TransmitConfig::with_delivery(DeliveryPolicy::Retry(RetryStrategy::fixed(
            3,
            Duration::from_millis(1),
        )));
        let handle = Transmitter::new(config, transport).start();
        handle.outbox().send(batch(4)).await.unwrap();

        let summary = handle.finish().await;
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.retried, 2);
        assert_eq!(summary.failed_attempts, 2);
    }
}
