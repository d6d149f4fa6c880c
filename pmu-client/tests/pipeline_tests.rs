// PMU Client - Integration Tests
//
// Organised as:
// 1. Batching thresholds
// 2. Funnel backpressure and concurrent producers
// 3. Delivery policy, timeouts and concurrency bound
// 4. HTTP transport

use async_trait::async_trait;
use bytes::Bytes;
use pmu::{wire, SampleKind, Series};
use pmu_client::{
    funnel, ChannelProducer, ClientError, DeliveryPolicy, HttpTransport, IterSource, Pipeline,
    PipelineConfig, RetryStrategy, SampleSource, TransmitConfig, Transmitter, Transport,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ============================================================================
// Helpers
// ============================================================================

/// Decodes and keeps every payload it receives
#[derive(Default)]
struct RecordingTransport {
    batches: Mutex<Vec<Series>>,
}

impl RecordingTransport {
    fn batches(&self) -> Vec<Series> {
        self.batches.lock().unwrap().clone()
    }

    fn sizes(&self) -> Vec<usize> {
        self.batches().iter().map(Series::len).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, payload: Bytes) -> pmu_client::Result<()> {
        let series = wire::decode(&payload).unwrap();
        self.batches.lock().unwrap().push(series);
        Ok(())
    }
}

/// Fails the first `fail_first` calls with a 503
struct FlakyTransport {
    calls: AtomicUsize,
    fail_first: usize,
}

impl FlakyTransport {
    fn new(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn send(&self, _payload: Bytes) -> pmu_client::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
            Err(ClientError::Status(503))
        } else {
            Ok(())
        }
    }
}

/// Sleeps on every send and tracks the peak number of concurrent sends
struct SlowTransport {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowTransport {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for SlowTransport {
    async fn send(&self, _payload: Bytes) -> pmu_client::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Replays codes at a fixed pace
struct PacedSource {
    codes: std::vec::IntoIter<i64>,
    interval: Duration,
}

impl PacedSource {
    fn new(codes: Vec<i64>, interval: Duration) -> Self {
        Self {
            codes: codes.into_iter(),
            interval,
        }
    }
}

impl SampleSource for PacedSource {
    fn read(&mut self) -> io::Result<Option<i64>> {
        std::thread::sleep(self.interval);
        Ok(self.codes.next())
    }
}

fn config(batch_size: usize, funnel_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        progress_every: 0,
        ..PipelineConfig::with_capacity(batch_size, funnel_capacity)
    }
}

fn batch(len: i64) -> Series {
    (0..len).map(|i| pmu::Sample::voltage(i, 0, i)).collect()
}

// ============================================================================
// Batching Tests
// ============================================================================

#[tokio::test]
async fn test_exact_multiple_of_threshold() {
    let recorder = Arc::new(RecordingTransport::default());
    let pipeline = Pipeline::new(config(100, 1024)).unwrap();

    let report = pipeline
        .run(
            IterSource::new(0..150),
            IterSource::new(1_000..1_150),
            recorder.clone(),
        )
        .await
        .unwrap();

    assert_eq!(report.samples_produced(), 300);
    assert_eq!(report.batcher.partial_batches, 0);
    assert_eq!(recorder.sizes(), vec![100, 100, 100]);
    assert_eq!(report.transmit.sent, 3);
}

#[tokio::test]
async fn test_partial_batch_sent_on_drain() {
    let recorder = Arc::new(RecordingTransport::default());
    let pipeline = Pipeline::new(config(100, 1024)).unwrap();

    let report = pipeline
        .run(
            IterSource::new(0..125),
            IterSource::new(0..125),
            recorder.clone(),
        )
        .await
        .unwrap();

    let mut sizes = recorder.sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);
    assert_eq!(report.batcher.partial_batches, 1);
    assert_eq!(report.transmit.samples_sent, 250);
}

#[tokio::test]
async fn test_threshold_larger_than_stream() {
    let recorder = Arc::new(RecordingTransport::default());
    let pipeline = Pipeline::new(config(1024, 1024)).unwrap();

    pipeline
        .run(IterSource::new(0..10), IterSource::new(0..5), recorder.clone())
        .await
        .unwrap();

    assert_eq!(recorder.sizes(), vec![15]);
}

// ============================================================================
// Funnel Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_producers_lose_nothing() {
    let recorder = Arc::new(RecordingTransport::default());
    let pipeline = Pipeline::new(config(64, 1024)).unwrap();

    let voltage: Vec<i64> = (0..300).collect();
    let current: Vec<i64> = (10_000..10_100).collect();

    let report = pipeline
        .run(
            PacedSource::new(voltage.clone(), Duration::from_micros(200)),
            PacedSource::new(current.clone(), Duration::from_micros(600)),
            recorder.clone(),
        )
        .await
        .unwrap();

    assert_eq!(report.samples_produced(), 400);
    assert_eq!(report.transmit.dropped, 0);

    // Batches may arrive out of order; per-channel order is checked by time
    let mut all: Vec<pmu::Sample> = recorder
        .batches()
        .into_iter()
        .flat_map(Series::into_samples)
        .collect();
    all.sort_by_key(|s| (s.channel, s.captured_at));

    let seen_voltage: Vec<i64> = all
        .iter()
        .filter(|s| s.channel == SampleKind::Voltage)
        .map(|s| s.raw_code)
        .collect();
    let seen_current: Vec<i64> = all
        .iter()
        .filter(|s| s.channel == SampleKind::Current)
        .map(|s| s.raw_code)
        .collect();
    assert_eq!(seen_voltage, voltage);
    assert_eq!(seen_current, current);
}

#[tokio::test]
async fn test_channel_order_within_batch() {
    let recorder = Arc::new(RecordingTransport::default());
    let pipeline = Pipeline::new(config(10_000, 1024)).unwrap();

    pipeline
        .run(
            IterSource::new(0..2_000),
            IterSource::new(0..2_000),
            recorder.clone(),
        )
        .await
        .unwrap();

    let batches = recorder.batches();
    assert_eq!(batches.len(), 1);
    for kind in [SampleKind::Voltage, SampleKind::Current] {
        let codes: Vec<i64> = batches[0].channel(kind).map(|s| s.raw_code).collect();
        assert_eq!(codes, (0..2_000).collect::<Vec<_>>());
        let times: Vec<i64> = batches[0].channel(kind).map(|s| s.captured_at).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[tokio::test]
async fn test_full_funnel_blocks_producer() {
    let (tx, mut rx) = funnel(4);
    let producer = ChannelProducer::new(SampleKind::Voltage, IterSource::new(0..100), tx.clone());
    let handle = producer.spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished(), "producer should be parked on a full funnel");
    assert_eq!(tx.len(), 4);
    drop(tx);

    let mut received = Vec::new();
    while let Some(sample) = rx.pull().await {
        received.push(sample.raw_code);
    }
    let report = handle.await.unwrap();
    assert_eq!(report.produced, 100);
    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_failed_channel_does_not_stop_the_other() {
    struct DeadBus;
    impl SampleSource for DeadBus {
        fn read(&mut self) -> io::Result<Option<i64>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no converter"))
        }
    }

    let recorder = Arc::new(RecordingTransport::default());
    let pipeline = Pipeline::new(config(50, 256)).unwrap();
    let report = pipeline
        .run(IterSource::new(0..100), DeadBus, recorder.clone())
        .await
        .unwrap();

    assert!(report.producer(SampleKind::Current).unwrap().failed());
    assert!(!report.producer(SampleKind::Voltage).unwrap().failed());
    assert_eq!(recorder.sizes(), vec![50, 50]);
}

// ============================================================================
// Delivery Tests
// ============================================================================

#[tokio::test]
async fn test_drop_policy_discards_failed_batch() {
    let transport = Arc::new(FlakyTransport::new(1));
    let config = TransmitConfig {
        max_in_flight: 1,
        ..TransmitConfig::with_delivery(DeliveryPolicy::Drop)
    };
    let handle = Transmitter::new(config, transport.clone()).start();
    let outbox = handle.outbox();
    for _ in 0..3 {
        outbox.send(batch(10)).await.unwrap();
    }
    drop(outbox);

    let summary = handle.finish().await;
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.retried, 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_policy_delivers_failed_batch() {
    let transport = Arc::new(FlakyTransport::new(1));
    let config = TransmitConfig {
        max_in_flight: 1,
        ..TransmitConfig::with_delivery(DeliveryPolicy::Retry(RetryStrategy::fixed(
            2,
            Duration::from_millis(1),
        )))
    };
    let handle = Transmitter::new(config, transport.clone()).start();
    let outbox = handle.outbox();
    for _ in 0..3 {
        outbox.send(batch(10)).await.unwrap();
    }
    drop(outbox);

    let summary = handle.finish().await;
    assert_eq!(summary.sent, 3);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.retried, 1);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let transport = Arc::new(FlakyTransport::new(usize::MAX));
    let config = TransmitConfig::with_delivery(DeliveryPolicy::Retry(RetryStrategy::fixed(
        2,
        Duration::from_millis(1),
    )));
    let handle = Transmitter::new(config, transport.clone()).start();
    handle.outbox().send(batch(5)).await.unwrap();

    let summary = handle.finish().await;
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.failed_attempts, 3);
}

#[tokio::test]
async fn test_send_timeout_drops_batch() {
    let transport = Arc::new(SlowTransport::new(Duration::from_secs(30)));
    let config = TransmitConfig {
        send_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let handle = Transmitter::new(config, transport).start();
    handle.outbox().send(batch(5)).await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle.finish())
        .await
        .expect("timed-out send must not hang the transmitter");
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.failed_attempts, 1);
}

#[tokio::test]
async fn test_in_flight_sends_are_bounded() {
    let transport = Arc::new(SlowTransport::new(Duration::from_millis(30)));
    let config = TransmitConfig {
        max_in_flight: 2,
        queue_depth: 32,
        ..Default::default()
    };
    let handle = Transmitter::new(config, transport.clone()).start();
    let outbox = handle.outbox();
    for _ in 0..8 {
        outbox.send(batch(3)).await.unwrap();
    }
    drop(outbox);

    let summary = handle.finish().await;
    assert_eq!(summary.sent, 8);
    assert!(transport.peak.load(Ordering::SeqCst) <= 2);
}

// ============================================================================
// HTTP Transport Tests
// ============================================================================

/// Accept one request, capture it, answer with `status`
async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_lowercase();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length || n == 0 {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let response =
            format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        stream.write_all(response.as_bytes()).await.unwrap();
        request
    });

    (url, task)
}

#[tokio::test]
async fn test_http_transport_posts_protobuf() {
    let (url, server) = one_shot_server("200 OK").await;
    let payload = wire::encode(&batch(3), wire::MAX_PAYLOAD_SIZE).unwrap();

    HttpTransport::new(url).send(payload.clone()).await.unwrap();

    let request = server.await.unwrap();
    let text = String::from_utf8_lossy(&request).to_lowercase();
    assert!(text.starts_with("post / http/1.1"));
    assert!(text.contains("content-type: application/x-protobuf"));
    assert!(request.ends_with(&payload));
}

#[tokio::test]
async fn test_http_transport_reports_status() {
    let (url, server) = one_shot_server("500 Internal Server Error").await;
    let payload = wire::encode(&batch(1), wire::MAX_PAYLOAD_SIZE).unwrap();

    let result = HttpTransport::new(url).send(payload).await;
    assert!(matches!(result, Err(ClientError::Status(500))));
    server.await.unwrap();
}
