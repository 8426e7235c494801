use crate::aggregator::{SharedAggregator, StatusAggregator};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Open,
    /// Last poll hit a read error; the loop keeps trying.
    Degraded,
    Closed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestHealth {
    pub uptime_seconds: u64,
    pub stream_status: StreamStatus,
    pub polls: u64,
    pub frames_read: u64,
    pub batches_accepted: u64,
    pub frames_ignored: u64,
    pub malformed_frames: u64,
    pub read_failures: u64,
    pub last_error: Option<String>,
    pub snapshot_sequence: u64,
    pub rows_tracked: usize,
}

#[derive(Debug, Default)]
struct Counters {
    polls: AtomicU64,
    frames_read: AtomicU64,
    batches_accepted: AtomicU64,
    frames_ignored: AtomicU64,
    malformed_frames: AtomicU64,
    read_failures: AtomicU64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
    stream_status: Arc<Mutex<StreamStatus>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
            stream_status: Arc::new(Mutex::new(StreamStatus::Closed)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn mark_stream_open(&self) {
        *self.stream_status.lock() = StreamStatus::Open;
    }

    pub fn mark_stream_closed(&self) {
        *self.stream_status.lock() = StreamStatus::Closed;
    }

    pub fn record_poll(&self) {
        self.counters.polls.fetch_add(1, Ordering::Relaxed);
    }

    /// A line came off the wire, so the stream is healthy again.
    pub fn record_frame(&self) {
        self.counters.frames_read.fetch_add(1, Ordering::Relaxed);
        let mut status = self.stream_status.lock();
        if *status == StreamStatus::Degraded {
            *status = StreamStatus::Open;
        }
    }

    pub fn record_accepted(&self) {
        self.counters.batches_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.counters.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self, reason: impl ToString) {
        self.counters.malformed_frames.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(reason.to_string());
    }

    pub fn record_read_failure(&self, reason: impl ToString) {
        self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(reason.to_string());
        *self.stream_status.lock() = StreamStatus::Degraded;
    }

    pub fn get_health(&self, aggregator: &StatusAggregator) -> IngestHealth {
        let snapshot = aggregator.current();
        let c = &self.counters;

        IngestHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            stream_status: *self.stream_status.lock(),
            polls: c.polls.load(Ordering::Relaxed),
            frames_read: c.frames_read.load(Ordering::Relaxed),
            batches_accepted: c.batches_accepted.load(Ordering::Relaxed),
            frames_ignored: c.frames_ignored.load(Ordering::Relaxed),
            malformed_frames: c.malformed_frames.load(Ordering::Relaxed),
            read_failures: c.read_failures.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            snapshot_sequence: snapshot.sequence,
            rows_tracked: snapshot.batch.len(),
        }
    }

    /// Logs an ingest summary every `every` until `shutdown` fires.
    pub fn spawn_health_reporter(
        &self,
        aggregator: SharedAggregator,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick fires immediately; skip it, nothing to report yet.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let h = tracker.get_health(&aggregator);
                        info!(
                            stream = ?h.stream_status,
                            frames = h.frames_read,
                            accepted = h.batches_accepted,
                            ignored = h.frames_ignored,
                            malformed = h.malformed_frames,
                            read_failures = h.read_failures,
                            rows = h.rows_tracked,
                            "ingest health (uptime: {}s)", h.uptime_seconds
                        );
                    }
                }
            }
        })
    }
}
