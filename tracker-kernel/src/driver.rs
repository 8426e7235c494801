/**
 * POLLING DRIVER - Serial stream → decoder → aggregator
 *
 * ROLE: the single consumer of the line source. Every tick it checks whether bytes are
 * waiting, reads at most one line, decodes it and publishes the batch.
 *
 * FAILURE POLICY:
 * - read errors (unplugged device, timeout) are logged and counted, the loop goes on;
 * - malformed frames are logged and counted, the snapshot is left alone;
 * - frames without a batch are skipped quietly.
 * Only the cancellation token stops the loop.
 */

use crate::aggregator::SharedAggregator;
use crate::decoder::FrameDecoder;
use crate::error::{DecodeError, IngestError};
use crate::health::HealthTracker;
use std::io;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Byte stream split into lines. Implemented over a serial port in production and by
/// scripted stubs in tests.
pub trait LineSource: Send {
    /// Must not block.
    fn bytes_available(&mut self) -> io::Result<bool>;

    /// Next line without its terminator, or `None` while the line is still incomplete.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn bytes_available(&mut self) -> io::Result<bool> {
        (**self).bytes_available()
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).read_line()
    }
}

/// What a single poll did. Mostly for tests and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing to read, or only part of a line so far.
    Idle,
    Accepted { rows: usize },
    /// Well-formed frame carrying no batch, or a blank line.
    Ignored,
    /// Frame could not be decoded; snapshot untouched.
    Rejected,
    ReadFailed,
}

pub struct PollingDriver<S> {
    source: S,
    decoder: FrameDecoder,
    aggregator: SharedAggregator,
    health: HealthTracker,
    poll_interval: Duration,
}

impl<S: LineSource> PollingDriver<S> {
    pub fn new(source: S, aggregator: SharedAggregator, health: HealthTracker) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(),
            aggregator,
            health,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_decoder(mut self, decoder: FrameDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_once(&mut self) -> PollOutcome {
        self.health.record_poll();

        match self.read_frame() {
            Ok(None) => PollOutcome::Idle,
            Ok(Some(line)) => {
                self.health.record_frame();
                self.ingest(&line)
            }
            Err(e) => {
                warn!(error = %e, "serial read failed, will retry on next poll");
                self.health.record_read_failure(&e);
                PollOutcome::ReadFailed
            }
        }
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, IngestError> {
        if !self.source.bytes_available()? {
            return Ok(None);
        }
        Ok(self.source.read_line()?)
    }

    fn ingest(&self, line: &[u8]) -> PollOutcome {
        match self.decoder.decode(line) {
            Ok(Some(batch)) => {
                let rows = batch.len();
                self.aggregator.accept(batch);
                self.health.record_accepted();
                debug!(rows, "status batch accepted");
                PollOutcome::Accepted { rows }
            }
            Ok(None) => {
                debug!("frame without status batch skipped");
                self.health.record_ignored();
                PollOutcome::Ignored
            }
            Err(DecodeError::EmptyFrame) => {
                debug!("empty frame skipped");
                self.health.record_ignored();
                PollOutcome::Ignored
            }
            Err(e) => {
                warn!(error = %e, frame = %String::from_utf8_lossy(line), "frame rejected");
                self.health.record_malformed(&e);
                PollOutcome::Rejected
            }
        }
    }

    /// Polls every `poll_interval` until `shutdown` fires, then drops the source.
    ///
    /// Each poll runs on the blocking pool: a serial read may wait up to the port timeout
    /// for the rest of a line. Shutdown is noticed between polls, so it can lag by one read.
    pub async fn run(self, shutdown: CancellationToken)
    where
        S: 'static,
    {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "polling driver started");
        self.health.mark_stream_open();
        let health = self.health.clone();

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut driver = self;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let poll = tokio::task::spawn_blocking(move || {
                let outcome = driver.poll_once();
                (driver, outcome)
            });
            match poll.await {
                Ok((d, _)) => driver = d,
                Err(e) => {
                    // The source went down with the panicking poll.
                    error!(error = %e, "poll task failed, stopping driver");
                    health.mark_stream_closed();
                    return;
                }
            }
        }

        drop(driver);
        health.mark_stream_closed();
        info!("polling driver stopped, stream released");
    }
}
