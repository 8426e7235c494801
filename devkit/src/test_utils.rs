/*!
Test harness wiring the kernel pipeline to a scripted source.

Two ways to drive it:
- step by step with `poll` / `drain`, fully deterministic;
- `spawn` the real polling loop and wait on snapshot sequences.
*/

use crate::frame_builder::FrameBuilder;
use crate::serial_stub::ScriptedSource;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracker_kernel::view::{snapshot_view, RowView};
use tracker_kernel::{
    FrameDecoder, HealthTracker, PollOutcome, PollingDriver, SharedAggregator, Snapshot,
    StatusAggregator,
};

pub struct TestHarness {
    pub source: ScriptedSource,
    pub aggregator: SharedAggregator,
    pub health: HealthTracker,
    driver: PollingDriver<ScriptedSource>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_decoder(FrameDecoder::new())
    }

    pub fn with_decoder(decoder: FrameDecoder) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let source = ScriptedSource::new();
        let aggregator = StatusAggregator::shared();
        let health = HealthTracker::new();
        let driver = PollingDriver::new(source.clone(), aggregator.clone(), health.clone())
            .with_decoder(decoder);

        Self {
            source,
            aggregator,
            health,
            driver,
        }
    }

    pub fn send_line(&self, line: &str) {
        self.source.push_line(line);
    }

    pub fn send_frame(&self, frame: &FrameBuilder) {
        self.source.push_line(&frame.to_line());
    }

    pub fn poll(&mut self) -> PollOutcome {
        self.driver.poll_once()
    }

    /// Polls until the source reports nothing left. Bounded so a bad script cannot hang.
    pub fn drain(&mut self) -> Vec<PollOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..1_000 {
            match self.driver.poll_once() {
                PollOutcome::Idle => break,
                other => outcomes.push(other),
            }
        }
        outcomes
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.aggregator.current()
    }

    pub fn rows(&self) -> Vec<RowView> {
        snapshot_view(&self.snapshot()).rows
    }

    /// Compares `(node, elapsed)` of every row, in order.
    pub fn assert_rows(&self, expected: &[(&str, &str)]) -> Result<()> {
        let actual: Vec<(String, String)> = self
            .rows()
            .into_iter()
            .map(|r| (r.node, r.elapsed))
            .collect();
        let expected: Vec<(String, String)> = expected
            .iter()
            .map(|(n, e)| (n.to_string(), e.to_string()))
            .collect();

        if actual != expected {
            anyhow::bail!("rows mismatch: expected {:?}, got {:?}", expected, actual);
        }
        Ok(())
    }

    /// Hands the driver to the real polling loop.
    pub fn spawn(self, poll_interval: Duration) -> RunningHarness {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            self.driver
                .with_poll_interval(poll_interval)
                .run(shutdown.clone()),
        );

        RunningHarness {
            source: self.source,
            aggregator: self.aggregator,
            health: self.health,
            shutdown,
            handle,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunningHarness {
    pub source: ScriptedSource,
    pub aggregator: SharedAggregator,
    pub health: HealthTracker,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningHarness {
    /// Waits until the snapshot sequence reaches `sequence`.
    pub async fn wait_for_sequence(&self, sequence: u64, timeout_ms: u64) -> Result<Arc<Snapshot>> {
        let wait = async {
            loop {
                let snapshot = self.aggregator.current();
                if snapshot.sequence >= sequence {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(Duration::from_millis(timeout_ms), wait)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "timed out waiting for snapshot #{sequence} (at #{})",
                    self.aggregator.sequence()
                )
            })
    }

    /// Waits until the source buffer has been fully consumed.
    pub async fn wait_until_drained(&self, timeout_ms: u64) -> Result<()> {
        let wait = async {
            while self.source.pending_bytes() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_millis(timeout_ms), wait)
            .await
            .map_err(|_| anyhow::anyhow!("source still holds {} bytes", self.source.pending_bytes()))
    }

    /// Cancels the loop and waits for it to return.
    pub async fn shutdown(self) -> Result<ScriptedSource> {
        self.shutdown.cancel();
        self.handle.await?;
        Ok(self.source)
    }
}
