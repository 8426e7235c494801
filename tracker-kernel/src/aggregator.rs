//! Holder of the live snapshot.
//!
//! One writer (the polling driver), any number of readers (HTTP, console table).
//! Readers get an `Arc<Snapshot>`; `accept` builds the next snapshot off to the side
//! and swaps the pointer, so nobody ever sees half of one frame and half of another.

use crate::models::{Snapshot, StatusBatch};
use parking_lot::RwLock;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Default)]
pub struct StatusAggregator {
    current: RwLock<Arc<Snapshot>>,
}

pub type SharedAggregator = Arc<StatusAggregator>;

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedAggregator {
        Arc::new(Self::new())
    }

    /// Replace the whole snapshot with `batch`. Nodes missing from `batch` are gone.
    pub fn accept(&self, batch: StatusBatch) {
        let received_at = Some(OffsetDateTime::now_utc());
        let mut current = self.current.write();
        let sequence = current.sequence + 1;
        *current = Arc::new(Snapshot {
            sequence,
            received_at,
            batch,
        });
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn sequence(&self) -> u64 {
        self.current.read().sequence
    }
}
