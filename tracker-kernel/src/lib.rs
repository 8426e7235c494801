//! Tracker kernel - live status board for field nodes reporting over a serial gateway
//!
//! The gateway writes one JSON line per cycle listing every node it hears from:
//! - `decoder` turns a line into a `StatusBatch` (or explains why not)
//! - `aggregator` holds the latest batch as an immutable, swappable `Snapshot`
//! - `driver` polls the line source on a fixed cadence and feeds the two above
//! - `view` / `http` are read-only consumers of the snapshot

pub mod aggregator;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod health;
pub mod http;
pub mod models;
pub mod serial;
pub mod view;

pub use aggregator::{SharedAggregator, StatusAggregator};
pub use decoder::{decode_frame, FrameDecoder};
pub use driver::{LineSource, PollOutcome, PollingDriver};
pub use error::{ConfigError, DecodeError, IngestError};
pub use health::HealthTracker;
pub use models::{NodeId, NodeStatus, Snapshot, StatusBatch};
