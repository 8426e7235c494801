use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;

/// Rendered in place of a required field the sender left out.
pub const NO_DATA: &str = "no data";

/// Node identifier as sent by the gateway: usually a string, sometimes a bare integer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeId {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Text(s) => f.write_str(s),
            NodeId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Last known status of one field node, as of the frame it was decoded from.
///
/// `None` on `node_id` / `time_since_last_message` is the "no data" sentinel: the
/// entry was kept, the sender just did not fill the field in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub node_id: Option<NodeId>,
    pub time_since_last_message: Option<u64>,
    pub alarm: bool,
    pub distance: Option<f64>,
    pub status: Option<String>,
}

impl NodeStatus {
    /// Entry with every field at its fallback value.
    pub fn no_data() -> Self {
        Self {
            node_id: None,
            time_since_last_message: None,
            alarm: false,
            distance: None,
            status: None,
        }
    }
}

/// Decoded content of one frame. Position in `entries` is the display row, not `node_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBatch {
    entries: Vec<NodeStatus>,
}

impl StatusBatch {
    pub fn new(entries: Vec<NodeStatus>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[NodeStatus] {
        &self.entries
    }

    /// Row lookup, 1-based like the display.
    pub fn row(&self, row: usize) -> Option<&NodeStatus> {
        row.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// `(row, entry)` pairs in source order, rows starting at 1.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &NodeStatus)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e))
    }
}

impl FromIterator<NodeStatus> for StatusBatch {
    fn from_iter<I: IntoIterator<Item = NodeStatus>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// What readers see: the last accepted batch, whole.
///
/// `sequence` is 0 before the first accept and bumps by one on every accept, so a
/// renderer can tell "nothing changed" without comparing rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub sequence: u64,
    pub received_at: Option<OffsetDateTime>,
    pub batch: StatusBatch,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.sequence == 0
    }
}
