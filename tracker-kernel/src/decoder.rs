/**
 * FRAME DECODER - One serial line in, one status batch (or nothing) out
 *
 * ROLE: parse the gateway's `{"lastMessageTimes": [...]}` document into a StatusBatch.
 *
 * RULES:
 * - All-or-nothing per frame: a document that does not parse yields no batch.
 * - Best-effort per entry: a missing or oddly typed field falls back to its default,
 *   the entry and its neighbours are kept.
 * - Three generations of the payload exist (with/without alarm, distance, status); they
 *   all decode into the same NodeStatus, absent fields left at their defaults.
 */

use crate::error::DecodeError;
use crate::models::{NodeId, NodeStatus, StatusBatch};
use serde_json::{Map, Value};

pub const BATCH_KEY: &str = "lastMessageTimes";

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    strict_schema: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// In strict mode a well-formed document without the batch array is an error
    /// instead of a silent no-op.
    pub fn strict(mut self, strict_schema: bool) -> Self {
        self.strict_schema = strict_schema;
        self
    }

    /// `Ok(None)` means "well-formed, nothing for us" (lenient mode only).
    pub fn decode(&self, line: &[u8]) -> Result<Option<StatusBatch>, DecodeError> {
        let text = std::str::from_utf8(line)?.trim();
        if text.is_empty() {
            return Err(DecodeError::EmptyFrame);
        }

        let doc: Value = serde_json::from_str(text)?;

        let Some(items) = doc.get(BATCH_KEY).and_then(Value::as_array) else {
            return if self.strict_schema {
                Err(DecodeError::SchemaMismatch)
            } else {
                Ok(None)
            };
        };

        Ok(Some(items.iter().map(decode_entry).collect()))
    }
}

/// Lenient decode with the default decoder.
pub fn decode_frame(line: &[u8]) -> Result<Option<StatusBatch>, DecodeError> {
    FrameDecoder::new().decode(line)
}

fn decode_entry(item: &Value) -> NodeStatus {
    let Some(obj) = item.as_object() else {
        return NodeStatus::no_data();
    };

    NodeStatus {
        node_id: field(obj, "node").and_then(node_id),
        time_since_last_message: field(obj, "timeSinceLastMessage").and_then(millis),
        alarm: field(obj, "alarm").map(flag).unwrap_or(false),
        distance: field(obj, "distance").and_then(number),
        status: field(obj, "status").map(text),
    }
}

/// Explicit `null` counts as absent.
fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn node_id(v: &Value) -> Option<NodeId> {
    match v {
        Value::String(s) => Some(NodeId::Text(s.clone())),
        Value::Number(n) => Some(NodeId::Number(n.clone())),
        other => Some(NodeId::Text(other.to_string())),
    }
}

fn millis(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    number(v)
        .filter(|f| *f >= 0.0)
        .map(|f| f.round() as u64)
}

fn flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn number(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    f.filter(|f: &f64| f.is_finite())
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
