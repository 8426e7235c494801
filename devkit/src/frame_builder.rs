/*!
Builders for gateway frames.

The gateway firmware went through three payload generations:
- v1: `node`, `timeSinceLastMessage`
- v2: + `alarm`
- v3: + `distance`, `status`
All three are accepted by the kernel; these helpers produce each shape.
*/

use serde_json::{json, Map, Value};

/// v1 entry: identifier and elapsed time only.
pub fn beacon_v1(node: impl Into<Value>, elapsed_ms: u64) -> Value {
    json!({ "node": node.into(), "timeSinceLastMessage": elapsed_ms })
}

/// v2 entry: adds the alarm flag.
pub fn beacon_v2(node: impl Into<Value>, elapsed_ms: u64, alarm: bool) -> Value {
    json!({ "node": node.into(), "timeSinceLastMessage": elapsed_ms, "alarm": alarm })
}

/// v3 entry: adds distance and status.
pub fn beacon_v3(
    node: impl Into<Value>,
    elapsed_ms: u64,
    alarm: bool,
    distance: f64,
    status: &str,
) -> Value {
    json!({
        "node": node.into(),
        "timeSinceLastMessage": elapsed_ms,
        "alarm": alarm,
        "distance": distance,
        "status": status
    })
}

/// Builds a `{"lastMessageTimes": [...]}` frame entry by entry.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    entries: Vec<Value>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: impl Into<Value>, elapsed_ms: u64) -> Self {
        self.entries.push(beacon_v1(node, elapsed_ms));
        self
    }

    /// Any JSON value as an entry, for malformed-entry cases.
    pub fn raw_entry(mut self, entry: Value) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_alarm(self, alarm: bool) -> Self {
        self.set_on_last("alarm", Value::Bool(alarm))
    }

    pub fn with_distance(self, distance: f64) -> Self {
        self.set_on_last("distance", json!(distance))
    }

    pub fn with_status(self, status: &str) -> Self {
        self.set_on_last("status", Value::String(status.into()))
    }

    /// Drops a field from the last entry, e.g. to simulate a firmware that forgot `node`.
    pub fn without(mut self, field: &str) -> Self {
        if let Some(Value::Object(obj)) = self.entries.last_mut() {
            obj.remove(field);
        }
        self
    }

    fn set_on_last(mut self, field: &str, value: Value) -> Self {
        if let Some(Value::Object(obj)) = self.entries.last_mut() {
            obj.insert(field.to_string(), value);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("lastMessageTimes".into(), Value::Array(self.entries.clone()));
        Value::Object(doc)
    }

    /// Single line, no trailing newline.
    pub fn to_line(&self) -> String {
        self.build().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generations() {
        assert!(beacon_v1("N1", 10).get("alarm").is_none());
        assert_eq!(beacon_v2("N1", 10, true)["alarm"], true);
        let v3 = beacon_v3(7, 10, false, 2.5, "ok");
        assert_eq!(v3["node"], 7);
        assert_eq!(v3["distance"], 2.5);
        assert_eq!(v3["status"], "ok");
    }

    #[test]
    fn test_builder_edits_last_entry_only() {
        let frame = FrameBuilder::new()
            .node("A", 1)
            .node("B", 2)
            .with_alarm(true)
            .with_status("moving")
            .build();

        let entries = frame["lastMessageTimes"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].get("alarm").is_none());
        assert_eq!(entries[1]["alarm"], true);
        assert_eq!(entries[1]["status"], "moving");
    }

    #[test]
    fn test_without_removes_field() {
        let frame = FrameBuilder::new().node("A", 1).without("node").build();
        assert!(frame["lastMessageTimes"][0].get("node").is_none());
    }

    #[test]
    fn test_line_has_no_newline() {
        let line = FrameBuilder::new().node("A", 1).to_line();
        assert!(!line.contains('\n'));
        assert!(line.starts_with("{\"lastMessageTimes\":"));
    }
}
