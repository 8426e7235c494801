//! Display strings for snapshot rows, plus the optional console table.

use crate::aggregator::SharedAggregator;
use crate::models::{NodeStatus, Snapshot, NO_DATA};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub row: usize,
    pub node: String,
    pub elapsed: String,
    pub alarm: bool,
    pub distance: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotView {
    pub sequence: u64,
    pub received_at: Option<String>, // RFC3339
    pub rows: Vec<RowView>,
}

pub fn row_view(row: usize, entry: &NodeStatus) -> RowView {
    RowView {
        row,
        node: entry
            .node_id
            .as_ref()
            .map_or_else(|| NO_DATA.to_string(), ToString::to_string),
        elapsed: entry
            .time_since_last_message
            .map_or_else(|| NO_DATA.to_string(), |ms| format!("{ms} ms")),
        alarm: entry.alarm,
        distance: entry.distance.map(format_distance).unwrap_or_default(),
        status: entry.status.clone().unwrap_or_default(),
    }
}

/// Whole-number readings keep their decimal point, as the gateway sends them.
fn format_distance(d: f64) -> String {
    if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.1}")
    } else {
        d.to_string()
    }
}

pub fn snapshot_view(snapshot: &Snapshot) -> SnapshotView {
    SnapshotView {
        sequence: snapshot.sequence,
        received_at: snapshot
            .received_at
            .and_then(|t| t.format(&Rfc3339).ok()),
        rows: snapshot
            .batch
            .rows()
            .map(|(row, entry)| row_view(row, entry))
            .collect(),
    }
}

pub fn render_table(snapshot: &Snapshot) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Node", "Time", "Alarm", "Distance", "Status"]);

    for (row, entry) in snapshot.batch.rows() {
        let v = row_view(row, entry);
        let alarm = if v.alarm {
            Cell::new("true").fg(Color::Red)
        } else {
            Cell::new("false")
        };
        table.add_row(vec![
            Cell::new(v.row),
            Cell::new(v.node),
            Cell::new(v.elapsed),
            alarm,
            Cell::new(v.distance),
            Cell::new(v.status),
        ]);
    }
    table
}

/// Renders the table only when the snapshot moved past `seen`.
fn refresh_table(seen: &mut u64, snapshot: &Snapshot) -> Option<Table> {
    if snapshot.sequence == *seen {
        return None;
    }
    *seen = snapshot.sequence;
    Some(render_table(snapshot))
}

/// Reprints the whole table whenever the snapshot sequence moves. Checks every `every`.
pub fn spawn_console_table(
    aggregator: SharedAggregator,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen = 0;
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(table) = refresh_table(&mut seen, &aggregator.current()) {
                        println!("{table}");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::StatusAggregator;
    use crate::decoder::decode_frame;
    use crate::models::StatusBatch;

    fn snapshot_of(line: &str) -> Snapshot {
        Snapshot {
            sequence: 1,
            received_at: None,
            batch: decode_frame(line.as_bytes()).unwrap().unwrap(),
        }
    }

    #[test]
    fn test_alarm_row() {
        let snap = snapshot_of(r#"{"lastMessageTimes":[{"node":"N1","timeSinceLastMessage":120,"alarm":true}]}"#);
        let view = snapshot_view(&snap);
        assert_eq!(
            view.rows,
            vec![RowView {
                row: 1,
                node: "N1".into(),
                elapsed: "120 ms".into(),
                alarm: true,
                distance: String::new(),
                status: String::new(),
            }]
        );
    }

    #[test]
    fn test_distance_status_row() {
        let snap = snapshot_of(r#"{"lastMessageTimes":[{"node":"N1","timeSinceLastMessage":50,"distance":3.2,"status":"ok"}]}"#);
        let row = &snapshot_view(&snap).rows[0];
        assert_eq!(row.distance, "3.2");
        assert_eq!(row.status, "ok");
        assert!(!row.alarm);
    }

    #[test]
    fn test_missing_required_fields_render_no_data() {
        let v = row_view(3, &NodeStatus::no_data());
        assert_eq!(v.row, 3);
        assert_eq!(v.node, NO_DATA);
        assert_eq!(v.elapsed, NO_DATA);
    }

    #[test]
    fn test_table_has_one_line_per_row() {
        let snap = snapshot_of(
            r#"{"lastMessageTimes":[{"node":"alpha","timeSinceLastMessage":1},{"node":"bravo","timeSinceLastMessage":2}]}"#,
        );
        let rendered = render_table(&snap).to_string();
        assert!(rendered.contains("1 ms"));
        assert!(rendered.contains("2 ms"));
        assert!(rendered.find("alpha").unwrap() < rendered.find("bravo").unwrap());
    }

    #[test]
    fn test_whole_distance_keeps_decimal_point() {
        let snap = snapshot_of(
            r#"{"lastMessageTimes":[{"node":"N1","timeSinceLastMessage":1,"distance":9.0},{"node":"N2","timeSinceLastMessage":1,"distance":12}]}"#,
        );
        let view = snapshot_view(&snap);
        assert_eq!(view.rows[0].distance, "9.0");
        assert_eq!(view.rows[1].distance, "12.0");
    }

    #[test]
    fn test_table_refreshes_only_on_new_sequence() {
        let aggregator = StatusAggregator::shared();
        let mut seen = 0;
        assert!(refresh_table(&mut seen, &aggregator.current()).is_none());

        aggregator.accept(decode_frame(br#"{"lastMessageTimes":[{"node":"alpha","timeSinceLastMessage":1}]}"#).unwrap().unwrap());
        let table = refresh_table(&mut seen, &aggregator.current()).unwrap();
        assert!(table.to_string().contains("alpha"));
        assert_eq!(seen, 1);
        assert!(refresh_table(&mut seen, &aggregator.current()).is_none());

        aggregator.accept(StatusBatch::default());
        assert!(refresh_table(&mut seen, &aggregator.current()).is_some());
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_console_table_stops_on_cancel() {
        let token = CancellationToken::new();
        let handle = spawn_console_table(
            StatusAggregator::shared(),
            Duration::from_millis(10),
            token.clone(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_empty_snapshot_view() {
        let view = snapshot_view(&Snapshot {
            batch: StatusBatch::default(),
            ..Snapshot::default()
        });
        assert_eq!(view.sequence, 0);
        assert!(view.rows.is_empty());
        assert!(view.received_at.is_none());
    }
}
