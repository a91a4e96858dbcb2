use std::collections::BTreeMap;
use std::time::Duration;

use time::OffsetDateTime;

use super::event::{Category, Direction, EventBody, Layer, LogEvent};

/// Aggregates for one connection observed in a log.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStats {
    pub first_seen: OffsetDateTime,
    pub last_seen: OffsetDateTime,
    pub events: u64,
    /// Device identity inferred from the first record that carried one.
    pub device_id: Option<String>,
    /// Zone identity inferred from the first record that carried one.
    pub zone_id: Option<String>,
    pub snapshots: u64,
}

/// Whole-log aggregates derived in one streaming pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogStats {
    pub total_events: u64,
    pub by_layer: BTreeMap<Layer, u64>,
    pub by_category: BTreeMap<Category, u64>,
    pub by_direction: BTreeMap<Direction, u64>,
    pub connections: BTreeMap<String, ConnectionStats>,
    pub errors: u64,
    pub first_event: Option<OffsetDateTime>,
    pub last_event: Option<OffsetDateTime>,
}

impl LogStats {
    /// Consumes an event stream and derives its aggregates.
    #[must_use]
    pub fn collect(events: impl IntoIterator<Item = LogEvent>) -> Self {
        let mut stats = Self::default();
        for event in events {
            stats.record(&event);
        }
        stats
    }

    /// Folds one event into the aggregates.
    pub fn record(&mut self, event: &LogEvent) {
        let header = &event.header;
        self.total_events += 1;
        *self.by_layer.entry(header.layer).or_default() += 1;
        *self.by_category.entry(header.category).or_default() += 1;
        *self.by_direction.entry(header.direction).or_default() += 1;
        if matches!(event.body, EventBody::Error(_)) {
            self.errors += 1;
        }

        let timestamp = header.timestamp;
        if self.first_event.is_none_or(|first| timestamp < first) {
            self.first_event = Some(timestamp);
        }
        if self.last_event.is_none_or(|last| timestamp > last) {
            self.last_event = Some(timestamp);
        }

        let connection = self
            .connections
            .entry(header.connection_id.clone())
            .or_insert_with(|| ConnectionStats {
                first_seen: timestamp,
                last_seen: timestamp,
                events: 0,
                device_id: None,
                zone_id: None,
                snapshots: 0,
            });
        connection.events += 1;
        if timestamp < connection.first_seen {
            connection.first_seen = timestamp;
        }
        if timestamp > connection.last_seen {
            connection.last_seen = timestamp;
        }
        if connection.device_id.is_none() {
            connection.device_id = header.device_id.clone();
        }
        if connection.zone_id.is_none() {
            connection.zone_id = header.zone_id.clone();
        }
        if matches!(event.body, EventBody::CapabilitySnapshot(_)) {
            connection.snapshots += 1;
        }
    }

    /// Returns the span between the first and last event.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.first_event, self.last_event) {
            (Some(first), Some(last)) => (last - first).try_into().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::super::event::{
        CapabilitySnapshotEvent, ErrorEventData, EventHeader, MessageEvent,
    };
    use super::*;

    fn event_at(
        connection_id: &str,
        seconds: i64,
        direction: Direction,
        body: EventBody,
    ) -> LogEvent {
        let mut header =
            EventHeader::new(connection_id, direction, Layer::Wire, Category::Message);
        header.timestamp = datetime!(2026-03-01 08:00:00 UTC) + time::Duration::seconds(seconds);
        header.device_id = Some("mash-evse-01".into());
        if connection_id == "conn-grid" {
            header.zone_id = Some("zone-grid".into());
        }
        LogEvent::new(header, body)
    }

    fn message(message_id: u32) -> EventBody {
        EventBody::Message(MessageEvent {
            message_id,
            operation: None,
            endpoint: None,
            feature: None,
            status: None,
            payload_len: None,
        })
    }

    #[test]
    fn stats_aggregate_by_layer_category_direction_and_connection() {
        let stats = LogStats::collect([
            event_at("conn-grid", 0, Direction::In, message(1)),
            event_at("conn-grid", 5, Direction::Out, message(2)),
            event_at(
                "conn-grid",
                6,
                Direction::Out,
                EventBody::CapabilitySnapshot(CapabilitySnapshotEvent {
                    endpoint_count: 2,
                    feature_count: 6,
                }),
            ),
            event_at(
                "conn-user",
                9,
                Direction::In,
                EventBody::Error(ErrorEventData {
                    code: Some(2),
                    message: "constraint".into(),
                }),
            ),
        ]);

        assert_eq!(4, stats.total_events);
        assert_eq!(1, stats.errors);
        assert_eq!(Some(&2), stats.by_direction.get(&Direction::In));
        assert_eq!(Some(&2), stats.by_direction.get(&Direction::Out));
        assert_eq!(Some(&2), stats.by_category.get(&Category::Message));
        assert_eq!(Some(&1), stats.by_category.get(&Category::Snapshot));
        assert_eq!(Duration::from_secs(9), stats.duration());

        let grid = stats
            .connections
            .get("conn-grid")
            .expect("grid connection should aggregate");
        assert_eq!(3, grid.events);
        assert_eq!(1, grid.snapshots);
        assert_eq!(Some("zone-grid".into()), grid.zone_id);
        assert_eq!(Some("mash-evse-01".into()), grid.device_id);
        assert_eq!(datetime!(2026-03-01 08:00:00 UTC), grid.first_seen);
        assert_eq!(datetime!(2026-03-01 08:00:06 UTC), grid.last_seen);
    }
}
