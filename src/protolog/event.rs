use serde::Serialize;
use serde_with::{SerializeDisplay, hex::Hex, serde_as, skip_serializing_none};
use strum_macros::Display as StrumDisplay;
use time::OffsetDateTime;

/// Flow direction of a logged event relative to this device.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, StrumDisplay, SerializeDisplay,
)]
pub enum Direction {
    #[strum(to_string = "in")]
    In,
    #[strum(to_string = "out")]
    Out,
}

/// Stack layer that produced the event.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, StrumDisplay, SerializeDisplay,
)]
pub enum Layer {
    #[strum(to_string = "transport")]
    Transport,
    #[strum(to_string = "wire")]
    Wire,
    #[strum(to_string = "service")]
    Service,
}

/// Coarse event classification.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, StrumDisplay, SerializeDisplay,
)]
pub enum Category {
    #[strum(to_string = "message")]
    Message,
    #[strum(to_string = "control")]
    Control,
    #[strum(to_string = "state")]
    State,
    #[strum(to_string = "error")]
    Error,
    #[strum(to_string = "snapshot")]
    Snapshot,
}

/// Which side of the connection this process played.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay, SerializeDisplay)]
pub enum LocalRole {
    #[strum(to_string = "device")]
    Device,
    #[strum(to_string = "controller")]
    Controller,
}

/// Header fields shared by every logged event.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHeader {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub connection_id: String,
    pub direction: Direction,
    pub layer: Layer,
    pub category: Category,
    pub local_role: Option<LocalRole>,
    pub remote_addr: Option<String>,
    pub device_id: Option<String>,
    pub zone_id: Option<String>,
}

impl EventHeader {
    /// Creates a header stamped with the current wall clock.
    #[must_use]
    pub fn new(
        connection_id: impl Into<String>,
        direction: Direction,
        layer: Layer,
        category: Category,
    ) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            connection_id: connection_id.into(),
            direction,
            layer,
            category,
            local_role: None,
            remote_addr: None,
            device_id: None,
            zone_id: None,
        }
    }

    /// Attaches the local role.
    #[must_use]
    pub fn with_local_role(mut self, role: LocalRole) -> Self {
        self.local_role = Some(role);
        self
    }

    /// Attaches the remote address string.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Attaches the device identity.
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Attaches the caller zone identity.
    #[must_use]
    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }
}

/// Raw transport frame observation.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameEvent {
    pub frame_len: u32,
    /// Leading bytes of the frame, when capture is enabled.
    #[serde_as(as = "Option<Hex>")]
    pub payload_preview: Option<Vec<u8>>,
}

/// One decoded protocol message.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEvent {
    pub message_id: u32,
    pub operation: Option<String>,
    pub endpoint: Option<u8>,
    pub feature: Option<u16>,
    pub status: Option<u8>,
    pub payload_len: Option<u32>,
}

/// A component state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChangeEvent {
    pub subject: String,
    pub from: String,
    pub to: String,
}

/// A control-plane message outside the request/response flow.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlMsgEvent {
    pub kind: String,
    pub detail: Option<String>,
}

/// An error observation.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEventData {
    pub code: Option<u16>,
    pub message: String,
}

/// A capability-model summary taken at connection establishment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilitySnapshotEvent {
    pub endpoint_count: u16,
    pub feature_count: u16,
}

/// Typed event payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Frame(FrameEvent),
    Message(MessageEvent),
    StateChange(StateChangeEvent),
    ControlMsg(ControlMsgEvent),
    Error(ErrorEventData),
    CapabilitySnapshot(CapabilitySnapshotEvent),
    /// A record kind this decoder does not know; newer producers keep
    /// working against older readers.
    Unknown { kind: u8 },
}

impl EventBody {
    /// Returns the category this body classifies under.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            EventBody::Frame(_) | EventBody::Message(_) => Category::Message,
            EventBody::ControlMsg(_) => Category::Control,
            EventBody::StateChange(_) => Category::State,
            EventBody::Error(_) => Category::Error,
            EventBody::CapabilitySnapshot(_) => Category::Snapshot,
            EventBody::Unknown { .. } => Category::Control,
        }
    }

    /// Returns the stable type label used in exports.
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            EventBody::Frame(_) => "frame",
            EventBody::Message(_) => "message",
            EventBody::StateChange(_) => "state_change",
            EventBody::ControlMsg(_) => "control_msg",
            EventBody::Error(_) => "error",
            EventBody::CapabilitySnapshot(_) => "capability_snapshot",
            EventBody::Unknown { .. } => "unknown",
        }
    }
}

/// One protocol-log record: common header plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(flatten)]
    pub body: EventBody,
}

impl LogEvent {
    /// Creates an event; the header category follows the body.
    #[must_use]
    pub fn new(mut header: EventHeader, body: EventBody) -> Self {
        header.category = body.category();
        Self { header, body }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn header_category_follows_the_body() {
        let event = LogEvent::new(
            EventHeader::new("conn-1", Direction::In, Layer::Wire, Category::Message),
            EventBody::Error(ErrorEventData {
                code: Some(2),
                message: "limit exceeds device capacity".into(),
            }),
        );
        assert_eq!(Category::Error, event.header.category);
    }

    #[test]
    fn jsonl_shape_flattens_header_and_body() {
        let event = LogEvent::new(
            EventHeader::new("conn-1", Direction::Out, Layer::Service, Category::Message)
                .with_device_id("mash-evse-01"),
            EventBody::Message(MessageEvent {
                message_id: 7,
                operation: Some("invoke".into()),
                endpoint: Some(1),
                feature: Some(4),
                status: Some(0),
                payload_len: None,
            }),
        );

        let json = serde_json::to_value(&event).expect("event should serialise");
        assert_eq!("conn-1", json["connection_id"]);
        assert_eq!("out", json["direction"]);
        assert_eq!("message", json["type"]);
        assert_eq!(7, json["message_id"]);
        assert_eq!("mash-evse-01", json["device_id"]);
    }
}
