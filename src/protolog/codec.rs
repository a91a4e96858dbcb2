use std::io;

use ciborium::value::{Integer, Value};
use thiserror::Error;
use time::OffsetDateTime;

use super::event::{
    CapabilitySnapshotEvent, Category, ControlMsgEvent, Direction, ErrorEventData, EventBody,
    EventHeader, FrameEvent, Layer, LocalRole, LogEvent, MessageEvent, StateChangeEvent,
};

// Header field tags. Tags are append-only; decoders skip unknown ones.
const TAG_TIMESTAMP_NS: u64 = 1;
const TAG_CONNECTION_ID: u64 = 2;
const TAG_DIRECTION: u64 = 3;
const TAG_LAYER: u64 = 4;
const TAG_CATEGORY: u64 = 5;
const TAG_LOCAL_ROLE: u64 = 6;
const TAG_REMOTE_ADDR: u64 = 7;
const TAG_DEVICE_ID: u64 = 8;
const TAG_ZONE_ID: u64 = 9;
const TAG_KIND: u64 = 10;
const TAG_BODY: u64 = 11;

const KIND_FRAME: u8 = 1;
const KIND_MESSAGE: u8 = 2;
const KIND_STATE_CHANGE: u8 = 3;
const KIND_CONTROL_MSG: u8 = 4;
const KIND_ERROR: u8 = 5;
const KIND_CAPABILITY_SNAPSHOT: u8 = 6;

/// Errors returned by the log record codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode log record: {detail}")]
    Encode { detail: String },
    #[error("failed to decode log record: {detail}")]
    Decode { detail: String },
    #[error("malformed log record: {detail}")]
    Malformed { detail: String },
}

/// Encodes one event as a self-delimited CBOR record.
///
/// The encoding is deterministic: integer-keyed map entries in ascending tag
/// order, absent optionals not encoded.
///
/// # Errors
///
/// Returns `Encode` when serialisation or the underlying write fails.
pub fn encode_event(event: &LogEvent, writer: &mut impl io::Write) -> Result<(), CodecError> {
    let bytes = encode_event_to_vec(event)?;
    writer.write_all(&bytes).map_err(|error| CodecError::Encode {
        detail: error.to_string(),
    })
}

/// Encodes one event into a byte vector.
///
/// # Errors
///
/// Returns `Encode` when serialisation fails.
pub fn encode_event_to_vec(event: &LogEvent) -> Result<Vec<u8>, CodecError> {
    let value = event_to_value(event);
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&value, &mut bytes).map_err(|error| CodecError::Encode {
        detail: error.to_string(),
    })?;
    Ok(bytes)
}

/// Decodes the next event from `reader`.
///
/// # Errors
///
/// Returns `Decode` when no further record can be read (end of stream or a
/// truncated tail) and `Malformed` for a record that parsed as CBOR but lacks
/// required fields.
pub fn decode_event(reader: &mut impl io::Read) -> Result<LogEvent, CodecError> {
    let value: Value =
        ciborium::de::from_reader(reader).map_err(|error| CodecError::Decode {
            detail: error.to_string(),
        })?;
    event_from_value(&value)
}

fn event_to_value(event: &LogEvent) -> Value {
    let header = &event.header;
    let timestamp_ns = header.timestamp.unix_timestamp_nanos();

    let mut entries: Vec<(Value, Value)> = Vec::new();
    entries.push((tag(TAG_TIMESTAMP_NS), Value::Integer(Integer::from(timestamp_ns as i64))));
    entries.push((tag(TAG_CONNECTION_ID), Value::Text(header.connection_id.clone())));
    entries.push((tag(TAG_DIRECTION), uint(direction_code(header.direction))));
    entries.push((tag(TAG_LAYER), uint(layer_code(header.layer))));
    entries.push((tag(TAG_CATEGORY), uint(category_code(header.category))));
    if let Some(role) = header.local_role {
        entries.push((tag(TAG_LOCAL_ROLE), uint(role_code(role))));
    }
    if let Some(addr) = &header.remote_addr {
        entries.push((tag(TAG_REMOTE_ADDR), Value::Text(addr.clone())));
    }
    if let Some(device_id) = &header.device_id {
        entries.push((tag(TAG_DEVICE_ID), Value::Text(device_id.clone())));
    }
    if let Some(zone_id) = &header.zone_id {
        entries.push((tag(TAG_ZONE_ID), Value::Text(zone_id.clone())));
    }
    entries.push((tag(TAG_KIND), uint(u64::from(body_kind(&event.body)))));
    entries.push((tag(TAG_BODY), body_to_value(&event.body)));

    Value::Map(entries)
}

fn body_kind(body: &EventBody) -> u8 {
    match body {
        EventBody::Frame(_) => KIND_FRAME,
        EventBody::Message(_) => KIND_MESSAGE,
        EventBody::StateChange(_) => KIND_STATE_CHANGE,
        EventBody::ControlMsg(_) => KIND_CONTROL_MSG,
        EventBody::Error(_) => KIND_ERROR,
        EventBody::CapabilitySnapshot(_) => KIND_CAPABILITY_SNAPSHOT,
        EventBody::Unknown { kind } => *kind,
    }
}

fn body_to_value(body: &EventBody) -> Value {
    let mut entries: Vec<(Value, Value)> = Vec::new();
    match body {
        EventBody::Frame(frame) => {
            entries.push((tag(1), uint(u64::from(frame.frame_len))));
            if let Some(preview) = &frame.payload_preview {
                entries.push((tag(2), Value::Bytes(preview.clone())));
            }
        }
        EventBody::Message(message) => {
            entries.push((tag(1), uint(u64::from(message.message_id))));
            if let Some(operation) = &message.operation {
                entries.push((tag(2), Value::Text(operation.clone())));
            }
            if let Some(endpoint) = message.endpoint {
                entries.push((tag(3), uint(u64::from(endpoint))));
            }
            if let Some(feature) = message.feature {
                entries.push((tag(4), uint(u64::from(feature))));
            }
            if let Some(status) = message.status {
                entries.push((tag(5), uint(u64::from(status))));
            }
            if let Some(payload_len) = message.payload_len {
                entries.push((tag(6), uint(u64::from(payload_len))));
            }
        }
        EventBody::StateChange(change) => {
            entries.push((tag(1), Value::Text(change.subject.clone())));
            entries.push((tag(2), Value::Text(change.from.clone())));
            entries.push((tag(3), Value::Text(change.to.clone())));
        }
        EventBody::ControlMsg(control) => {
            entries.push((tag(1), Value::Text(control.kind.clone())));
            if let Some(detail) = &control.detail {
                entries.push((tag(2), Value::Text(detail.clone())));
            }
        }
        EventBody::Error(error) => {
            if let Some(code) = error.code {
                entries.push((tag(1), uint(u64::from(code))));
            }
            entries.push((tag(2), Value::Text(error.message.clone())));
        }
        EventBody::CapabilitySnapshot(snapshot) => {
            entries.push((tag(1), uint(u64::from(snapshot.endpoint_count))));
            entries.push((tag(2), uint(u64::from(snapshot.feature_count))));
        }
        EventBody::Unknown { .. } => {}
    }
    Value::Map(entries)
}

fn event_from_value(value: &Value) -> Result<LogEvent, CodecError> {
    let Value::Map(entries) = value else {
        return Err(malformed("record is not a map"));
    };

    let mut timestamp_ns: Option<i64> = None;
    let mut connection_id: Option<String> = None;
    let mut direction: Option<Direction> = None;
    let mut layer: Option<Layer> = None;
    let mut category: Option<Category> = None;
    let mut local_role: Option<LocalRole> = None;
    let mut remote_addr: Option<String> = None;
    let mut device_id: Option<String> = None;
    let mut zone_id: Option<String> = None;
    let mut kind: Option<u8> = None;
    let mut body_value: Option<&Value> = None;

    for (key, entry) in entries {
        let Some(key) = as_u64(key) else { continue };
        match key {
            TAG_TIMESTAMP_NS => timestamp_ns = as_i64(entry),
            TAG_CONNECTION_ID => connection_id = as_text(entry),
            TAG_DIRECTION => direction = as_u64(entry).and_then(direction_from_code),
            TAG_LAYER => layer = as_u64(entry).and_then(layer_from_code),
            TAG_CATEGORY => category = as_u64(entry).and_then(category_from_code),
            TAG_LOCAL_ROLE => local_role = as_u64(entry).and_then(role_from_code),
            TAG_REMOTE_ADDR => remote_addr = as_text(entry),
            TAG_DEVICE_ID => device_id = as_text(entry),
            TAG_ZONE_ID => zone_id = as_text(entry),
            TAG_KIND => kind = as_u64(entry).and_then(|code| u8::try_from(code).ok()),
            TAG_BODY => body_value = Some(entry),
            // Unknown header tags from newer producers are skipped.
            _ => {}
        }
    }

    let timestamp_ns = timestamp_ns.ok_or_else(|| malformed("missing timestamp"))?;
    let timestamp = OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ns))
        .map_err(|_| malformed("timestamp out of range"))?;
    let header = EventHeader {
        timestamp,
        connection_id: connection_id.ok_or_else(|| malformed("missing connection id"))?,
        direction: direction.ok_or_else(|| malformed("missing direction"))?,
        layer: layer.ok_or_else(|| malformed("missing layer"))?,
        category: category.ok_or_else(|| malformed("missing category"))?,
        local_role,
        remote_addr,
        device_id,
        zone_id,
    };
    let kind = kind.ok_or_else(|| malformed("missing body kind"))?;
    let body = match body_value {
        Some(value) => body_from_value(kind, value)?,
        None => EventBody::Unknown { kind },
    };

    Ok(LogEvent { header, body })
}

fn body_from_value(kind: u8, value: &Value) -> Result<EventBody, CodecError> {
    let Value::Map(entries) = value else {
        return Err(malformed("body is not a map"));
    };
    let field = |tag_id: u64| {
        entries
            .iter()
            .find(|(key, _)| as_u64(key) == Some(tag_id))
            .map(|(_, entry)| entry)
    };

    let body = match kind {
        KIND_FRAME => EventBody::Frame(FrameEvent {
            frame_len: field(1)
                .and_then(as_u64)
                .and_then(|len| u32::try_from(len).ok())
                .ok_or_else(|| malformed("frame event missing length"))?,
            payload_preview: field(2).and_then(as_bytes),
        }),
        KIND_MESSAGE => EventBody::Message(MessageEvent {
            message_id: field(1)
                .and_then(as_u64)
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| malformed("message event missing id"))?,
            operation: field(2).and_then(as_text),
            endpoint: field(3).and_then(as_u64).and_then(|v| u8::try_from(v).ok()),
            feature: field(4).and_then(as_u64).and_then(|v| u16::try_from(v).ok()),
            status: field(5).and_then(as_u64).and_then(|v| u8::try_from(v).ok()),
            payload_len: field(6).and_then(as_u64).and_then(|v| u32::try_from(v).ok()),
        }),
        KIND_STATE_CHANGE => EventBody::StateChange(StateChangeEvent {
            subject: field(1)
                .and_then(as_text)
                .ok_or_else(|| malformed("state change missing subject"))?,
            from: field(2)
                .and_then(as_text)
                .ok_or_else(|| malformed("state change missing from"))?,
            to: field(3)
                .and_then(as_text)
                .ok_or_else(|| malformed("state change missing to"))?,
        }),
        KIND_CONTROL_MSG => EventBody::ControlMsg(ControlMsgEvent {
            kind: field(1)
                .and_then(as_text)
                .ok_or_else(|| malformed("control message missing kind"))?,
            detail: field(2).and_then(as_text),
        }),
        KIND_ERROR => EventBody::Error(ErrorEventData {
            code: field(1).and_then(as_u64).and_then(|v| u16::try_from(v).ok()),
            message: field(2)
                .and_then(as_text)
                .ok_or_else(|| malformed("error event missing message"))?,
        }),
        KIND_CAPABILITY_SNAPSHOT => EventBody::CapabilitySnapshot(CapabilitySnapshotEvent {
            endpoint_count: field(1)
                .and_then(as_u64)
                .and_then(|v| u16::try_from(v).ok())
                .ok_or_else(|| malformed("snapshot missing endpoint count"))?,
            feature_count: field(2)
                .and_then(as_u64)
                .and_then(|v| u16::try_from(v).ok())
                .ok_or_else(|| malformed("snapshot missing feature count"))?,
        }),
        unknown => EventBody::Unknown { kind: unknown },
    };
    Ok(body)
}

fn tag(tag_id: u64) -> Value {
    Value::Integer(Integer::from(tag_id))
}

fn uint(value: u64) -> Value {
    Value::Integer(Integer::from(value))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(integer) => u64::try_from(i128::from(*integer)).ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(integer) => i64::try_from(i128::from(*integer)).ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text.clone()),
        _ => None,
    }
}

fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Some(bytes.clone()),
        _ => None,
    }
}

fn direction_code(direction: Direction) -> u64 {
    match direction {
        Direction::In => 0,
        Direction::Out => 1,
    }
}

fn direction_from_code(code: u64) -> Option<Direction> {
    match code {
        0 => Some(Direction::In),
        1 => Some(Direction::Out),
        _ => None,
    }
}

fn layer_code(layer: Layer) -> u64 {
    match layer {
        Layer::Transport => 0,
        Layer::Wire => 1,
        Layer::Service => 2,
    }
}

fn layer_from_code(code: u64) -> Option<Layer> {
    match code {
        0 => Some(Layer::Transport),
        1 => Some(Layer::Wire),
        2 => Some(Layer::Service),
        _ => None,
    }
}

fn category_code(category: Category) -> u64 {
    match category {
        Category::Message => 0,
        Category::Control => 1,
        Category::State => 2,
        Category::Error => 3,
        Category::Snapshot => 4,
    }
}

fn category_from_code(code: u64) -> Option<Category> {
    match code {
        0 => Some(Category::Message),
        1 => Some(Category::Control),
        2 => Some(Category::State),
        3 => Some(Category::Error),
        4 => Some(Category::Snapshot),
        _ => None,
    }
}

fn role_code(role: LocalRole) -> u64 {
    match role {
        LocalRole::Device => 0,
        LocalRole::Controller => 1,
    }
}

fn role_from_code(code: u64) -> Option<LocalRole> {
    match code {
        0 => Some(LocalRole::Device),
        1 => Some(LocalRole::Controller),
        _ => None,
    }
}

fn malformed(detail: &str) -> CodecError {
    CodecError::Malformed {
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::*;

    fn sample_event() -> LogEvent {
        let mut header = EventHeader::new("conn-7", Direction::In, Layer::Wire, Category::Message)
            .with_local_role(LocalRole::Device)
            .with_remote_addr("192.0.2.10:5540")
            .with_device_id("mash-evse-01")
            .with_zone_id("zone-grid");
        header.timestamp = datetime!(2026-03-01 12:30:45.123456 UTC);
        LogEvent::new(
            header,
            EventBody::Message(MessageEvent {
                message_id: 42,
                operation: Some("invoke".into()),
                endpoint: Some(1),
                feature: Some(4),
                status: None,
                payload_len: Some(18),
            }),
        )
    }

    #[test]
    fn records_round_trip_on_every_field() {
        let event = sample_event();
        let bytes = encode_event_to_vec(&event).expect("event should encode");
        let decoded =
            decode_event(&mut bytes.as_slice()).expect("encoded record should decode");
        assert_eq!(event, decoded);
    }

    #[test]
    fn decoder_skips_unknown_header_tags() {
        let event = sample_event();
        let Value::Map(mut entries) = event_to_value(&event) else {
            panic!("encoded event should be a map");
        };
        entries.push((tag(99), Value::Text("from-a-newer-producer".into())));
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Value::Map(entries), &mut bytes)
            .expect("extended record should encode");

        let decoded =
            decode_event(&mut bytes.as_slice()).expect("extended record should decode");
        assert_eq!(event, decoded);
    }

    #[test]
    fn unknown_body_kinds_survive_decoding() {
        let mut event = sample_event();
        event.body = EventBody::Unknown { kind: 200 };
        event.header.category = Category::Control;

        let bytes = encode_event_to_vec(&event).expect("event should encode");
        let decoded =
            decode_event(&mut bytes.as_slice()).expect("unknown kind should decode");
        assert_matches!(decoded.body, EventBody::Unknown { kind: 200 });
    }

    #[test]
    fn truncated_records_fail_to_decode() {
        let bytes = encode_event_to_vec(&sample_event()).expect("event should encode");
        let truncated = &bytes[..bytes.len() / 2];
        let result = decode_event(&mut &truncated[..]);
        assert_matches!(result, Err(CodecError::Decode { .. }));
    }

    #[test]
    fn encoding_is_deterministic() {
        let event = sample_event();
        let first = encode_event_to_vec(&event).expect("event should encode");
        let second = encode_event_to_vec(&event).expect("event should encode");
        assert_eq!(first, second);
    }
}
