use std::io::Write;

use strum_macros::Display as StrumDisplay;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::event::{EventBody, LogEvent};

/// Fixed CSV column order.
const CSV_HEADER: &str =
    "timestamp,connection_id,direction,layer,category,device_id,zone_id,type,message_id";

/// Timestamp format used by the CSV export: UTC with microsecond precision.
const CSV_TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// Supported export encodings.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum ExportFormat {
    /// One JSON object per line.
    #[strum(to_string = "jsonl")]
    Jsonl,
    /// Fixed-column CSV.
    #[strum(to_string = "csv")]
    Csv,
}

/// Errors returned by export writers.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export output")]
    Io(#[from] std::io::Error),
    #[error("failed to serialise event")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to format timestamp")]
    Timestamp(#[from] time::error::Format),
}

/// Writes events as JSON lines; returns the number of exported events.
///
/// # Errors
///
/// Returns an error when serialisation or the underlying write fails.
pub fn write_jsonl(
    events: impl IntoIterator<Item = LogEvent>,
    out: &mut impl Write,
) -> Result<u64, ExportError> {
    let mut exported = 0;
    for event in events {
        serde_json::to_writer(&mut *out, &event)?;
        out.write_all(b"\n")?;
        exported += 1;
    }
    Ok(exported)
}

/// Writes events as CSV with the fixed column header; returns the number of
/// exported events.
///
/// # Errors
///
/// Returns an error when timestamp formatting or the underlying write fails.
pub fn write_csv(
    events: impl IntoIterator<Item = LogEvent>,
    out: &mut impl Write,
) -> Result<u64, ExportError> {
    writeln!(out, "{CSV_HEADER}")?;
    let mut exported = 0;
    for event in events {
        let header = &event.header;
        let timestamp = header.timestamp.format(&CSV_TIMESTAMP)?;
        let message_id = match &event.body {
            EventBody::Message(message) => message.message_id.to_string(),
            _ => String::new(),
        };
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            timestamp,
            csv_field(&header.connection_id),
            header.direction,
            header.layer,
            header.category,
            csv_field(header.device_id.as_deref().unwrap_or_default()),
            csv_field(header.zone_id.as_deref().unwrap_or_default()),
            event.body.type_label(),
            message_id,
        )?;
        exported += 1;
    }
    Ok(exported)
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::super::event::{
        Category, Direction, EventHeader, Layer, MessageEvent, StateChangeEvent,
    };
    use super::*;

    fn sample_events() -> Vec<LogEvent> {
        let mut first =
            EventHeader::new("conn-1", Direction::In, Layer::Wire, Category::Message)
                .with_device_id("mash-evse-01")
                .with_zone_id("zone-grid");
        first.timestamp = datetime!(2026-03-01 12:30:45.123456 UTC);
        let mut second =
            EventHeader::new("conn-1", Direction::Out, Layer::Service, Category::State);
        second.timestamp = datetime!(2026-03-01 12:30:46 UTC);
        vec![
            LogEvent::new(
                first,
                EventBody::Message(MessageEvent {
                    message_id: 42,
                    operation: Some("invoke".into()),
                    endpoint: Some(1),
                    feature: Some(4),
                    status: Some(0),
                    payload_len: None,
                }),
            ),
            LogEvent::new(
                second,
                EventBody::StateChange(StateChangeEvent {
                    subject: "commissioning_window".into(),
                    from: "open".into(),
                    to: "closed".into(),
                }),
            ),
        ]
    }

    #[test]
    fn csv_export_uses_the_fixed_header_and_utc_timestamps() {
        let mut out = Vec::new();
        let exported = write_csv(sample_events(), &mut out).expect("CSV export should succeed");
        assert_eq!(2, exported);

        let rendered = String::from_utf8(out).expect("CSV output should be UTF-8");
        assert_snapshot!(rendered, @r"
        timestamp,connection_id,direction,layer,category,device_id,zone_id,type,message_id
        2026-03-01T12:30:45.123456Z,conn-1,in,wire,message,mash-evse-01,zone-grid,message,42
        2026-03-01T12:30:46.000000Z,conn-1,out,service,state,,,state_change,
        ");
    }

    #[test]
    fn jsonl_export_writes_one_object_per_line() {
        let mut out = Vec::new();
        let exported =
            write_jsonl(sample_events(), &mut out).expect("JSONL export should succeed");
        assert_eq!(2, exported);

        let rendered = String::from_utf8(out).expect("JSONL output should be UTF-8");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(2, lines.len());
        let first: serde_json::Value =
            serde_json::from_str(lines[0]).expect("each line should be a JSON object");
        assert_eq!("message", first["type"]);
        assert_eq!(42, first["message_id"]);
    }

    #[test]
    fn csv_fields_with_commas_are_quoted() {
        assert_eq!("plain", csv_field("plain"));
        assert_eq!("\"a,b\"", csv_field("a,b"));
        assert_eq!("\"say \"\"hi\"\"\"", csv_field("say \"hi\""));
    }
}
