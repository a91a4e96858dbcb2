mod codec;
mod event;
mod export;
mod reader;
mod stats;
mod writer;

pub use self::codec::{decode_event, encode_event, encode_event_to_vec, CodecError};
pub use self::event::{
    CapabilitySnapshotEvent, Category, ControlMsgEvent, Direction, ErrorEventData, EventBody,
    EventHeader, FrameEvent, Layer, LocalRole, LogEvent, MessageEvent, StateChangeEvent,
};
pub use self::export::{write_csv, write_jsonl, ExportError, ExportFormat};
pub use self::reader::{EventFilter, ProtocolLogReader};
pub use self::stats::{ConnectionStats, LogStats};
pub use self::writer::ProtocolLogWriter;
