use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use bon::Builder;
use time::OffsetDateTime;
use tracing::trace;

use super::codec::{decode_event, CodecError};
use super::event::{Category, Direction, Layer, LogEvent};

/// Per-event predicate applied while streaming a log file.
///
/// All present fields must match; `time_start` is inclusive, `time_end`
/// exclusive.
#[derive(Debug, Clone, Default, Builder)]
pub struct EventFilter {
    #[builder(into)]
    pub connection_id: Option<String>,
    pub direction: Option<Direction>,
    pub layer: Option<Layer>,
    pub category: Option<Category>,
    pub time_start: Option<OffsetDateTime>,
    pub time_end: Option<OffsetDateTime>,
    #[builder(into)]
    pub device_id: Option<String>,
    #[builder(into)]
    pub zone_id: Option<String>,
}

impl EventFilter {
    /// Returns true when `event` passes every present predicate.
    #[must_use]
    pub fn matches(&self, event: &LogEvent) -> bool {
        let header = &event.header;
        if let Some(connection_id) = &self.connection_id
            && &header.connection_id != connection_id
        {
            return false;
        }
        if let Some(direction) = self.direction
            && header.direction != direction
        {
            return false;
        }
        if let Some(layer) = self.layer
            && header.layer != layer
        {
            return false;
        }
        if let Some(category) = self.category
            && header.category != category
        {
            return false;
        }
        if let Some(time_start) = self.time_start
            && header.timestamp < time_start
        {
            return false;
        }
        if let Some(time_end) = self.time_end
            && header.timestamp >= time_end
        {
            return false;
        }
        if let Some(device_id) = &self.device_id
            && header.device_id.as_ref() != Some(device_id)
        {
            return false;
        }
        if let Some(zone_id) = &self.zone_id
            && header.zone_id.as_ref() != Some(zone_id)
        {
            return false;
        }
        true
    }
}

/// Streaming protocol-log reader.
///
/// Iterates one event at a time; a truncated trailing record reads as end of
/// stream. The reader opens the file independently of any live writer and
/// tolerates concurrent appends.
pub struct ProtocolLogReader {
    reader: BufReader<File>,
    filter: Option<EventFilter>,
    exhausted: bool,
}

impl ProtocolLogReader {
    /// Opens a log file for reading.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            reader: BufReader::new(file),
            filter: None,
            exhausted: false,
        })
    }

    /// Attaches a filter evaluated per event.
    #[must_use]
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Reads the next matching event, or `None` at end of stream.
    pub fn next_event(&mut self) -> Option<LogEvent> {
        loop {
            if self.exhausted {
                return None;
            }
            let event = match decode_event(&mut self.reader) {
                Ok(event) => event,
                Err(CodecError::Malformed { detail }) => {
                    // A structurally broken record is skipped; later records
                    // may still be whole.
                    trace!(%detail, "skipping malformed log record");
                    continue;
                }
                Err(error) => {
                    trace!(%error, "log stream ended");
                    self.exhausted = true;
                    return None;
                }
            };
            match &self.filter {
                Some(filter) if !filter.matches(&event) => continue,
                _ => return Some(event),
            }
        }
    }
}

impl Iterator for ProtocolLogReader {
    type Item = LogEvent;

    fn next(&mut self) -> Option<LogEvent> {
        self.next_event()
    }
}
