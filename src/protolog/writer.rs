use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

use super::codec::encode_event;
use super::event::LogEvent;

/// Append-only protocol-log writer.
///
/// Single-writer by construction: every append serialises on one mutex.
/// Encoding failures are swallowed (the log must never take the application
/// down) and appends after [`ProtocolLogWriter::close`] are ignored.
pub struct ProtocolLogWriter {
    file: Mutex<Option<BufWriter<File>>>,
}

impl ProtocolLogWriter {
    /// Opens `path` for create+append.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Creates a writer that drops every event; used when logging is off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Appends one record; errors are logged and swallowed.
    pub fn append(&self, event: &LogEvent) {
        let mut file = self.file.lock().expect("protocol log mutex poisoned");
        let Some(writer) = file.as_mut() else {
            return;
        };
        if let Err(error) = encode_event(event, writer) {
            debug!(%error, "protocol log record dropped");
            return;
        }
        // Flush per record so readers and crash recovery see whole records.
        if let Err(error) = writer.flush() {
            debug!(%error, "protocol log flush failed");
        }
    }

    /// Flushes and closes the log; later appends are ignored.
    pub fn close(&self) {
        let mut file = self.file.lock().expect("protocol log mutex poisoned");
        if let Some(mut writer) = file.take()
            && let Err(error) = writer.flush()
        {
            debug!(%error, "protocol log close flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use pretty_assertions::assert_eq;

    use super::super::event::{Category, Direction, EventBody, EventHeader, Layer, StateChangeEvent};
    use super::super::reader::ProtocolLogReader;
    use super::*;

    fn unique_temp_path(file_name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("mash-{file_name}-{suffix}.binlog"))
    }

    fn state_change(connection_id: &str) -> LogEvent {
        LogEvent::new(
            EventHeader::new(connection_id, Direction::Out, Layer::Service, Category::State),
            EventBody::StateChange(StateChangeEvent {
                subject: "commissioning_window".into(),
                from: "closed".into(),
                to: "open".into(),
            }),
        )
    }

    #[test]
    fn appends_after_close_are_ignored() {
        let path = unique_temp_path("writer-close");
        let writer = ProtocolLogWriter::open(&path).expect("log file should open");

        writer.append(&state_change("conn-1"));
        writer.close();
        writer.append(&state_change("conn-2"));

        let reader = ProtocolLogReader::open(&path).expect("log file should reopen");
        let events: Vec<LogEvent> = reader.collect();
        assert_eq!(1, events.len());
        assert_eq!("conn-1", events[0].header.connection_id);

        std::fs::remove_file(&path).expect("temp log should remove");
    }

    #[test]
    fn disabled_writer_swallows_events() {
        let writer = ProtocolLogWriter::disabled();
        writer.append(&state_change("conn-1"));
        writer.close();
    }
}
