use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::debug;

use super::state::PersistedState;

const STATE_FILE_NAME: &str = "device-state.bin";
const MAGIC: &[u8; 4] = b"MSH1";

/// Errors returned by the state store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed while reading or writing the state file")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("state file is corrupt: {detail}")]
    Corrupt { detail: String },
    #[error("failed to encode the state document")]
    Encode(#[from] serde_json::Error),
}

/// File-backed snapshot store: the certificate blob and the JSON state
/// document side by side, each length-framed and CRC32-guarded.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store over an explicit file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store in the platform state directory.
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(default_state_path())
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes both blobs atomically enough for a single-writer device.
    ///
    /// # Errors
    ///
    /// Returns `Io` for filesystem failures and `Encode` for serialisation
    /// failures.
    pub fn save(
        &self,
        certificates: &[u8],
        state: &PersistedState,
    ) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let document = serde_json::to_vec(state)?;
        let mut buffer = Vec::with_capacity(MAGIC.len() + certificates.len() + document.len() + 16);
        buffer.extend_from_slice(MAGIC);
        append_frame(&mut buffer, certificates);
        append_frame(&mut buffer, &document);
        fs::write(&self.path, buffer)?;
        debug!(path = %self.path.display(), zones = state.zones.len(), "device state saved");
        Ok(())
    }

    /// Loads both blobs, or `None` when no state was ever saved.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` for framing or checksum violations and `Io`/`Encode`
    /// for filesystem and JSON failures.
    pub fn load(&self) -> Result<Option<(Vec<u8>, PersistedState)>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let Some(rest) = bytes.strip_prefix(MAGIC) else {
            return Err(PersistenceError::Corrupt {
                detail: "bad magic".to_string(),
            });
        };

        let (certificates, rest) = read_frame(rest)?;
        let (document, rest) = read_frame(rest)?;
        if !rest.is_empty() {
            return Err(PersistenceError::Corrupt {
                detail: format!("{} trailing bytes", rest.len()),
            });
        }

        let state: PersistedState = serde_json::from_slice(&document)?;
        Ok(Some((certificates, state)))
    }

    /// Removes the state file; used by factory reset.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the file exists but cannot be removed.
    pub fn wipe(&self) -> Result<(), PersistenceError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn append_frame(buffer: &mut Vec<u8>, payload: &[u8]) {
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buffer.extend_from_slice(payload);
}

fn read_frame(bytes: &[u8]) -> Result<(Vec<u8>, &[u8]), PersistenceError> {
    if bytes.len() < 8 {
        return Err(PersistenceError::Corrupt {
            detail: "frame header truncated".to_string(),
        });
    }
    let len = u32::from_le_bytes(bytes[0..4].try_into().expect("slice length checked")) as usize;
    let expected_crc = u32::from_le_bytes(bytes[4..8].try_into().expect("slice length checked"));
    let rest = &bytes[8..];
    if rest.len() < len {
        return Err(PersistenceError::Corrupt {
            detail: "frame payload truncated".to_string(),
        });
    }
    let (payload, rest) = rest.split_at(len);
    if crc32fast::hash(payload) != expected_crc {
        return Err(PersistenceError::Corrupt {
            detail: "frame checksum mismatch".to_string(),
        });
    }
    Ok((payload.to_vec(), rest))
}

fn default_state_path() -> PathBuf {
    let project_dirs = ProjectDirs::from("io", "mash", "mashd");
    let Some(project_dirs) = project_dirs else {
        return std::env::temp_dir().join("mashd").join(STATE_FILE_NAME);
    };

    let root = project_dirs
        .state_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dirs.data_local_dir().to_path_buf());
    root.join(STATE_FILE_NAME)
}
