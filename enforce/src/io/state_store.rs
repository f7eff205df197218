//! Turn state storage keyed by session id.
//!
//! One JSON file per session under a flat directory (default
//! `<temp_dir>/gsd-enforce`). Writes go through a uniquely named temp file in
//! the same directory followed by an atomic rename, so readers never observe a
//! half-written record.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::fault::SystemFault;
use crate::core::state::TurnState;

/// Directory name under the system temp dir.
pub const STATE_DIR_NAME: &str = "gsd-enforce";

const MAX_KEY_CHARS: usize = 128;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {detail}")]
    Corrupt {
        session_id: String,
        path: PathBuf,
        detail: String,
    },

    #[error("serialize turn state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<StoreError> for SystemFault {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt {
                session_id, detail, ..
            } => SystemFault::StateCorrupt { session_id, detail },
            other => SystemFault::Storage(other.to_string()),
        }
    }
}

/// Durable key-value storage for turn records.
pub trait StateStore {
    /// Stored record, or `None` when the session has none.
    fn read(&self, session_id: &str) -> Result<Option<TurnState>, StoreError>;
    /// Replace the session's record atomically.
    fn write(&self, session_id: &str, state: &TurnState) -> Result<(), StoreError>;
    /// Remove the session's record. Absence is not an error.
    fn clear(&self, session_id: &str) -> Result<(), StoreError>;
}

/// File-backed store: `<dir>/<sanitized-session>.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Process-wide default location under the system temp dir.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join(STATE_DIR_NAME)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_session_id(session_id)))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        create_private_dir(&self.dir).map_err(|source| StoreError::Io {
            action: "create state directory",
            path: self.dir.clone(),
            source,
        })
    }
}

impl StateStore for FileStateStore {
    fn read(&self, session_id: &str) -> Result<Option<TurnState>, StoreError> {
        let path = self.path_for(session_id);
        debug!(path = %path.display(), "loading turn state");
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read turn state",
                    path,
                    source,
                });
            }
        };
        let state = decode_record(session_id, &path, &contents)?;
        // Distinct ids can sanitize to the same file name.
        if state.session_id != session_id {
            debug!(stored = %state.session_id, "turn state belongs to another session");
            return Ok(None);
        }
        debug!(command = ?state.command, phase = ?state.phase(), "turn state loaded");
        Ok(Some(state))
    }

    fn write(&self, session_id: &str, state: &TurnState) -> Result<(), StoreError> {
        let path = self.path_for(session_id);
        debug!(path = %path.display(), command = ?state.command, phase = ?state.phase(), "writing turn state");
        let mut buf = serde_json::to_string_pretty(state)?;
        buf.push('\n');
        self.ensure_dir()?;
        write_atomic(&self.dir, &path, &buf)
    }

    fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(session_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "turn state cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                action: "remove turn state",
                path,
                source,
            }),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_.-]` so the id is a safe
/// single path component.
pub fn sanitize_session_id(session_id: &str) -> String {
    let sanitized: String = session_id
        .chars()
        .take(MAX_KEY_CHARS)
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() || sanitized.chars().all(|ch| ch == '.') {
        return format!("_{sanitized}");
    }
    sanitized
}

pub(crate) fn decode_record(
    session_id: &str,
    path: &Path,
    contents: &str,
) -> Result<TurnState, StoreError> {
    let corrupt = |detail: String| StoreError::Corrupt {
        session_id: session_id.to_string(),
        path: path.to_path_buf(),
        detail,
    };
    let value: Value =
        serde_json::from_str(contents).map_err(|err| corrupt(format!("invalid JSON: {err}")))?;
    if !value.is_object() {
        return Err(corrupt("record is not a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|err| corrupt(format!("unexpected shape: {err}")))
}

fn write_atomic(dir: &Path, path: &Path, contents: &str) -> Result<(), StoreError> {
    let io_err = |action: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source| StoreError::Io {
            action,
            path,
            source,
        }
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".turn-")
        .suffix(".json.tmp")
        .tempfile_in(dir)
        .map_err(io_err("create temp turn state in", dir))?;
    tmp.write_all(contents.as_bytes())
        .map_err(io_err("write temp turn state", tmp.path()))?;
    tmp.as_file()
        .sync_all()
        .map_err(io_err("sync temp turn state", path))?;
    tmp.persist(path)
        .map_err(|err| io_err("replace turn state", path)(err.error))?;
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}
