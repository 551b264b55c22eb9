//! Persistence for the vector index state.
//!
//! A snapshot is a versioned JSON document holding the ordered chunk list
//! and the matching vector list. Writes go to a sibling temp file which is
//! then renamed over the target, so a crash mid-write never leaves a
//! truncated snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::vector_index::{check_shape, IndexState};

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = ".ace/index.json";

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Errors raised while reading or writing snapshots.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    #[serde(flatten)]
    state: &'a IndexState,
}

#[derive(Deserialize)]
struct SnapshotOwned {
    format_version: u32,
    #[serde(flatten)]
    state: IndexState,
}

/// Encode an index state as a snapshot blob.
pub fn encode(state: &IndexState) -> Result<Vec<u8>, SnapshotError> {
    let snapshot = SnapshotRef {
        format_version: SNAPSHOT_FORMAT_VERSION,
        state,
    };
    serde_json::to_vec(&snapshot).map_err(SnapshotError::Serialize)
}

/// Decode a snapshot blob, validating its version and shape.
pub fn decode(bytes: &[u8]) -> Result<IndexState, SnapshotError> {
    let snapshot: SnapshotOwned =
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::Corrupt(e.to_string()))?;

    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(SnapshotError::Corrupt(format!(
            "unsupported format version {} (expected {})",
            snapshot.format_version, SNAPSHOT_FORMAT_VERSION
        )));
    }

    let state = snapshot.state;
    check_shape(state.chunks.len(), &state.vectors).map_err(SnapshotError::Corrupt)?;
    Ok(state)
}

/// File-backed snapshot location.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the state to disk, replacing any previous snapshot.
    pub fn save(&self, state: &IndexState) -> Result<(), SnapshotError> {
        self.write(&encode(state)?)
    }

    /// Write an already encoded snapshot, replacing any previous one.
    pub fn write(&self, bytes: &[u8]) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SnapshotError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).map_err(|source| SnapshotError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = ?self.path, bytes = bytes.len(), "Snapshot written");
        Ok(())
    }

    /// Read the snapshot, returning `None` when no snapshot exists yet.
    pub fn load(&self) -> Result<Option<IndexState>, SnapshotError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        decode(&bytes).map(Some)
    }
}
