//! Durable snapshots of the vector index.
//!
//! A snapshot is a JSON document holding the exported [`VectorIndexState`].
//! Writes go to a sibling temporary file that is synced and then renamed over
//! the previous snapshot, so readers only ever see a complete file.

use crate::vector_index::{IndexError, VectorIndex, VectorIndexState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    state: VectorIndexState,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically write `index` to `path`.
pub fn save_snapshot(path: &Path, index: &VectorIndex) -> Result<(), IndexError> {
    write_state(path, index.export_state())
}

/// Atomically write an exported index state to `path`.
///
/// Blocking; async callers run it on the blocking pool.
pub fn write_state(path: &Path, state: VectorIndexState) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let vectors = state.id_to_position.len();
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        state,
    };

    let bytes = serde_json::to_vec(&snapshot)
        .map_err(|e| IndexError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    tracing::debug!(
        "Saved index snapshot to {:?} ({} vectors, {} bytes)",
        path,
        vectors,
        bytes.len()
    );
    Ok(())
}

/// Load a snapshot, or `Ok(None)` when none has been written yet.
///
/// Unparseable or structurally invalid files are a
/// [`IndexError::CorruptSnapshot`]; a snapshot built for a different
/// dimension is a [`IndexError::DimensionMismatch`].
pub fn load_snapshot(path: &Path, dimension: usize) -> Result<Option<VectorIndex>, IndexError> {
    if !path.exists() {
        tracing::debug!("No index snapshot at {:?}", path);
        return Ok(None);
    }

    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|e| IndexError::CorruptSnapshot(format!("{:?}: {}", path, e)))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(IndexError::CorruptSnapshot(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    if snapshot.state.dimension != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: snapshot.state.dimension,
        });
    }

    let index = VectorIndex::from_state(snapshot.state)?;

    tracing::info!(
        "Loaded index snapshot from {:?} ({} vectors, saved {})",
        path,
        index.size(),
        snapshot.saved_at.to_rfc3339()
    );
    Ok(Some(index))
}
