//! Durable tracker snapshots.
//!
//! Reads are forgiving: anything short of a well-formed snapshot is treated as
//! "no snapshot". Writes go to a sibling temp file that is renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::tracker::TrackerState;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("failed to write tracker snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode tracker snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reads a snapshot, returning `None` when it is absent or unusable.
pub fn read_state(path: &Path) -> Option<TrackerState> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No tracker snapshot at {}, starting fresh", path.display());
            return None;
        }
        Err(e) => {
            warn!(
                "Cannot read tracker snapshot {}: {} - starting fresh",
                path.display(),
                e
            );
            return None;
        }
    };

    match serde_json::from_str::<TrackerState>(&content) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(
                "Ignoring malformed tracker snapshot {}: {} - starting fresh",
                path.display(),
                e
            );
            None
        }
    }
}

/// Writes a snapshot atomically (temp file, then rename).
pub fn write_state(path: &Path, state: &TrackerState) -> Result<(), TrackerError> {
    let io_err = |source: std::io::Error| TrackerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }

    let body = serde_json::to_vec(state)?;
    let tmp = temp_path(path);
    fs::write(&tmp, &body).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    debug!(
        "Persisted {} tracked processes to {} ({} bytes)",
        state.series.len(),
        path.display(),
        body.len()
    );
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
