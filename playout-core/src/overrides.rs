use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("failed to read override file {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse override file {path}: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
}

const DISARMED: i64 = 0;

/// Armed flag and target playlist id packed into one word so the
/// signal task and the loop never observe a torn pair. Playlist ids
/// are sqlite rowids, always positive; zero means disarmed.
#[derive(Debug, Default)]
pub struct OverrideCell(AtomicI64);

impl OverrideCell {
    pub fn new() -> Self {
        Self(AtomicI64::new(DISARMED))
    }

    /// Arms the override. Returns true on a disarmed-to-armed
    /// transition so the caller can count it.
    pub fn arm(&self, playlist_id: i64) -> bool {
        debug_assert!(playlist_id > 0);
        self.0.swap(playlist_id, Ordering::SeqCst) == DISARMED
    }

    /// Returns true when the cell was armed before clearing.
    pub fn clear(&self) -> bool {
        self.0.swap(DISARMED, Ordering::SeqCst) != DISARMED
    }

    pub fn target(&self) -> Option<i64> {
        match self.0.load(Ordering::SeqCst) {
            DISARMED => None,
            playlist_id => Some(playlist_id),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.target().is_some()
    }
}

/// Externally edited flag file. `armed: false` explicitly clears the
/// override; a missing file expresses no opinion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideFile {
    pub armed: bool,
    #[serde(default)]
    pub playlist_id: Option<i64>,
}

/// Tracks operator-triggered preemption of schedule resolution. Both
/// triggers (SIGUSR1 and the flag file) are untrusted, best-effort
/// inputs polled without ordering assumptions relative to loop cycles.
#[derive(Debug)]
pub struct OverrideController {
    cell: Arc<OverrideCell>,
    file: PathBuf,
    default_playlist: Option<i64>,
}

impl OverrideController {
    pub fn new(cell: Arc<OverrideCell>, file: PathBuf, default_playlist: Option<i64>) -> Self {
        Self {
            cell,
            file,
            default_playlist,
        }
    }

    pub fn cell(&self) -> Arc<OverrideCell> {
        Arc::clone(&self.cell)
    }

    pub fn target(&self) -> Option<i64> {
        self.cell.target()
    }

    /// Reads the flag file once per loop cycle. Malformed content is
    /// an error for the caller to log; the previous armed state is
    /// retained either way.
    pub fn poll_file(&self) -> Result<(), OverrideError> {
        if !self.file.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.file).map_err(|source| OverrideError::Io {
            source,
            path: self.file.clone(),
        })?;
        let parsed: OverrideFile =
            serde_json::from_str(&content).map_err(|source| OverrideError::Parse {
                source,
                path: self.file.clone(),
            })?;
        if parsed.armed {
            match parsed.playlist_id.or(self.default_playlist) {
                Some(playlist_id) => {
                    if self.cell.arm(playlist_id) {
                        info!(playlist_id, "emergency override armed via flag file");
                    }
                }
                None => warn!("override file armed without a playlist id, ignoring"),
            }
        } else if self.cell.clear() {
            info!("emergency override cleared via flag file");
        }
        Ok(())
    }
}

/// Arms the override cell whenever SIGUSR1 arrives. The handler only
/// writes the flag; all business logic stays in the loop.
#[cfg(unix)]
pub fn spawn_signal_watcher(
    cell: Arc<OverrideCell>,
    default_playlist: Option<i64>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    Ok(tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            match default_playlist {
                Some(playlist_id) => {
                    if cell.arm(playlist_id) {
                        warn!(playlist_id, "emergency override armed via SIGUSR1");
                    }
                }
                None => warn!("SIGUSR1 received but no override playlist configured"),
            }
        }
    }))
}
