//! Loading and saving the state file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pingwatch_types::PersistedState;
use tracing::{debug, info, warn};

use crate::error::{PingwatchError, Result};

/// The JSON file holding aggregates, gaps and counters between runs.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Create a handle for the state file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file.
    ///
    /// A missing file is a fresh start. A file that cannot be decoded or was
    /// written by an incompatible version is logged and ignored.
    pub fn load(&self) -> PersistedState {
        match self.read() {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!(path = %self.path.display(), "no state file, starting fresh");
                PersistedState::default()
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable state file");
                PersistedState::default()
            }
        }
    }

    /// Read and decode the file; `Ok(None)` when there is nothing to restore.
    pub fn read(&self) -> Result<Option<PersistedState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.read_error(format!("read error: {}", e))),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let state: PersistedState = serde_json::from_str(&content)
            .map_err(|e| self.read_error(format!("parse error: {}", e)))?;
        if !state.version.is_compatible() {
            return Err(self.read_error(format!("unsupported version {}", state.version)));
        }
        Ok(Some(state))
    }

    /// Write `state`, replacing the previous file atomically.
    ///
    /// The document goes to a sibling temporary file first and is renamed
    /// over the target, so a crash mid-write leaves the old file intact.
    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| self.write_error(source))?;
        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.write_error(source));
        }

        debug!(path = %self.path.display(), bytes = json.len(), "state saved");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_error(&self, reason: String) -> PingwatchError {
        PingwatchError::PersistenceRead {
            path: self.path.clone(),
            reason,
        }
    }

    fn write_error(&self, source: std::io::Error) -> PingwatchError {
        PingwatchError::PersistenceWrite {
            path: self.path.clone(),
            source,
        }
    }
}
