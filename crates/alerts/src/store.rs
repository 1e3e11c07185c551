//! Crash-safe JSON session state storage.
//!
//! All symbols of one monitor group share a single file of the form
//! `{ "BTCUSDT": SessionState, ... }`. Every access goes through an async
//! mutex so load-modify-save cycles from different symbols never lose
//! each other's updates.

use pivotbot_core::SessionState;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-group session state file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State for `symbol`, or a fresh state when absent or invalid.
    pub async fn load(&self, symbol: &str) -> SessionState {
        self.get(symbol).await.unwrap_or_default()
    }

    /// Stored state for `symbol`, `None` when absent or invalid.
    pub async fn get(&self, symbol: &str) -> Option<SessionState> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await;
        let raw = entries.remove(symbol)?;
        validate_entry(symbol, raw)
    }

    /// Persist the state for `symbol`, keeping every other entry as is.
    pub async fn save(&self, symbol: &str, state: &SessionState) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await;
        entries.insert(symbol.to_string(), serde_json::to_value(state)?);
        self.write_atomic(&Value::Object(entries)).await
    }

    /// Read the whole file. Missing or unreadable files read as empty.
    async fn read_entries(&self) -> Map<String, Value> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read session state, starting empty"
                );
                return Map::new();
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    path = %self.path.display(),
                    "Session state file is not a JSON object, starting empty"
                );
                Map::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt session state file, starting empty"
                );
                Map::new()
            }
        }
    }

    /// Write and fsync `<file>.tmp`, then rename over the durable file.
    async fn write_atomic(&self, value: &Value) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        let tmp = tmp_path(&self.path);
        let bytes = serde_json::to_vec_pretty(value)?;
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err(&tmp))?;
        file.write_all(&bytes).await.map_err(io_err(&tmp))?;
        // data must be on disk before the rename makes it the durable copy
        file.sync_all().await.map_err(io_err(&tmp))?;
        drop(file);

        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io {
                path: self.path.clone(),
                source,
            });
        }

        debug!(path = %self.path.display(), "Session state saved");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Deserialize and sanity-check one entry. Invalid entries count as absent.
fn validate_entry(symbol: &str, raw: Value) -> Option<SessionState> {
    match serde_json::from_value::<SessionState>(raw) {
        Ok(state) if state.is_consistent() => Some(state),
        Ok(_) => {
            warn!(symbol, "Inconsistent session state, reinitialising");
            None
        }
        Err(e) => {
            warn!(symbol, error = %e, "Malformed session state, reinitialising");
            None
        }
    }
}
