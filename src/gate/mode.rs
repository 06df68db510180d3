use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use super::attempts::AttemptHistory;
use super::clock::Timestamp;
use crate::error::StoreError;

/// Current gate state version
const STATE_VERSION: &str = "1.0";

/// Privilege level of the running application
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Child mode
    #[default]
    #[serde(rename = "child")]
    Restricted,
    /// Parent console
    #[serde(rename = "adult")]
    Unrestricted,
}

impl Mode {
    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Restricted => "Child Mode",
            Mode::Unrestricted => "Parent Console",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Durable gate state: committed mode, attempt history and parent activity
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PersistedGateState {
    pub version: String,
    pub mode: Mode,
    #[serde(default)]
    pub history: AttemptHistory,

    /// Last parent console activity, for the idle relock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<Timestamp>,

    pub updated_at: Timestamp,
}

impl PersistedGateState {
    pub fn new(mode: Mode, history: AttemptHistory) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            mode,
            history,
            last_activity_at: None,
            updated_at: Local::now(),
        }
    }

    pub fn with_last_activity(mut self, at: Timestamp) -> Self {
        self.last_activity_at = Some(at);
        self
    }
}

impl Default for PersistedGateState {
    fn default() -> Self {
        Self::new(Mode::Restricted, AttemptHistory::default())
    }
}

/// Persistence for gate state
///
/// `load` returns `Ok(None)` when nothing has been stored yet.
pub trait GateStateStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedGateState>, StoreError>;
    fn save(&self, state: &PersistedGateState) -> Result<(), StoreError>;
}

/// Gate state kept as a JSON file
#[derive(Debug, Clone)]
pub struct FileGateStateStore {
    path: PathBuf,
}

impl FileGateStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GateStateStore for FileGateStateStore {
    fn load(&self) -> Result<Option<PersistedGateState>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let state: PersistedGateState = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e)))?;

        if state.version != STATE_VERSION {
            warn!(
                "Gate state version mismatch (expected {}, got {}). Treating as new state.",
                STATE_VERSION, state.version
            );
            return Ok(None);
        }

        Ok(Some(state))
    }

    fn save(&self, state: &PersistedGateState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        crate::platform::atomic_write(&self.path, content.as_bytes())
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }
}

/// In-process gate state store
#[derive(Debug, Default)]
pub struct MemoryGateStateStore {
    state: Mutex<Option<PersistedGateState>>,
}

impl MemoryGateStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds `state`
    pub fn with_state(state: PersistedGateState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl GateStateStore for MemoryGateStateStore {
    fn load(&self) -> Result<Option<PersistedGateState>, StoreError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))?
            .clone())
    }

    fn save(&self, state: &PersistedGateState) -> Result<(), StoreError> {
        *self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))? =
            Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[test]
    fn test_mode_serializes_as_child_and_adult() {
        assert_eq!(serde_json::to_string(&Mode::Restricted).unwrap(), "\"child\"");
        assert_eq!(serde_json::to_string(&Mode::Unrestricted).unwrap(), "\"adult\"");
        assert_eq!(Mode::default(), Mode::Restricted);
    }

    #[test]
    fn test_file_store_missing_is_none() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        let store = FileGateStateStore::new(temp_dir.path().join("gate-state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        let file = temp_dir.child("gate-state.json");
        let store = FileGateStateStore::new(file.path());

        let state = PersistedGateState::new(Mode::Unrestricted, AttemptHistory::default())
            .with_last_activity(Local::now());
        store.save(&state).unwrap();

        file.assert(predicate::path::exists());
        file.assert(predicate::str::contains("\"adult\""));
        file.assert(predicate::str::contains("last_activity_at"));
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn test_file_store_corrupt_is_error() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        let file = temp_dir.child("gate-state.json");
        file.write_str("{\"mode\": \"superuser\"").unwrap();

        let store = FileGateStateStore::new(file.path());
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_file_store_version_mismatch_is_none() {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        let file = temp_dir.child("gate-state.json");
        let mut state = PersistedGateState::default();
        state.version = "0.1".to_string();
        file.write_str(&serde_json::to_string(&state).unwrap()).unwrap();

        let store = FileGateStateStore::new(file.path());
        assert!(store.load().unwrap().is_none());
    }
}
