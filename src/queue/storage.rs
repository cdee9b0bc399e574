//! Snapshot storage for guild queue state
//!
//! Queue state lives in memory; a `StateStore` lets the service write the
//! full set of guild snapshots out periodically and load it back on start.

use crate::error::{Result, ServiceFailure};
use crate::queue::state::GuildSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// Everything written by one save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    pub saved_at: DateTime<Utc>,
    pub guilds: Vec<GuildSnapshot>,
}

/// Trait for snapshot persistence
pub trait StateStore: Send + Sync {
    /// Load the last saved snapshots, or nothing if none were saved yet
    fn load(&self) -> Result<Vec<GuildSnapshot>>;

    /// Replace the stored snapshots
    fn save(&self, guilds: &[GuildSnapshot]) -> Result<()>;
}

/// Store that keeps the last save in memory (tests and dry runs)
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    state: RwLock<Option<StoredState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.as_ref().map(|s| s.saved_at))
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<Vec<GuildSnapshot>> {
        let state = self.state.read().map_err(|_| ServiceFailure::StorageError {
            message: "Failed to acquire state read lock".to_string(),
        })?;
        Ok(state
            .as_ref()
            .map(|stored| stored.guilds.clone())
            .unwrap_or_default())
    }

    fn save(&self, guilds: &[GuildSnapshot]) -> Result<()> {
        let mut state = self.state.write().map_err(|_| ServiceFailure::StorageError {
            message: "Failed to acquire state write lock".to_string(),
        })?;
        *state = Some(StoredState {
            saved_at: Utc::now(),
            guilds: guilds.to_vec(),
        });
        Ok(())
    }
}

/// Store writing pretty JSON to a single file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Vec<GuildSnapshot>> {
        if !self.path.exists() {
            debug!("No state file at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| ServiceFailure::StorageError {
            message: format!("Failed to read {}: {}", self.path.display(), e),
        })?;
        let stored: StoredState =
            serde_json::from_str(&content).map_err(|e| ServiceFailure::StorageError {
                message: format!("Failed to parse {}: {}", self.path.display(), e),
            })?;

        info!(
            "Loaded {} guild snapshots saved at {}",
            stored.guilds.len(),
            stored.saved_at
        );
        Ok(stored.guilds)
    }

    fn save(&self, guilds: &[GuildSnapshot]) -> Result<()> {
        let stored = StoredState {
            saved_at: Utc::now(),
            guilds: guilds.to_vec(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        // Write next to the target and rename so a crash never leaves half a file
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content).map_err(|e| ServiceFailure::StorageError {
            message: format!("Failed to write {}: {}", staging.display(), e),
        })?;
        fs::rename(&staging, &self.path).map_err(|e| ServiceFailure::StorageError {
            message: format!("Failed to replace {}: {}", self.path.display(), e),
        })?;

        debug!(
            "Saved {} guild snapshots to {}",
            guilds.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::state::GuildQueueState;
    use crate::types::Participant;
    use tokio_test::{assert_err, assert_ok};

    fn sample_snapshots() -> Vec<GuildSnapshot> {
        let mut state = GuildQueueState::new(3, 4);
        state.join(Participant::new(20, "tom")).unwrap();
        state.join(Participant::new(10, "isabelle")).unwrap();
        state
            .claim(&Participant::new(20, "tom"), Some("B4nk5"), 1)
            .unwrap();
        vec![state.snapshot(), GuildQueueState::new(4, 10).snapshot()]
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryStateStore::new();
        assert!(store.load().unwrap().is_empty());
        assert!(store.saved_at().is_none());

        let snapshots = sample_snapshots();
        store.save(&snapshots).unwrap();
        assert_eq!(store.load().unwrap(), snapshots);
        assert!(store.saved_at().is_some());
    }

    #[test]
    fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("queues.json"));
        assert!(store.load().unwrap().is_empty());

        let snapshots = sample_snapshots();
        store.save(&snapshots).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, snapshots);
        assert_eq!(
            loaded[0].roster.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![20, 10]
        );
        assert!(!dir.path().join("queues.json.tmp").exists());
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queues.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(path);
        assert_err!(store.load());

        // A later save replaces the corrupt file
        assert_ok!(store.save(&sample_snapshots()));
        assert_eq!(assert_ok!(store.load()).len(), 2);
    }
}
