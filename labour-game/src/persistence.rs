//! Persistence gateway: snapshot encoding over a pluggable key-value store.
use std::collections::HashMap;
use std::convert::Infallible;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::state::GameState;

/// Trait for abstracting the durable key-value medium.
/// Platform-specific implementations should provide this
pub trait SnapshotStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a stored value, `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Remove a value. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be removed.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot storage failed: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("snapshot is malformed: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("snapshot could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

impl PersistenceError {
    fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}

/// Reads, writes, and erases the single game snapshot.
#[derive(Debug, Clone)]
pub struct PersistenceGateway<S> {
    store: S,
    key: String,
}

impl<S> PersistenceGateway<S>
where
    S: SnapshotStore,
{
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Load the snapshot. A missing snapshot is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails or the snapshot does not parse.
    pub fn load(&self) -> Result<Option<GameState>, PersistenceError> {
        let Some(raw) = self
            .store
            .read(&self.key)
            .map_err(PersistenceError::storage)?
        else {
            return Ok(None);
        };
        let mut state: GameState =
            serde_json::from_str(&raw).map_err(PersistenceError::Malformed)?;
        state.dedupe_unlocked();
        Ok(Some(state))
    }

    /// Write a copy of `state` stamped with `now_ms` as its save time.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn save(&self, state: &GameState, now_ms: i64) -> Result<(), PersistenceError> {
        let stamped = GameState {
            last_save_time: now_ms,
            ..state.clone()
        };
        let encoded = serde_json::to_string(&stamped).map_err(PersistenceError::Encode)?;
        self.store
            .write(&self.key, &encoded)
            .map_err(PersistenceError::storage)?;
        log::info!("Game state saved");
        Ok(())
    }

    /// Remove the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium refuses the removal.
    pub fn erase(&self) -> Result<(), PersistenceError> {
        self.store
            .remove(&self.key)
            .map_err(PersistenceError::storage)
    }
}

/// In-process store. Clones share the same map, which lets tests inspect
/// what a session wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw stored value, bypassing the gateway.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert a raw value, bypassing the gateway.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

impl SnapshotStore for MemoryStore {
    type Error = Infallible;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.insert_raw(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// One file per key under a directory. Writes go through a temporary file
/// and a rename so a crash never leaves a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl SnapshotStore for FileStore {
    type Error = std::io::Error;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
