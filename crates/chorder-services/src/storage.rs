//! Local key-value persistence for progressions

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chorder_core::{export_json, import_json, ChorderError, Progression};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_NAMESPACE: &str = "chorder.progression.";
/// Lives outside any namespace, so user keys never collide with it
const PROBE_KEY: &str = "__chorder_probe__";
const PROBE_VALUE: &str = "probe";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Local storage unavailable: {0}")]
    Unavailable(String),
    #[error("Key '{0}' is reserved")]
    ReservedKey(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Document(#[from] ChorderError),
}

/// Raw string storage behind a [`ProgressionStore`]
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// File store
// ============================================================================

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data_dir>/chorder`, or `./chorder` without a data dir
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chorder")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write
    pub fn read_only() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            read_only: true,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .lock()
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.values
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::Unavailable("store is read-only".into()));
        }
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ============================================================================
// Progression store
// ============================================================================

/// Namespaced progression documents on top of a [`KeyValueStore`]
pub struct ProgressionStore<S: KeyValueStore> {
    backend: S,
    namespace: String,
}

impl<S: KeyValueStore> ProgressionStore<S> {
    pub fn new(backend: S) -> Self {
        Self::with_namespace(backend, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(backend: S, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    fn key(&self, key: &str) -> Result<String, StorageError> {
        let full = format!("{}{key}", self.namespace);
        if full == PROBE_KEY {
            return Err(StorageError::ReservedKey(key.to_string()));
        }
        Ok(full)
    }

    /// Write, read back and delete a probe value
    pub fn is_available(&self) -> bool {
        let ok = self.backend.put(PROBE_KEY, PROBE_VALUE).is_ok()
            && matches!(self.backend.get(PROBE_KEY), Ok(Some(v)) if v == PROBE_VALUE);
        let _ = self.backend.remove(PROBE_KEY);
        ok
    }

    /// Save `progression` under `key`.
    ///
    /// When the probe fails the save is abandoned and reported as
    /// [`StorageError::Unavailable`]; nothing is written.
    pub fn save(&self, key: &str, progression: &Progression) -> Result<(), StorageError> {
        let full = self.key(key)?;
        if !self.is_available() {
            warn!(key, "Local storage not writable, save abandoned");
            return Err(StorageError::Unavailable(format!("cannot save '{key}'")));
        }
        let text = export_json(progression)?;
        self.backend.put(&full, &text)?;
        info!(key, rows = progression.rows().len(), "Saved progression");
        Ok(())
    }

    pub fn load(&self, key: &str) -> Result<Option<Progression>, StorageError> {
        let Some(text) = self.backend.get(&self.key(key)?)? else {
            debug!(key, "No saved progression");
            return Ok(None);
        };
        Ok(Some(import_json(&text)?))
    }

    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(&self.key(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorder_core::{ChordSymbol, EntryContent};

    fn progression() -> Progression {
        let p = Progression::default();
        let row = p.rows()[0].id;
        p.add_entry(row, "Am7", EntryContent::chord(ChordSymbol::parse("Am7").unwrap(), 3))
            .unwrap()
    }

    #[test]
    fn test_memory_round_trip() {
        let store = ProgressionStore::new(MemoryStore::new());
        let p = progression();
        store.save("song", &p).unwrap();
        assert_eq!(store.backend().keys(), vec!["chorder.progression.song"]);
        let loaded = store.load("song").unwrap().unwrap();
        assert_eq!(loaded.rows(), p.rows());

        store.delete("song").unwrap();
        assert!(store.load("song").unwrap().is_none());
    }

    #[test]
    fn test_probe_leaves_nothing_behind() {
        let store = ProgressionStore::new(MemoryStore::new());
        assert!(store.is_available());
        assert!(store.backend().keys().is_empty());
    }

    #[test]
    fn test_reserved_key_keeps_user_documents() {
        let store = ProgressionStore::new(MemoryStore::new());
        store.save("__probe__", &progression()).unwrap();
        store.save("other", &progression()).unwrap();
        assert!(store.load("__probe__").unwrap().is_some());

        let bare = ProgressionStore::with_namespace(MemoryStore::new(), "");
        assert!(matches!(
            bare.save(PROBE_KEY, &progression()),
            Err(StorageError::ReservedKey(_))
        ));
        assert!(matches!(bare.load(PROBE_KEY), Err(StorageError::ReservedKey(_))));
        assert!(bare.backend().keys().is_empty());
    }

    #[test]
    fn test_unavailable_save_is_abandoned() {
        let store = ProgressionStore::new(MemoryStore::read_only());
        assert!(!store.is_available());
        assert!(matches!(
            store.save("song", &progression()),
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.load("song").unwrap().is_none());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressionStore::new(FileStore::new(dir.path().join("nested")));
        let p = progression();
        store.save("my song/1", &p).unwrap();

        let file = dir.path().join("nested").join("chorder.progression.my_song_1.json");
        assert!(file.exists());
        assert_eq!(store.load("my song/1").unwrap().unwrap().rows(), p.rows());

        store.delete("my song/1").unwrap();
        assert!(!file.exists());
        // deleting twice is fine
        store.delete("my song/1").unwrap();
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_document() {
        let backend = MemoryStore::new();
        backend.put("chorder.progression.bad", "{ nope").unwrap();
        let store = ProgressionStore::new(backend);
        assert!(matches!(
            store.load("bad"),
            Err(StorageError::Document(ChorderError::Format(_)))
        ));
    }
}
