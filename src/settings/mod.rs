//! Durable key/value settings.
//!
//! Every component reads and writes its own keys through a shared
//! [`SettingsStore`]. Values are JSON so a single file can hold integers,
//! strings, timestamps and nested records alike.
//!
//! Each key has exactly one writing component (see [`keys`]); the store only
//! guarantees that individual reads and writes are atomic.

mod error;
pub mod keys;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub use error::SettingsError;

// ============================================================================
// SettingsStore
// ============================================================================

/// Process-wide durable key/value store.
pub trait SettingsStore: Send + Sync + fmt::Debug {
    /// Returns the stored value, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores a value and persists it.
    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;

    /// Removes a value and persists the removal.
    fn remove(&self, key: &str) -> Result<(), SettingsError>;
}

/// Typed helpers over any [`SettingsStore`].
pub trait SettingsExt {
    /// Reads and deserializes a value. Type mismatches are logged and treated
    /// as missing.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T>;

    /// Serializes and stores a value.
    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SettingsError>;
}

impl<S: SettingsStore + ?Sized> SettingsExt for S {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "Ignoring setting with unexpected type");
                None
            }
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SettingsError> {
        self.set(key, serde_json::to_value(value)?)
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Settings persisted as a single JSON object on disk.
///
/// Writes go to a sibling temp file which is then renamed over the target, so
/// a crash never leaves a truncated settings file.
///
/// Several processes may share the file (`flyt run` alongside one-shot CLI
/// commands). Each write re-reads the file and changes only its own key, so
/// keys written elsewhere since this store was opened are kept.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading existing values if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = read_file(&path)?;

        debug!(path = %path.display(), keys = values.len(), "Settings loaded");

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the file path backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to the latest on-disk contents and writes the result.
    /// Returns without writing when `change` reports nothing changed.
    fn update(
        &self,
        change: impl FnOnce(&mut Map<String, Value>) -> bool,
    ) -> Result<(), SettingsError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut latest = match read_file(&self.path) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Settings file unreadable; writing from memory");
                values.clone()
            }
        };
        let changed = change(&mut latest);
        *values = latest;
        if changed {
            self.persist(&values)?;
        }
        Ok(())
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.update(|values| {
            values.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.update(|values| values.remove(key).is_some())
    }
}

/// Reads the settings document. A missing or blank file is empty.
fn read_file(path: &Path) -> Result<Map<String, Value>, SettingsError> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// MemorySettingsStore
// ============================================================================

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<Map<String, Value>>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod memory_store_tests {
        use super::*;

        #[test]
        fn test_get_missing_is_none() {
            let store = MemorySettingsStore::new();
            assert!(store.get("missing").is_none());
            assert!(store.is_empty());
        }

        #[test]
        fn test_typed_round_trip() {
            let store = MemorySettingsStore::new();
            store.set_as(keys::SESSION_COUNT, &4u32).unwrap();
            assert_eq!(store.get_as::<u32>(keys::SESSION_COUNT), Some(4));
        }

        #[test]
        fn test_type_mismatch_reads_as_missing() {
            let store = MemorySettingsStore::new();
            store
                .set(keys::SESSION_COUNT, Value::String("four".into()))
                .unwrap();
            assert_eq!(store.get_as::<u32>(keys::SESSION_COUNT), None);
        }

        #[test]
        fn test_remove() {
            let store = MemorySettingsStore::new();
            store.set_as(keys::LAST_UPDATED, &"x").unwrap();
            store.remove(keys::LAST_UPDATED).unwrap();
            assert!(store.get(keys::LAST_UPDATED).is_none());
        }

        #[test]
        fn test_usable_as_trait_object() {
            let store: std::sync::Arc<dyn SettingsStore> =
                std::sync::Arc::new(MemorySettingsStore::new());
            store.set_as(keys::AUTO_CONTINUE, &true).unwrap();
            assert_eq!(store.get_as::<bool>(keys::AUTO_CONTINUE), Some(true));
        }
    }

    mod json_file_store_tests {
        use super::*;

        #[test]
        fn test_values_survive_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("settings.json");

            let store = JsonFileStore::open(&path).unwrap();
            store.set_as(keys::WORK_DURATION_MINUTES, &25u32).unwrap();
            store.set_as(keys::LAST_RESET_DATE, &"2024-06-01").unwrap();
            drop(store);

            let reopened = JsonFileStore::open(&path).unwrap();
            assert_eq!(
                reopened.get_as::<u32>(keys::WORK_DURATION_MINUTES),
                Some(25)
            );
            assert_eq!(
                reopened.get_as::<String>(keys::LAST_RESET_DATE).as_deref(),
                Some("2024-06-01")
            );
        }

        #[test]
        fn test_remove_persists() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.json");

            let store = JsonFileStore::open(&path).unwrap();
            store.set_as(keys::LAST_UPDATED, &"t").unwrap();
            store.remove(keys::LAST_UPDATED).unwrap();
            drop(store);

            let reopened = JsonFileStore::open(&path).unwrap();
            assert!(reopened.get(keys::LAST_UPDATED).is_none());
        }

        #[test]
        fn test_corrupt_file_is_parse_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.json");
            std::fs::write(&path, "{not json").unwrap();

            let err = JsonFileStore::open(&path).unwrap_err();
            assert!(matches!(err, SettingsError::Parse { .. }));
        }

        #[test]
        fn test_empty_file_is_empty_store() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.json");
            std::fs::write(&path, "").unwrap();

            let store = JsonFileStore::open(&path).unwrap();
            assert!(store.get(keys::SESSION_COUNT).is_none());
            assert_eq!(store.path(), path.as_path());
        }

        #[test]
        fn test_two_handles_keep_each_others_writes() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.json");

            let running = JsonFileStore::open(&path).unwrap();
            let cli = JsonFileStore::open(&path).unwrap();
            running.set_as(keys::SESSION_COUNT, &1u32).unwrap();
            cli.set_as(keys::WORK_DURATION_MINUTES, &25u32).unwrap();
            running.set_as(keys::SESSION_COUNT, &2u32).unwrap();

            let reopened = JsonFileStore::open(&path).unwrap();
            assert_eq!(reopened.get_as::<u32>(keys::SESSION_COUNT), Some(2));
            assert_eq!(
                reopened.get_as::<u32>(keys::WORK_DURATION_MINUTES),
                Some(25)
            );
            assert_eq!(running.get_as::<u32>(keys::WORK_DURATION_MINUTES), Some(25));
        }

        #[test]
        fn test_remove_by_another_handle_is_kept() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.json");

            let running = JsonFileStore::open(&path).unwrap();
            running.set_as(keys::LAST_UPDATED, &"t").unwrap();
            let cli = JsonFileStore::open(&path).unwrap();
            cli.remove(keys::LAST_UPDATED).unwrap();
            running.set_as(keys::SESSION_COUNT, &3u32).unwrap();

            let reopened = JsonFileStore::open(&path).unwrap();
            assert!(reopened.get(keys::LAST_UPDATED).is_none());
            assert_eq!(reopened.get_as::<u32>(keys::SESSION_COUNT), Some(3));
        }
    }
}
