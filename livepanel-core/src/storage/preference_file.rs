use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::traits::preference_store::PreferenceStore;

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K: Into<String>, V: Into<String>>(values: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CaptureError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten on every `set`.
///
/// A missing or corrupt file reads as empty; the next write replaces it.
#[derive(Debug)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFilePreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt preference file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), CaptureError> {
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| CaptureError::StorageError(format!("failed to serialize preferences: {}", e)))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", parent.display(), e)))?;
        }
        fs::write(&self.path, json)
            .map_err(|e| CaptureError::StorageError(format!("failed to write preferences: {}", e)))
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CaptureError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryPreferenceStore::with_values([("mic-volume", "40")]);
        assert_eq!(store.get("mic-volume").as_deref(), Some("40"));
        store.set("mic-volume", "55").unwrap();
        assert_eq!(store.get("mic-volume").as_deref(), Some("55"));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("livepanel.json");

        let store = JsonFilePreferenceStore::open(&path);
        store.set("selected-microphone", "usb-mic").unwrap();
        drop(store);

        let reopened = JsonFilePreferenceStore::open(&path);
        assert_eq!(reopened.get("selected-microphone").as_deref(), Some("usb-mic"));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livepanel.json");
        fs::write(&path, "{not json").unwrap();

        let store = JsonFilePreferenceStore::open(&path);
        assert_eq!(store.get("mic-volume"), None);
        store.set("mic-volume", "10").unwrap();
        assert_eq!(JsonFilePreferenceStore::open(&path).get("mic-volume").as_deref(), Some("10"));
    }

    #[test]
    fn unwritable_location_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();

        let store = JsonFilePreferenceStore::open(blocker.join("prefs.json"));
        assert!(matches!(store.set("mic-volume", "10"), Err(CaptureError::StorageError(_))));
        assert_eq!(store.get("mic-volume").as_deref(), Some("10"));
    }
}
