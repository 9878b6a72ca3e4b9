use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use crate::app_data::{AppData, AppDataRecord};
use crate::config::AppConfig;
use crate::error::{Result, TaskflowError};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("quota exceeded: {requested} bytes requested, limit is {limit}")]
    QuotaExceeded { limit: usize, requested: usize },
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

/// A durable string slot store, the local-storage equivalent the aggregate is persisted to.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError>;
    fn remove(&self, key: &str) -> std::result::Result<(), StorageError>;
}

/// In-process store. An optional byte quota makes writes fail the way a full browser
/// storage area does.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        let guard = self.slots.lock().expect("store poisoned");
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        let mut guard = self.slots.lock().expect("store poisoned");
        if let Some(limit) = self.quota {
            let others: usize = guard
                .iter()
                .filter(|(slot, _)| slot.as_str() != key)
                .map(|(slot, stored)| slot.len() + stored.len())
                .sum();
            let requested = others + key.len() + value.len();
            if requested > limit {
                return Err(StorageError::QuotaExceeded { limit, requested });
            }
        }
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
        let mut guard = self.slots.lock().expect("store poisoned");
        guard.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per slot under `root`. Writes go through a temp file and a rename.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> std::result::Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn slot_path(&self, key: &str) -> std::result::Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(key)?) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        let path = self.slot_path(key)?;
        self.ensure_dirs()?;
        write_atomic(&path, value.as_bytes())
    }

    fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
        match fs::remove_file(self.slot_path(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Writes through a uniquely named sibling temp file and renames it over `path`, so
/// concurrent writers never share a temp file and readers never see a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::result::Result<(), StorageError> {
    let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}

/// Result of [`StorageManager::load`]. `data` is always usable: on failure it holds a fresh
/// aggregate and `error` says what went wrong.
#[derive(Debug)]
pub struct LoadResult {
    pub data: AppData,
    pub error: Option<TaskflowError>,
}

impl LoadResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub size_bytes: usize,
    #[serde(rename = "sizeKB")]
    pub size_kb: String,
    pub last_modified: Option<String>,
    pub has_data: bool,
}

/// Saves and loads the aggregate to a single named slot of a [`KeyValueStore`].
pub struct StorageManager<S> {
    store: S,
    key: String,
    config: Arc<AppConfig>,
    /// Serializes writes to the slot. Held across snapshot and write by
    /// [`StorageManager::save_state`].
    save_lock: Mutex<()>,
}

impl<S: KeyValueStore> StorageManager<S> {
    pub fn new(store: S, config: Arc<AppConfig>) -> Self {
        let key = config.storage_key.clone();
        Self {
            store,
            key,
            config,
            save_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn save(&self, data: &AppData) -> Result<()> {
        let _guard = self.save_lock.lock().expect("save lock poisoned");
        self.write_record(data)
    }

    /// Takes the snapshot and writes it under the save lock, so a save that starts later
    /// never gets overwritten by an older snapshot.
    pub fn save_state(&self, state: &AppState) -> Result<()> {
        let _guard = self.save_lock.lock().expect("save lock poisoned");
        let snapshot = state.snapshot();
        self.write_record(&snapshot)
    }

    fn write_record(&self, data: &AppData) -> Result<()> {
        let outcome = serde_json::to_string(&data.to_plain_data())
            .map_err(StorageError::from)
            .and_then(|raw| self.store.set(&self.key, &raw));
        outcome.map_err(|source| {
            log::error!("failed to save data key={}: {source}", self.key);
            TaskflowError::Storage {
                action: "save data to local storage",
                source,
            }
        })
    }

    /// Absence of a stored record is not an error: a fresh aggregate is returned.
    pub fn load(&self) -> LoadResult {
        match self.read_record() {
            Ok(Some(record)) => LoadResult {
                data: AppData::from_plain_data(record, self.config.clone()),
                error: None,
            },
            Ok(None) => {
                log::info!("no stored data under key={}, starting fresh", self.key);
                LoadResult {
                    data: AppData::new(self.config.clone()),
                    error: None,
                }
            }
            Err(source) => {
                log::warn!("failed to load data key={}: {source}", self.key);
                LoadResult {
                    data: AppData::new(self.config.clone()),
                    error: Some(TaskflowError::Storage {
                        action: "load data from local storage",
                        source,
                    }),
                }
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.save_lock.lock().expect("save lock poisoned");
        self.store.remove(&self.key).map_err(|source| {
            log::error!("failed to clear data key={}: {source}", self.key);
            TaskflowError::Storage {
                action: "clear local storage",
                source,
            }
        })
    }

    pub fn storage_info(&self) -> Result<StorageInfo> {
        let info = || -> std::result::Result<StorageInfo, StorageError> {
            let raw = self.store.get(&self.key)?;
            let size_bytes = raw.as_ref().map(|raw| raw.len()).unwrap_or(0);
            let last_modified = match &raw {
                Some(raw) => serde_json::from_str::<serde_json::Value>(raw)?
                    .get("lastModified")
                    .and_then(|value| value.as_str())
                    .map(|value| value.to_string()),
                None => None,
            };
            Ok(StorageInfo {
                size_bytes,
                size_kb: format!("{:.2}", size_bytes as f64 / 1024.0),
                last_modified,
                has_data: raw.is_some(),
            })
        };
        info().map_err(|source| TaskflowError::Storage {
            action: "get storage info",
            source,
        })
    }

    fn read_record(&self) -> std::result::Result<Option<AppDataRecord>, StorageError> {
        match self.store.get(&self.key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
