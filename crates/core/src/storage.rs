//! String-keyed durable storage.
//!
//! [`KeyValueStore`] is the persistence seam shared by the catalog cache,
//! the selection store and the sort preference. Writes are grouped into
//! batches so that related keys change together.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::warn;

/// Storage key of the persisted selection.
pub const SELECTION_KEY: &str = "grocery-list-items";
/// Storage key of the cached catalog payload.
pub const CATALOG_KEY: &str = "tarkov-items-cache";
/// Storage key of the cached catalog expiry, in epoch milliseconds.
pub const CATALOG_EXPIRY_KEY: &str = "tarkov-items-cache-expiry";
/// Storage key of the last used sort order.
pub const SORT_KEY: &str = "grocery-list-sort";

/// A single mutation inside a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Insert or replace a value.
    Set(String, String),
    /// Delete a key if present.
    Remove(String),
}

/// Persistent string-to-string map.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Apply every operation or none of them.
    fn apply(&self, batch: Vec<StoreOp>) -> Result<()>;

    /// Insert or replace a single value.
    fn set(&self, key: &str, value: String) -> Result<()> {
        self.apply(vec![StoreOp::Set(key.to_string(), value)])
    }

    /// Delete a single key.
    fn remove(&self, key: &str) -> Result<()> {
        self.apply(vec![StoreOp::Remove(key.to_string())])
    }
}

fn apply_ops(map: &mut BTreeMap<String, String>, batch: Vec<StoreOp>) {
    for op in batch {
        match op {
            StoreOp::Set(key, value) => {
                map.insert(key, value);
            }
            StoreOp::Remove(key) => {
                map.remove(&key);
            }
        }
    }
}

/// Volatile store, used by tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn apply(&self, batch: Vec<StoreOp>) -> Result<()> {
        apply_ops(&mut self.entries.write(), batch);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// The whole map is rewritten through a temporary file and renamed into
/// place, so a batch is either fully on disk or not at all.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty when the file is missing.
    /// An unreadable file is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), %err, "discarding unreadable storage file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let serialized = serde_json::to_vec_pretty(entries).context("failed to encode storage")?;
        let mut temp = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        temp.write_all(&serialized)
            .context("failed to write storage temp file")?;
        temp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn apply(&self, batch: Vec<StoreOp>) -> Result<()> {
        let mut entries = self.entries.write();
        let mut updated = entries.clone();
        apply_ops(&mut updated, batch);
        self.write_file(&updated)?;
        *entries = updated;
        Ok(())
    }
}
