//! Key-value persistence capability behind the schema cache
//!
//! The cache only needs string keys and string values. [`MemoryStore`] serves
//! tests and embedded use; [`FileStore`] keeps one file per key so a CLI or
//! server process can share fetched schemas across runs.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Narrow string key-value store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value; fails with [`StoreError::QuotaExceeded`] when full
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str);

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn keys(&self) -> Vec<String>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Map-backed store with an optional byte quota over all values
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(quota),
        }
    }

    /// Bytes currently held by values
    pub fn used_bytes(&self) -> usize {
        self.entries.values().map(String::len).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota {
            let replaced = self.entries.get(key).map(String::len).unwrap_or(0);
            let used = self.used_bytes() - replaced;
            if used + value.len() > quota {
                return Err(StoreError::QuotaExceeded {
                    needed: value.len(),
                    available: quota.saturating_sub(used),
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

// =============================================================================
// File store
// =============================================================================

const FILE_EXTENSION: &str = "json";

/// Directory-backed store; each key maps to `<dir>/<key>.json`.
///
/// Keys are expected to be filename-safe (the cache only writes prefixed hex
/// digests).
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota: None })
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, FILE_EXTENSION))
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.keys()
            .into_iter()
            .filter(|k| k != key)
            .filter_map(|k| fs::metadata(self.path_for(&k)).ok())
            .map(|m| m.len() as usize)
            .sum()
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota {
            let used = self.used_bytes_excluding(key);
            if used + value.len() > quota {
                return Err(StoreError::QuotaExceeded {
                    needed: value.len(),
                    available: quota.saturating_sub(used),
                });
            }
        }
        // Write-then-rename so readers never see a torn entry
        let target = self.path_for(key);
        let tmp = target.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        if let Err(e) = fs::remove_file(self.path_for(key)) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(key, error = %e, "failed to remove cache file");
            }
        }
    }

    fn has(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == FILE_EXTENSION).unwrap_or(false))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_quota() {
        let mut store = MemoryStore::with_quota(10);
        store.set("a", "12345").unwrap();
        // replacing a value only counts the difference
        store.set("a", "1234567890").unwrap();

        let err = store.set("b", "x").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { needed: 1, available: 0 }));

        store.remove("a");
        store.set("b", "x").unwrap();
        assert_eq!(store.keys(), vec!["b"]);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("cache")).unwrap();

        store.set("schema_cache_abc", "{\"a\":1}").unwrap();
        assert!(store.has("schema_cache_abc"));
        assert_eq!(store.get("schema_cache_abc").as_deref(), Some("{\"a\":1}"));
        assert_eq!(store.keys(), vec!["schema_cache_abc"]);

        store.remove("schema_cache_abc");
        assert!(!store.has("schema_cache_abc"));
        assert!(store.keys().is_empty());
        // removing twice is fine
        store.remove("schema_cache_abc");
    }

    #[test]
    fn test_file_store_quota() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap().with_quota(8);
        store.set("k1", "12345").unwrap();
        assert!(matches!(store.set("k2", "12345"), Err(StoreError::QuotaExceeded { .. })));
    }
}
