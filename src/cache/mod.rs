//! Schema Cache
//!
//! Best-effort persistence of fetched external schema documents over a
//! [`KeyValueStore`]. Entries above a size threshold are stored zstd
//! compressed; entries older than the maximum age are dropped lazily on read.
//! No cache failure is ever fatal to resolution.

pub mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::config::CacheConfig;
use crate::error::{Result, SchemaError, StoreError};

/// Version of the entry layout; entries written with another version are misses
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Length of the hex digest used in storage keys
const KEY_DIGEST_LEN: usize = 32;

/// zstd level for large entries
const COMPRESSION_LEVEL: i32 = 3;

/// Persisted record for one fetched document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSchemaEntry {
    pub url: String,
    /// Raw JSON, or hex-encoded zstd frame when `compressed`
    pub content: String,
    pub compressed: bool,
    pub timestamp: DateTime<Utc>,
    /// Length of the raw serialized JSON
    pub size: usize,
    pub schema_version: u32,
    /// SHA-256 of the raw serialized JSON
    pub checksum: Checksum,
}

impl CachedSchemaEntry {
    /// Bytes the entry occupies in the store's content field
    pub fn stored_size(&self) -> usize {
        self.content.len()
    }
}

/// Snapshot of cache usage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub count: usize,
    /// Bytes held in the store across all entries
    pub total_size: usize,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    /// Raw bytes divided by stored bytes; 1.0 when nothing is compressed
    pub compression_ratio: f64,
}

type Clock = Box<dyn Fn() -> DateTime<Utc>>;

/// Cache of external schema documents keyed by URL
pub struct SchemaCache {
    store: Box<dyn KeyValueStore>,
    key_prefix: String,
    max_age: chrono::Duration,
    compression_threshold: usize,
    clock: Clock,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("key_prefix", &self.key_prefix)
            .field("max_age", &self.max_age)
            .field("compression_threshold", &self.compression_threshold)
            .finish_non_exhaustive()
    }
}

impl SchemaCache {
    /// Cache with default settings (24h TTL, 100 KB compression threshold)
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self::from_config(store, &CacheConfig::default())
    }

    pub fn from_config(store: impl KeyValueStore + 'static, config: &CacheConfig) -> Self {
        let max_age = chrono::Duration::from_std(config.max_age())
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        Self {
            store: Box::new(store),
            key_prefix: config.key_prefix.clone(),
            max_age,
            compression_threshold: config.compression_threshold,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the time source used for timestamps and staleness
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Storage key for a URL: fixed prefix plus a stable digest
    pub fn key_for(&self, url: &str) -> String {
        format!("{}{}", self.key_prefix, Checksum::of_str(url).short(KEY_DIGEST_LEN))
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Fetch a document, dropping it if stale or unreadable
    pub fn get(&mut self, url: &str) -> Option<Value> {
        let key = self.key_for(url);
        let entry = self.read_entry(&key)?;

        if entry.url != url {
            debug!(url, other = %entry.url, "cache key collision");
            return None;
        }
        if entry.schema_version != CACHE_FORMAT_VERSION {
            debug!(url, version = entry.schema_version, "dropping entry with old layout");
            self.store.remove(&key);
            return None;
        }
        if self.entry_is_stale(&entry) {
            debug!(url, timestamp = %entry.timestamp, "dropping stale cache entry");
            self.store.remove(&key);
            return None;
        }

        match decode_entry(&entry) {
            Ok(value) => {
                debug!(url, compressed = entry.compressed, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(url, error = %e, "dropping unreadable cache entry");
                self.store.remove(&key);
                None
            }
        }
    }

    /// Store a document. Returns `false` when the store refused the write,
    /// even after evicting the oldest entry once.
    pub fn set(&mut self, url: &str, schema: &Value) -> bool {
        let entry = match self.encode_entry(url, schema) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url, error = %e, "could not encode cache entry");
                return false;
            }
        };
        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(url, error = %e, "could not serialize cache entry");
                return false;
            }
        };

        let key = self.key_for(url);
        match self.store.set(&key, &serialized) {
            Ok(()) => true,
            Err(StoreError::QuotaExceeded { needed, available }) => {
                debug!(url, needed, available, "cache quota exceeded, evicting oldest entry");
                self.evict_oldest();
                match self.store.set(&key, &serialized) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(url, error = %e, "cache write failed after eviction");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(url, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Whether an entry exists for `url`, stale or not
    pub fn has(&self, url: &str) -> bool {
        self.store.has(&self.key_for(url))
    }

    /// Whether `url` needs a fresh fetch; missing entries count as stale
    pub fn is_stale(&self, url: &str) -> bool {
        match self.read_entry(&self.key_for(url)) {
            Some(entry) => self.entry_is_stale(&entry),
            None => true,
        }
    }

    pub fn remove(&mut self, url: &str) {
        let key = self.key_for(url);
        self.store.remove(&key);
    }

    /// Remove every entry under this cache's prefix
    pub fn clear(&mut self) {
        for key in self.own_keys() {
            self.store.remove(&key);
        }
    }

    /// Remove the entry with the oldest timestamp. Unreadable entries go first.
    pub fn evict_oldest(&mut self) -> bool {
        let mut oldest: Option<(String, Option<DateTime<Utc>>)> = None;
        for key in self.own_keys() {
            let timestamp = self.read_entry(&key).map(|e| e.timestamp);
            let older = match (&oldest, timestamp) {
                (None, _) => true,
                (Some((_, Some(_))), None) => true,
                (Some((_, Some(current))), Some(ts)) => ts < *current,
                (Some((_, None)), _) => false,
            };
            if older {
                oldest = Some((key, timestamp));
            }
        }

        match oldest {
            Some((key, _)) => {
                debug!(key = %key, "evicting oldest cache entry");
                self.store.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Remove all stale or unreadable entries, returning how many were removed
    pub fn clean_stale(&mut self) -> usize {
        let mut removed = 0;
        for key in self.own_keys() {
            let stale = match self.read_entry(&key) {
                Some(entry) => self.entry_is_stale(&entry),
                None => true,
            };
            if stale {
                self.store.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "cleaned stale cache entries");
        }
        removed
    }

    /// Evict oldest entries until stored bytes fit within `budget`
    pub fn enforce_budget(&mut self, budget: usize) -> usize {
        let mut evicted = 0;
        while self.stats().total_size > budget && self.evict_oldest() {
            evicted += 1;
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        let entries: Vec<CachedSchemaEntry> = self
            .own_keys()
            .iter()
            .filter_map(|key| self.read_entry(key))
            .collect();

        let raw: usize = entries.iter().map(|e| e.size).sum();
        let stored: usize = entries.iter().map(CachedSchemaEntry::stored_size).sum();
        let compression_ratio = if stored == 0 {
            1.0
        } else {
            raw as f64 / stored as f64
        };

        CacheStats {
            count: entries.len(),
            total_size: stored,
            oldest_timestamp: entries.iter().map(|e| e.timestamp).min(),
            compression_ratio,
        }
    }

    fn own_keys(&self) -> Vec<String> {
        self.store
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&self.key_prefix))
            .collect()
    }

    fn read_entry(&self, key: &str) -> Option<CachedSchemaEntry> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key, error = %e, "malformed cache entry");
                None
            }
        }
    }

    fn entry_is_stale(&self, entry: &CachedSchemaEntry) -> bool {
        (self.clock)() - entry.timestamp > self.max_age
    }

    fn encode_entry(&self, url: &str, schema: &Value) -> Result<CachedSchemaEntry> {
        let raw = serde_json::to_string(schema)?;
        let size = raw.len();
        let checksum = Checksum::of_str(&raw);
        let compressed = size > self.compression_threshold;
        let content = if compressed { compress(&raw)? } else { raw };

        Ok(CachedSchemaEntry {
            url: url.to_string(),
            content,
            compressed,
            timestamp: (self.clock)(),
            size,
            schema_version: CACHE_FORMAT_VERSION,
            checksum,
        })
    }
}

fn decode_entry(entry: &CachedSchemaEntry) -> Result<Value> {
    let raw = if entry.compressed {
        decompress(&entry.content)?
    } else {
        entry.content.clone()
    };
    if !entry.checksum.verify(&raw) {
        return Err(SchemaError::Compression(format!(
            "checksum mismatch for {}",
            entry.url
        )));
    }
    Ok(serde_json::from_str(&raw)?)
}

fn compress(raw: &str) -> Result<String> {
    let bytes = zstd::encode_all(raw.as_bytes(), COMPRESSION_LEVEL)
        .map_err(|e| SchemaError::Compression(format!("zstd compression failed: {}", e)))?;
    Ok(hex::encode(bytes))
}

fn decompress(content: &str) -> Result<String> {
    let bytes = hex::decode(content)
        .map_err(|e| SchemaError::Compression(format!("invalid hex payload: {}", e)))?;
    let raw = zstd::decode_all(bytes.as_slice())
        .map_err(|e| SchemaError::Compression(format!("zstd decompression failed: {}", e)))?;
    String::from_utf8(raw).map_err(|e| SchemaError::Compression(format!("invalid UTF-8: {}", e)))
}
