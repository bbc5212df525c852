//! Persistent cache of toolchain probe results.
//!
//! The cache is a single JSON document, loaded eagerly and rewritten in full
//! on every mutation. Writes go to a temporary file in the same directory
//! that is then renamed over the cache file, so readers never observe a
//! half-written document.
//!
//! Values are stored in their flattened JSON form and handed back that way;
//! callers deserialize them into typed records themselves. An entry older
//! than the TTL is indistinguishable from an absent one.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Version of the on-disk format.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// How long a probe result stays trusted by default.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache I/O failure. Never fatal to a resolution.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed cache file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache file {} has schema version {found}, expected {}", .path.display(), CACHE_SCHEMA_VERSION)]
    Schema { path: PathBuf, found: u32 },

    #[error("failed to write cache file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One cached value and when it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    /// Unix time in seconds.
    pub timestamp: f64,
}

impl CacheEntry {
    fn age(&self, now: f64) -> f64 {
        now - self.timestamp
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

/// Current Unix time in fractional seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// TTL-bounded key/value store backed by a JSON file.
#[derive(Debug)]
pub struct DetectionCache {
    path: PathBuf,
    ttl: Duration,
    entries: BTreeMap<String, CacheEntry>,
    load_error: Option<CacheError>,
}

impl DetectionCache {
    /// Open the cache at `path`, loading it if present.
    ///
    /// A missing file is an empty cache. An unreadable or malformed file is
    /// logged, remembered in [`load_error`](Self::load_error), and replaced
    /// by an empty cache on the next write.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let mut cache = DetectionCache {
            path: path.into(),
            ttl,
            entries: BTreeMap::new(),
            load_error: None,
        };

        if let Err(e) = cache.reload() {
            tracing::warn!("Ignoring toolchain cache: {}", e);
            cache.load_error = Some(e);
        }

        cache
    }

    /// Re-read the backing file, discarding in-memory state.
    ///
    /// On error the cache is left empty.
    pub fn reload(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        self.load_error = None;

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let file: CacheFile =
            serde_json::from_str(&contents).map_err(|source| CacheError::Parse {
                path: self.path.clone(),
                source,
            })?;

        if file.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::Schema {
                path: self.path.clone(),
                found: file.schema_version,
            });
        }

        self.entries = file.entries;
        tracing::debug!(
            "Loaded {} cached toolchain entries from {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// The error from the last load, if any.
    pub fn load_error(&self) -> Option<&CacheError> {
        self.load_error.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All stored entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether an entry stored at `timestamp` is still fresh at `now`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: f64) -> bool {
        entry.age(now) <= self.ttl.as_secs_f64()
    }

    /// Look up a fresh value. Expired entries are removed.
    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        self.get_at(key, unix_now())
    }

    /// [`get`](Self::get) against an explicit clock.
    pub fn get_at(&mut self, key: &str, now: f64) -> Option<serde_json::Value> {
        let entry = self.entries.get(key)?;

        if self.is_fresh(entry, now) {
            return Some(entry.value.clone());
        }

        tracing::debug!("Cache entry {} expired", key);
        self.entries.remove(key);
        if let Err(e) = self.save() {
            tracing::warn!("Failed to drop expired cache entry: {}", e);
        }
        None
    }

    /// Whether a fresh entry exists, without side effects.
    pub fn is_cached(&self, key: &str) -> bool {
        let now = unix_now();
        self.entries
            .get(key)
            .is_some_and(|entry| self.is_fresh(entry, now))
    }

    /// Store a value under `key`, stamped with the current time.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), CacheError> {
        self.set_at(key, value, unix_now())
    }

    /// [`set`](Self::set) with an explicit timestamp.
    pub fn set_at<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        timestamp: f64,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        self.entries
            .insert(key.to_string(), CacheEntry { value, timestamp });
        self.save()
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&mut self, key: &str) -> Result<bool, CacheError> {
        if self.entries.remove(key).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Remove every entry.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        self.save()
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> Result<usize, CacheError> {
        self.cleanup_expired_at(unix_now())
    }

    pub fn cleanup_expired_at(&mut self, now: f64) -> Result<usize, CacheError> {
        let ttl = self.ttl.as_secs_f64();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.age(now) <= ttl);

        let removed = before - self.entries.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    /// Write the whole cache to disk atomically.
    fn save(&self) -> Result<(), CacheError> {
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let file = CacheFile {
            schema_version: CACHE_SCHEMA_VERSION,
            entries: self.entries.clone(),
        };
        let mut contents = serde_json::to_string_pretty(&file)?;
        contents.push('\n');

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(3600);
    const EPSILON: f64 = 0.001;

    fn cache_in(tmp: &TempDir) -> DetectionCache {
        DetectionCache::open(tmp.path().join("toolchains.json"), TTL)
    }

    #[test]
    fn test_set_and_get() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_in(&tmp);
        assert!(cache.is_empty());

        cache.set("k1", &json!({"family": "gcc"})).unwrap();
        assert_eq!(cache.get("k1"), Some(json!({"family": "gcc"})));
        assert!(cache.is_cached("k1"));
        assert!(!cache.is_cached("k2"));
        assert_eq!(cache.get("k2"), None);
    }

    #[test]
    fn test_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        cache_in(&tmp).set("k1", &json!(["a", "b"])).unwrap();

        let mut reopened = cache_in(&tmp);
        assert!(reopened.load_error().is_none());
        assert_eq!(reopened.get("k1"), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_ttl_boundary() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_in(&tmp);
        let stored = 1_700_000_000.0;
        let ttl = TTL.as_secs_f64();

        cache.set_at("k", &json!(1), stored).unwrap();
        assert_eq!(cache.get_at("k", stored + ttl - EPSILON), Some(json!(1)));
        assert_eq!(cache.get_at("k", stored + ttl + EPSILON), None);
    }

    #[test]
    fn test_expired_get_invalidates() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_in(&tmp);

        cache.set_at("old", &json!(1), 1000.0).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.len(), 0);

        // The removal reached the disk.
        let reopened = cache_in(&tmp);
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_in(&tmp);
        cache.set("a", &json!(1)).unwrap();
        cache.set("b", &json!(2)).unwrap();

        assert!(cache.invalidate("a").unwrap());
        assert!(!cache.invalidate("a").unwrap());
        assert_eq!(cache.len(), 1);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(cache_in(&tmp).is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_in(&tmp);
        let now = 1_700_000_000.0;

        cache.set_at("fresh", &json!(1), now - 10.0).unwrap();
        cache.set_at("stale1", &json!(2), now - 2.0 * TTL.as_secs_f64()).unwrap();
        cache.set_at("stale2", &json!(3), 0.0).unwrap();

        assert_eq!(cache.cleanup_expired_at(now).unwrap(), 2);
        assert_eq!(cache.cleanup_expired_at(now).unwrap(), 0);
        let keys: Vec<&str> = cache.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["fresh"]);
    }

    #[test]
    fn test_malformed_file_resets_to_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("toolchains.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut cache = DetectionCache::open(&path, TTL);
        assert!(matches!(cache.load_error(), Some(CacheError::Parse { .. })));
        assert!(cache.is_empty());

        // Still usable, and the next write repairs the file.
        cache.set("k", &json!(true)).unwrap();
        let reopened = DetectionCache::open(&path, TTL);
        assert!(reopened.load_error().is_none());
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("toolchains.json");
        std::fs::write(&path, r#"{"schema_version": 99, "entries": {}}"#).unwrap();

        let cache = DetectionCache::open(&path, TTL);
        assert!(matches!(
            cache.load_error(),
            Some(CacheError::Schema { found: 99, .. })
        ));
    }

    #[test]
    fn test_file_format() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_in(&tmp);
        cache.set_at("abc", &json!({"generator": "Ninja"}), 12.5).unwrap();

        let text = std::fs::read_to_string(cache.path()).unwrap();
        assert!(text.contains("\n  \"schema_version\": 1"));

        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["entries"]["abc"]["timestamp"], json!(12.5));
        assert_eq!(doc["entries"]["abc"]["value"]["generator"], json!("Ninja"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dir").join("toolchains.json");
        let mut cache = DetectionCache::open(&path, TTL);

        cache.set("k", &json!(1)).unwrap();
        assert!(path.exists());
    }
}
