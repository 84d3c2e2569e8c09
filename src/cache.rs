//! OCSP response cache.
//!
//! Maps a certificate's [`CacheKey`] to its last [`ValidationResult`]. The
//! in-memory map and the on-disk file are one logical store: the file is a
//! snapshot loaded at startup and rewritten whole after changes.
//!
//! Snapshots are written with `savefile` under [`CACHE_FORMAT_VERSION`]; a
//! file from an incompatible version fails to load and is discarded.

use crate::backend::CryptoBackend;
use crate::error::CacheError;
use crate::identity::{CacheKey, CertIdentity};
use crate::result::{unix_now, CapturedError, ValidationResult};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Version tag written into every snapshot.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Configuration for the response cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Freshness window: entries older than this are treated as absent
    pub max_age: Duration,
    /// Maximum number of entries; the oldest entry is evicted beyond it
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_age: Duration::from_secs(24 * 60 * 60),
            max_entries: 10_000,
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub total_entries: usize,
}

impl CacheStatistics {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Savefile)]
enum StoredResult {
    Validated {
        issuer_cert: Vec<u8>,
        subject_cert: Vec<u8>,
        cert_id: CertIdentity,
        ocsp_response: Vec<u8>,
        timestamp: i64,
    },
    Failed {
        kind: String,
        message: String,
        code: Option<u32>,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Savefile)]
struct StoredEntry {
    key: CacheKey,
    value: StoredResult,
}

#[derive(Debug, Clone, Savefile)]
struct Snapshot {
    entries: Vec<StoredEntry>,
}

impl From<&ValidationResult> for StoredResult {
    fn from(value: &ValidationResult) -> Self {
        match value {
            ValidationResult::Validated {
                ocsp_response,
                issuer_cert,
                subject_cert,
                cert_id,
                timestamp,
            } => StoredResult::Validated {
                issuer_cert: issuer_cert.clone(),
                subject_cert: subject_cert.clone(),
                cert_id: cert_id.clone(),
                ocsp_response: ocsp_response.clone(),
                timestamp: *timestamp,
            },
            ValidationResult::Failed { error, timestamp } => StoredResult::Failed {
                kind: error.kind().to_string(),
                message: error.message().to_string(),
                code: error.code().map(|code| code.errno()),
                timestamp: *timestamp,
            },
        }
    }
}

impl StoredResult {
    fn into_result(self, cache_dir: &str) -> ValidationResult {
        match self {
            StoredResult::Validated {
                issuer_cert,
                subject_cert,
                cert_id,
                ocsp_response,
                timestamp,
            } => ValidationResult::Validated {
                ocsp_response,
                issuer_cert,
                subject_cert,
                cert_id,
                timestamp,
            },
            StoredResult::Failed {
                kind,
                message,
                code,
                timestamp,
            } => ValidationResult::Failed {
                error: CapturedError::from_parts(&kind, message, code, cache_dir),
                timestamp,
            },
        }
    }
}

/// Encode cache records into the snapshot format.
pub fn serialize_entries(entries: &[(CacheKey, ValidationResult)]) -> Result<Vec<u8>, CacheError> {
    let snapshot = Snapshot {
        entries: entries
            .iter()
            .map(|(key, value)| StoredEntry {
                key: key.clone(),
                value: StoredResult::from(value),
            })
            .collect(),
    };
    Ok(savefile::save_to_mem(CACHE_FORMAT_VERSION, &snapshot)?)
}

/// Decode a snapshot. Failure records with an unknown kind come back as
/// cache-corruption errors naming `cache_dir`.
pub fn deserialize_entries(bytes: &[u8], cache_dir: &str) -> Result<Vec<(CacheKey, ValidationResult)>, CacheError> {
    let snapshot: Snapshot = savefile::load_from_mem(bytes, CACHE_FORMAT_VERSION)?;
    Ok(snapshot
        .entries
        .into_iter()
        .map(|entry| (entry.key, entry.value.into_result(cache_dir)))
        .collect())
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe validation result cache
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, ValidationResult>>,
    config: CacheConfig,
    stats: RwLock<CacheStatistics>,
}

impl ResponseCache {
    /// Create a new cache with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a new cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        ResponseCache {
            entries: RwLock::new(HashMap::new()),
            config,
            stats: RwLock::new(CacheStatistics::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn is_stale(&self, value: &ValidationResult, now: i64) -> bool {
        value.age(now) > self.config.max_age.as_secs() as i64
    }

    /// Look up the result for `cert_id`. Stale entries are removed and
    /// reported as a miss.
    pub fn get(&self, cert_id: &CertIdentity) -> Option<ValidationResult> {
        self.get_by_key(&cert_id.cache_key())
    }

    pub fn get_by_key(&self, key: &CacheKey) -> Option<ValidationResult> {
        let now = unix_now();
        {
            let entries = read_lock(&self.entries);
            match entries.get(key) {
                Some(value) if !self.is_stale(value, now) => {
                    let value = value.clone();
                    drop(entries);
                    write_lock(&self.stats).hits += 1;
                    return Some(value);
                }
                Some(_) => {}
                None => {
                    drop(entries);
                    write_lock(&self.stats).misses += 1;
                    return None;
                }
            }
        }

        // Stale: re-check under the write lock, a concurrent put may have refreshed it.
        let mut entries = write_lock(&self.entries);
        let mut stats = write_lock(&self.stats);
        match entries.get(key) {
            Some(value) if !self.is_stale(value, now) => {
                stats.hits += 1;
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                stats.evictions += 1;
                stats.misses += 1;
                stats.total_entries = entries.len();
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite. The timestamp recorded is the one carried by `value`.
    pub fn put(&self, cert_id: &CertIdentity, value: ValidationResult) {
        self.put_by_key(cert_id.cache_key(), value);
    }

    pub fn put_by_key(&self, key: CacheKey, value: ValidationResult) {
        let mut entries = write_lock(&self.entries);
        let mut stats = write_lock(&self.stats);

        if !entries.contains_key(&key) {
            while entries.len() >= self.config.max_entries.max(1) {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, value)| value.timestamp())
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                        stats.evictions += 1;
                    }
                    None => break,
                }
            }
        }

        entries.insert(key, value);
        stats.total_entries = entries.len();
    }

    pub fn remove(&self, cert_id: &CertIdentity) -> Option<ValidationResult> {
        let mut entries = write_lock(&self.entries);
        let removed = entries.remove(&cert_id.cache_key());
        write_lock(&self.stats).total_entries = entries.len();
        removed
    }

    /// Empty the in-memory store. The persisted file is left alone.
    pub fn clear(&self) {
        let mut entries = write_lock(&self.entries);
        let mut stats = write_lock(&self.stats);
        stats.evictions += entries.len();
        entries.clear();
        stats.total_entries = 0;
    }

    /// Keep only the entries for which `keep` returns true; returns how many were dropped.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&CacheKey, &ValidationResult) -> bool,
    {
        let mut entries = write_lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, value| keep(key, value));
        let dropped = before - entries.len();
        let mut stats = write_lock(&self.stats);
        stats.evictions += dropped;
        stats.total_entries = entries.len();
        dropped
    }

    /// Remove expired entries from the cache
    pub fn remove_expired(&self) -> usize {
        let now = unix_now();
        let max_age = self.config.max_age.as_secs() as i64;
        self.retain(|_, value| value.age(now) <= max_age)
    }

    /// Drop `Validated` entries whose stored response no longer decodes.
    pub fn purge_undecodable(&self, backend: &dyn CryptoBackend) -> usize {
        let dropped = self.retain(|_, value| match value {
            ValidationResult::Validated { ocsp_response, .. } => backend.parse_ocsp_response(ocsp_response).is_ok(),
            ValidationResult::Failed { .. } => true,
        });
        if dropped > 0 {
            warn!("Dropped {} cached OCSP responses that no longer decode", dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.entries).is_empty()
    }

    /// Get cache statistics
    pub fn statistics(&self) -> CacheStatistics {
        read_lock(&self.stats).clone()
    }

    /// Copy of every entry, stale ones included.
    pub fn snapshot(&self) -> Vec<(CacheKey, ValidationResult)> {
        let mut entries: Vec<_> = read_lock(&self.entries)
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Serialize the fresh entries.
    pub fn serialize(&self) -> Result<Vec<u8>, CacheError> {
        let now = unix_now();
        let entries: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|(_, value)| !self.is_stale(value, now))
            .collect();
        serialize_entries(&entries)
    }

    /// Merge serialized entries into the cache, skipping stale ones.
    /// An in-memory entry newer than the loaded one is kept.
    pub fn load_bytes(&self, bytes: &[u8], cache_dir: &str) -> Result<usize, CacheError> {
        let loaded = deserialize_entries(bytes, cache_dir)?;
        let now = unix_now();
        let mut count = 0;
        let mut entries = write_lock(&self.entries);
        for (key, value) in loaded {
            if self.is_stale(&value, now) {
                continue;
            }
            let newer_in_memory = entries
                .get(&key)
                .map_or(false, |current| current.timestamp() >= value.timestamp());
            if !newer_in_memory {
                entries.insert(key, value);
                count += 1;
            }
        }
        write_lock(&self.stats).total_entries = entries.len();
        Ok(count)
    }

    /// Load a snapshot from `path`.
    ///
    /// Never fails: a missing, unreadable or incompatible file is logged and
    /// the cache continues with what it already holds. Returns the number of
    /// entries loaded.
    pub fn load(&self, path: &Path) -> usize {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No OCSP cache file at {}", path.display());
                return 0;
            }
            Err(err) => {
                warn!("Failed to read OCSP cache file {}: {}", path.display(), err);
                return 0;
            }
        };

        let cache_dir = path.parent().unwrap_or(path).display().to_string();
        match self.load_bytes(&bytes, &cache_dir) {
            Ok(count) => {
                info!("Loaded {} OCSP cache entries from {}", count, path.display());
                count
            }
            Err(err) => {
                warn!(
                    "Discarding OCSP cache file {} ({}); please try cleaning up the OCSP cache under directory {}",
                    path.display(),
                    err,
                    cache_dir
                );
                0
            }
        }
    }

    /// Write the fresh entries to `path`, atomically replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let bytes = self.serialize()?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        info!("Saved {} bytes of OCSP cache to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Remove the persisted snapshot. A missing file is not an error.
    pub fn delete_persisted_file(&self, path: &Path) -> Result<(), CacheError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

lazy_static::lazy_static! {
    static ref SHARED_CACHE: Arc<ResponseCache> = Arc::new(ResponseCache::new());
}

/// Process-wide cache shared by validators built with [`crate::OcspValidator::new`].
pub fn shared_cache() -> Arc<ResponseCache> {
    Arc::clone(&SHARED_CACHE)
}
