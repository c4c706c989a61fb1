//! File-backed cache of final search results.
//!
//! One JSON file per query key under the cache directory:
//!
//! ```json
//! { "timestamp": 1717430400.25, "data": "2024-06-03T16:00:00.250+00:00", "resultados": [ … ] }
//! ```
//!
//! `timestamp` (unix seconds) is the only field used for expiry. Reads never
//! fail: a missing, unreadable, or expired file is a miss. Writes go to a
//! temporary file in the same directory that is then renamed over the target,
//! so readers never observe a partial entry; a failed write is logged and
//! otherwise ignored.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::record::NormalizedRecord;

const ENTRY_EXTENSION: &str = "json";

/// Period used by the sweeper when it is given a zero interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk entry layout.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: f64,
    #[serde(rename = "data")]
    written_at: String,
    #[serde(rename = "resultados")]
    records: Vec<NormalizedRecord>,
}

/// Time-limited store of final result lists keyed by query hash.
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Keys are hex digests; anything else could escape the cache directory.
fn is_safe_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl ResultCache {
    /// Create a cache rooted at `dir`. The directory is created lazily on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the entry file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Return the cached records for `key` if a fresh entry exists.
    pub fn get(&self, key: &str) -> Option<Vec<NormalizedRecord>> {
        if !is_safe_key(key) {
            tracing::debug!(key, "cache miss: rejected key");
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let path = self.path_for(key);
        match read_entry(&path) {
            Ok(Some(entry)) => {
                let age = now_secs() - entry.timestamp;
                if age > self.ttl.as_secs_f64() {
                    tracing::debug!(key, age_secs = age, "cache miss: entry expired");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!(key, count = entry.records.len(), "cache hit");
                Some(entry.records)
            }
            Ok(None) => {
                tracing::trace!(key, "cache miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::debug!(key, error = %e, "cache miss: unreadable entry");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `records` under `key`, replacing any previous entry.
    ///
    /// Failures are logged and swallowed; the caller's result is unaffected.
    pub fn insert(&self, key: &str, records: &[NormalizedRecord]) {
        if !is_safe_key(key) {
            tracing::warn!(key, "refusing to cache under unsafe key");
            return;
        }
        match self.write_entry(key, records) {
            Ok(path) => {
                tracing::info!(key, count = records.len(), path = %path.display(), "cache write");
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache write failed");
            }
        }
    }

    fn write_entry(&self, key: &str, records: &[NormalizedRecord]) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            timestamp: now_secs(),
            written_at: chrono::Utc::now().to_rfc3339(),
            records: records.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&entry)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.flush()?;
        let path = self.path_for(key);
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Delete every expired or unreadable entry. Returns how many files were
    /// removed.
    pub fn evict_expired(&self) -> usize {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cache sweep failed");
                return 0;
            }
        };

        let ttl = self.ttl.as_secs_f64();
        let now = now_secs();
        let mut removed = 0;
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let expired = match read_entry(&path) {
                Ok(Some(entry)) => now - entry.timestamp > ttl,
                Ok(None) => false,
                Err(_) => true,
            };
            if expired {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "could not remove cache entry")
                    }
                }
            }
        }
        tracing::info!(removed, dir = %self.dir.display(), "cache sweep finished");
        removed
    }

    /// Run [`evict_expired`](Self::evict_expired) every `interval` until
    /// `cancel` fires. The first sweep runs immediately. A zero interval is
    /// raised to one second.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let interval = if interval.is_zero() {
            tracing::warn!("cache sweep interval is zero, using {:?}", MIN_SWEEP_INTERVAL);
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let cache = Arc::clone(&cache);
                        if let Err(e) = tokio::task::spawn_blocking(move || cache.evict_expired()).await {
                            tracing::warn!(error = %e, "cache sweep task failed");
                        }
                    }
                }
            }
            tracing::debug!("cache sweeper stopped");
        })
    }

    /// Number of cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
