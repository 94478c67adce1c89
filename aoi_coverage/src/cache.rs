//! Keyed text cache with time-to-live.
//!
//! The TLE store does not touch ambient storage; it is handed a `TextCache`
//! implementation. `FileTextCache` persists entries below a cache directory
//! (one JSON file per key), `MemoryTextCache` keeps them for the lifetime of
//! the process.

use crate::{AoiCoverageError, AoiCoverageResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// A cached text blob and the time it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub stored_at: DateTime<Utc>,
    pub text: String,
}

impl CacheEntry {
    pub fn new(text: String, stored_at: DateTime<Utc>) -> Self {
        CacheEntry { stored_at, text }
    }

    /// Entry is usable while `now - stored_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.stored_at) < ttl
    }
}

/// Converts fractional hours into a chrono duration (millisecond resolution).
pub fn ttl_from_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

#[async_trait]
pub trait TextCache: Send + Sync {
    /// Returns the entry for `key`, fresh or not. Read failures count as a miss.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Stores `entry` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, entry: CacheEntry) -> AoiCoverageResult<()>;
}

/// Cache entries stored as `<dir>/<key>.json`.
pub struct FileTextCache {
    dir: PathBuf,
}

impl FileTextCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileTextCache { dir: dir.into() }
    }

    /// `<dir>/<escaped key>.json`. ASCII alphanumerics and `-` are kept, every
    /// other byte becomes `_XX` (hex), so distinct keys never share a file.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut fname = String::with_capacity(key.len());
        for b in key.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                fname.push(b as char);
            } else {
                fname.push_str(&format!("_{b:02X}"));
            }
        }
        self.dir.join(format!("{fname}.json"))
    }
}

#[async_trait]
impl TextCache for FileTextCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(_) => return None,
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("ignoring corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> AoiCoverageResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AoiCoverageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create cache directory {}: {e}", self.dir.display()),
            ))
        })?;

        let path = self.entry_path(key);
        let raw = serde_json::to_string(&entry)?;
        tokio::fs::write(&path, raw).await?;
        Ok(())
    }
}

/// In-process cache, mostly useful for tests and short-lived services.
#[derive(Default)]
pub struct MemoryTextCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryTextCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextCache for MemoryTextCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> AoiCoverageResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}

/// One async lock per cache key, so concurrent lookups of the same key run
/// check-fetch-store one at a time.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
