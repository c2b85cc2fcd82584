//! Analysis result cache.
//!
//! Reports are keyed by [`CacheKey`] and expire after a fixed TTL. Expired
//! entries are treated as misses and dropped on the lookup that finds them.
//! Capacity is bounded by an [`LruCache`]: inserting into a full cache
//! evicts the least recently used report.
//!
//! The cache lives in memory. [`AnalysisCache::load`] and
//! [`AnalysisCache::save`] move it to and from a JSON file so the `pdr`
//! CLI can reuse reports across runs; entries past their TTL are skipped
//! on both sides.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use pdr_analysis_core::cache_key::CacheKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CacheConfig;
use crate::report::AnalysisReport;

struct Entry {
    stored_at: DateTime<Utc>,
    report: AnalysisReport,
}

/// On-disk form of one entry.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    key: CacheKey,
    stored_at: DateTime<Utc>,
    report: AnalysisReport,
}

/// On-disk form of the whole cache, least recently used first.
#[derive(Serialize, Deserialize, Default)]
struct CacheFile {
    entries: Vec<StoredEntry>,
}

pub struct AnalysisCache {
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, Entry>>,
}

impl AnalysisCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    /// Build a cache from the file at `path`. A missing file is an empty
    /// cache; expired entries are dropped.
    pub fn load(path: &Path, config: &CacheConfig) -> Result<Self> {
        let cache = Self::from_config(config);
        if !path.exists() {
            debug!(path = %path.display(), "no cache file; starting empty");
            return Ok(cache);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let file: CacheFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;

        let now = Utc::now();
        let mut skipped = 0usize;
        for stored in file.entries {
            if cache.is_expired(stored.stored_at, now) {
                skipped += 1;
                continue;
            }
            cache.insert_at(stored.key, stored.report, stored.stored_at);
        }
        debug!(path = %path.display(), loaded = cache.len(), expired = skipped, "loaded cache file");
        Ok(cache)
    }

    /// Write every fresh entry to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let now = Utc::now();
        let file = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            CacheFile {
                entries: entries
                    .iter()
                    .rev()
                    .filter(|(_, entry)| !self.is_expired(entry.stored_at, now))
                    .map(|(key, entry)| StoredEntry {
                        key: key.clone(),
                        stored_at: entry.stored_at,
                        report: entry.report.clone(),
                    })
                    .collect(),
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }
        let body = serde_json::to_string(&file)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;
        Ok(())
    }

    /// Fresh report for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<AnalysisReport> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<AnalysisReport> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let stored_at = entries.get(key)?.stored_at;
        if self.is_expired(stored_at, now) {
            entries.pop(key);
            debug!(document_id = key.document_id, "evicted expired cache entry");
            return None;
        }
        entries.get(key).map(|entry| entry.report.clone())
    }

    /// Store `report` under `key`, replacing any previous entry.
    pub fn insert(&self, key: CacheKey, report: AnalysisReport) {
        self.insert_at(key, report, Utc::now());
    }

    fn insert_at(&self, key: CacheKey, report: AnalysisReport, stored_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let replacing = entries.contains(&key);
        let evicted = entries.push(key, Entry { stored_at, report });
        if let (false, Some((oldest, _))) = (replacing, evicted) {
            debug!(document_id = oldest.document_id, "evicted least recently used cache entry");
        }
    }

    fn is_expired(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(stored_at)
            .to_std()
            .is_ok_and(|age| age >= self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
