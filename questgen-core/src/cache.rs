use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;

use crate::ParsedResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Longest lifetime an entry is given, whatever ttl it was stored with.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: ParsedResult,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

/// Expires each entry after the ttl it was stored with.
struct EntryTtl;

impl Expiry<String, Arc<CacheEntry>> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl.min(MAX_TTL))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl.min(MAX_TTL))
    }
}

/// Fingerprint-keyed memo of accepted generations.
///
/// Backed by a `moka` cache, so reads never wait on writers of other keys.
/// Expired entries read as absent. Past `capacity` the least recently used
/// entry is evicted. [`GenerationCache::sweep_expired`] runs the
/// pending housekeeping eagerly for schedulers.
pub struct GenerationCache {
    entries: Cache<String, Arc<CacheEntry>>,
    capacity: usize,
}

impl std::fmt::Debug for GenerationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for GenerationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl GenerationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let entries = Cache::builder()
            .max_capacity(u64::try_from(capacity).unwrap_or(u64::MAX))
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl)
            .build();
        Self { entries, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live entries, after pending evictions have been applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, fingerprint: &str) -> Option<ParsedResult> {
        self.entry(fingerprint).map(|entry| entry.result.clone())
    }

    pub fn entry(&self, fingerprint: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(fingerprint)
    }

    /// Stores `result` under `fingerprint`, replacing any previous entry.
    pub fn put(&self, fingerprint: impl Into<String>, result: ParsedResult, ttl: Duration) {
        let fingerprint = fingerprint.into();
        let entry = Arc::new(CacheEntry {
            fingerprint: fingerprint.clone(),
            result,
            created_at: Utc::now(),
            ttl,
        });
        self.entries.insert(fingerprint, entry);
    }

    pub fn remove(&self, fingerprint: &str) -> Option<Arc<CacheEntry>> {
        self.entries.remove(fingerprint)
    }

    /// Evicts expired entries now instead of on the cache's own schedule.
    pub fn sweep_expired(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }
}
