use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Error;

/// When an entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Lives until evicted or pushed out by capacity.
    Never,
    /// Expires a fixed time after it was stored.
    AfterWrite(Duration),
    /// Expires once it has not been read for the given time.
    AfterAccess(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Policy for entries stored without an explicit one.
    pub ttl: TtlPolicy,
    /// `None` means unbounded. `Some(0)` stores nothing.
    pub max_capacity: Option<usize>,
    /// Carried from configuration; the store grows on demand.
    pub initial_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::AfterAccess(Duration::from_secs(60 * 60)),
            max_capacity: Some(1000),
            initial_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by expiry or capacity, not by explicit eviction.
    pub evictions: u64,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    ttl: TtlPolicy,
    written: Instant,
    accessed: Instant,
}

impl Entry {
    fn new(value: Value, ttl: TtlPolicy, now: Instant) -> Self {
        Self { value, ttl, written: now, accessed: now }
    }

    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            TtlPolicy::Never => false,
            TtlPolicy::AfterWrite(ttl) => now.duration_since(self.written) >= ttl,
            TtlPolicy::AfterAccess(ttl) => now.duration_since(self.accessed) >= ttl,
        }
    }
}

/// A named, process-local key/value store.
///
/// Values are opaque JSON kept in recency order. The lock is never held
/// while a value is being computed; when two callers miss on the same key
/// concurrently both compute, and the first one to store wins.
pub struct Cache {
    name: String,
    settings: CacheSettings,
    entries: Mutex<LruCache<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Cache {
    pub fn new(name: impl Into<String>, settings: CacheSettings) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(match settings.max_capacity {
                None => LruCache::unbounded(),
                Some(max) => LruCache::new(NonZeroUsize::new(max).unwrap_or(NonZeroUsize::MIN)),
            }),
            settings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Returns a live entry. Reading refreshes an access-based expiry.
    pub fn get(&self, key: &str) -> Option<Value> {
        let found = self.read(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Stores under the cache's default policy, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.put_with(key, value, self.settings.ttl);
    }

    pub fn put_with(&self, key: impl Into<String>, value: Value, ttl: TtlPolicy) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.store(&mut entries, key.into(), Entry::new(value, ttl, now), now);
    }

    /// Cache-aside read.
    ///
    /// On a hit the stored value is returned and `compute` is dropped
    /// unused. On a miss `compute` runs once; its value is stored and
    /// returned, its error is returned and nothing is stored.
    pub fn get_or_compute<F>(&self, key: &str, ttl: TtlPolicy, compute: F) -> Result<Value, Error>
    where
        F: FnOnce() -> Result<Value, Error>,
    {
        if let Some(value) = self.read(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(cache = %self.name, key, "hit");
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(cache = %self.name, key, "miss");

        let value = compute()?;

        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get_mut(key) {
            if !existing.is_expired(now) {
                existing.accessed = now;
                return Ok(existing.value.clone());
            }
        }
        self.store(&mut entries, key.to_owned(), Entry::new(value.clone(), ttl, now), now);
        Ok(value)
    }

    /// Removes an entry. Absent keys are ignored.
    pub fn evict(&self, key: &str) {
        if self.entries.lock().pop(key).is_some() {
            debug!(cache = %self.name, key, "evicted");
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(cache = %self.name, dropped, "cleared");
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry now instead of on next touch.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let purged = purge(&mut entries, now);
        self.evictions.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.accessed = now;
                return Some(entry.value.clone());
            }
        };
        if expired {
            entries.pop(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Inserts `entry`. A full cache first drops its expired entries and
    /// only then gives up its least recently used one.
    fn store(&self, entries: &mut LruCache<String, Entry>, key: String, entry: Entry, now: Instant) {
        if self.settings.max_capacity == Some(0) {
            trace!(cache = %self.name, key, "zero capacity, not stored");
            return;
        }
        let mut dropped = 0;
        if entries.len() >= entries.cap().get() && !entries.contains(&key) {
            dropped += purge(entries, now);
        }
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.evictions.fetch_add(dropped as u64, Ordering::Relaxed);
            debug!(cache = %self.name, dropped, "capacity reached");
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

fn purge(entries: &mut LruCache<String, Entry>, now: Instant) -> usize {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.is_expired(now))
        .map(|(k, _)| k.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}
