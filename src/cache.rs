//! Bounded LRU caches for parsed entries and query results.
//!
//! Purely a latency optimization: a disabled cache (capacity 0) gives the
//! same answers. Locks are never held while an entry is parsed or a query
//! computed, so two threads missing the same key may both compute it.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;

use crate::entry::EntryRecord;
use crate::query::{QueryKey, QueryResult};
use crate::types::error::Result;
use crate::types::models::EntryKey;

/// Hit/miss counters and occupancy of one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: StoreStats,
    pub queries: StoreStats,
}

struct Store<K: Hash + Eq, V> {
    inner: Option<Mutex<LruCache<K, Arc<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V> Store<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.inner.as_ref().and_then(|lru| lru.lock().get(key).cloned());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn put(&self, key: K, value: Arc<V>) {
        if let Some(lru) = &self.inner {
            lru.lock().put(key, value);
        }
    }

    fn clear(&self) {
        if let Some(lru) = &self.inner {
            lru.lock().clear();
        }
    }

    fn stats(&self) -> StoreStats {
        let (len, capacity) = self
            .inner
            .as_ref()
            .map_or((0, 0), |lru| {
                let lru = lru.lock();
                (lru.len(), lru.cap().get())
            });
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len,
            capacity,
        }
    }
}

/// Entry and query-result caches of one dictionary.
pub struct DictCache {
    entries: Store<EntryKey, EntryRecord>,
    queries: Store<QueryKey, QueryResult>,
}

impl DictCache {
    pub fn new(entry_capacity: usize, query_capacity: usize) -> Self {
        if entry_capacity == 0 || query_capacity == 0 {
            debug!(
                "Cache partly disabled: entries={}, queries={}",
                entry_capacity, query_capacity
            );
        }
        Self {
            entries: Store::new(entry_capacity),
            queries: Store::new(query_capacity),
        }
    }

    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    /// Returns the cached entry or parses it with `load` and caches it.
    pub fn get_entry<F>(&self, key: EntryKey, load: F) -> Result<Arc<EntryRecord>>
    where
        F: FnOnce() -> Result<EntryRecord>,
    {
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry);
        }
        let entry = Arc::new(load()?);
        self.entries.put(key, Arc::clone(&entry));
        Ok(entry)
    }

    /// Returns the cached result or computes and caches it.
    pub fn get_query_result<F>(&self, key: QueryKey, compute: F) -> Arc<QueryResult>
    where
        F: FnOnce() -> Arc<QueryResult>,
    {
        if let Some(result) = self.queries.get(&key) {
            return result;
        }
        let result = compute();
        self.queries.put(key, Arc::clone(&result));
        result
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.queries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.stats(),
            queries: self.queries.stats(),
        }
    }
}

impl std::fmt::Debug for DictCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictCache").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryKind, NormalizedForms};
    use crate::query::QueryMode;
    use crate::types::error::DictError;
    use std::cell::Cell;

    fn result() -> Arc<QueryResult> {
        Arc::new(QueryResult::default())
    }

    #[test]
    fn query_results_are_reused_until_evicted() {
        let cache = DictCache::new(0, 2);
        let computed = Cell::new(0);
        let compute = || {
            computed.set(computed.get() + 1);
            result()
        };

        let a = QueryKey::new("Run", QueryMode::Prefix);
        let b = QueryKey::new("walk", QueryMode::Prefix);
        let c = QueryKey::new("jump", QueryMode::Prefix);
        cache.get_query_result(a.clone(), compute);
        cache.get_query_result(QueryKey::new(" run ", QueryMode::Prefix), compute);
        assert_eq!(computed.get(), 1);

        cache.get_query_result(b, compute);
        cache.get_query_result(c, compute);
        cache.get_query_result(a, compute);
        assert_eq!(computed.get(), 4);

        let stats = cache.stats().queries;
        assert_eq!((stats.hits, stats.misses, stats.len, stats.capacity), (1, 4, 2, 2));
    }

    #[test]
    fn zero_capacity_passes_through() {
        let cache = DictCache::disabled();
        let computed = Cell::new(0);
        for _ in 0..3 {
            cache.get_query_result(QueryKey::new("run", QueryMode::Exact), || {
                computed.set(computed.get() + 1);
                result()
            });
        }
        assert_eq!(computed.get(), 3);
        assert_eq!(cache.stats().queries.len, 0);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let cache = DictCache::new(4, 0);
        let key = EntryKey(3);
        assert!(cache.get_entry(key, || Err(DictError::EntryMissing(key))).is_err());
        assert!(cache.get_entry(key, || Err(DictError::EntryMissing(key))).is_err());
        assert_eq!(cache.stats().entries.misses, 2);
        assert_eq!(cache.stats().entries.len, 0);
    }

    #[test]
    fn clear_empties_both_stores() {
        let cache = DictCache::new(4, 4);
        let key = EntryKey(1);
        let entry = cache
            .get_entry(key, || {
                Ok(EntryRecord {
                    key,
                    headword: "run".to_string(),
                    forms: NormalizedForms::of("run"),
                    kind: EntryKind::Headword,
                    parts_of_speech: Default::default(),
                    variants: Vec::new(),
                    senses: Vec::new(),
                    body: "move swiftly".to_string(),
                    cross_refs: Vec::new(),
                    markup: String::new(),
                })
            })
            .unwrap();
        assert_eq!(entry.headword, "run");
        cache.get_query_result(QueryKey::new("run", QueryMode::Exact), result);
        assert_eq!((cache.stats().entries.len, cache.stats().queries.len), (1, 1));

        cache.clear();
        assert_eq!((cache.stats().entries.len, cache.stats().queries.len), (0, 0));
        let reloaded = Cell::new(false);
        let _ = cache.get_entry(key, || {
            reloaded.set(true);
            Err(DictError::EntryMissing(key))
        });
        assert!(reloaded.get());
    }
}
