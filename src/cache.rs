//! Concurrent, URL-keyed response cache with LRU eviction.
//!
//! The `lru` crate gives an exact recency-ordered list (O(1) touch/evict).
//! Total byte accounting lives in a sibling `AtomicUsize`, updated under
//! the same mutex that guards the map so no reader can ever observe it
//! out of sync with the entries present. This is a pure memoizer: entries
//! carry no freshness deadline and are never rejected as stale, only
//! evicted under budget pressure.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of distinct fingerprints the underlying `LruCache` will hold
/// before it starts evicting by count; the byte budgets below are the
/// binding constraint in practice, this is just a sane backstop.
pub const CACHE_SIZE: usize = 10_000;
/// Total cache budget across all entries.
pub const MAX_CACHE_BYTES: usize = 200 * 1024 * 1024;
/// Per-entry cap; responses larger than this are never cached.
pub const MAX_ENTRY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub status_line: String,
    pub headers: Vec<String>,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct ProxyCache {
    cache: Arc<Mutex<LruCache<u64, CachedResponse>>>,
    total_size: Arc<AtomicUsize>,
}

impl ProxyCache {
    /// # Panics
    ///
    /// Panics if `CACHE_SIZE` is 0, which should never happen in normal
    /// operation.
    pub fn new() -> Self {
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_SIZE).expect("CACHE_SIZE must be non-zero"),
            ))),
            total_size: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.lock().await;
        cache.is_empty()
    }

    /// Looks up `fp`, refreshing recency on a live hit.
    pub async fn get(&self, fp: u64) -> Option<CachedResponse> {
        let mut cache = self.cache.lock().await;
        cache.get(&fp).cloned()
    }

    /// Inserts or replaces the entry for `fp`. Returns `false` (and leaves
    /// the store unchanged) if `response` alone exceeds `MAX_ENTRY_SIZE`.
    /// Otherwise evicts true-LRU entries until the new entry fits under
    /// `MAX_CACHE_BYTES`.
    pub async fn put(&self, fp: u64, response: CachedResponse) -> bool {
        let entry_size = Self::calculate_entry_size(&response);
        if entry_size > MAX_ENTRY_SIZE {
            return false;
        }

        let mut cache = self.cache.lock().await;

        if let Some(old) = cache.get(&fp) {
            let old_size = Self::calculate_entry_size(old);
            self.total_size.fetch_sub(old_size, Ordering::Relaxed);
        }

        let mut current_size = self.total_size.load(Ordering::Relaxed);
        while current_size + entry_size > MAX_CACHE_BYTES && !cache.is_empty() {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    let evicted_size = Self::calculate_entry_size(&evicted);
                    self.total_size.fetch_sub(evicted_size, Ordering::Relaxed);
                    current_size = self.total_size.load(Ordering::Relaxed);
                }
                None => break,
            }
        }

        cache.put(fp, response);
        self.total_size.fetch_add(entry_size, Ordering::Relaxed);
        true
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.lock().await;
        cache.clear();
        self.total_size.store(0, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.lock().await;
        cache.len()
    }

    pub fn total_size(&self) -> usize {
        self.total_size.load(Ordering::Relaxed)
    }

    fn calculate_entry_size(entry: &CachedResponse) -> usize {
        entry.status_line.len()
            + entry.headers.iter().map(|h| h.len()).sum::<usize>()
            + entry.body.len()
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new()
    }
}
