// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The byte-budgeted cache tier wrapping the LRU.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::lru::Lru;
use crate::view::ByteView;

/// A snapshot of one cache tier's counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// Bytes currently stored: Σ (key length + value length).
    pub bytes: u64,
    /// Entries currently stored.
    pub items: u64,
    /// Lookups performed.
    pub gets: u64,
    /// Lookups that found a value.
    pub hits: u64,
    /// Entries removed to stay within the byte budget.
    pub evictions: u64,
}

/// One tier of a group's cache: a mutex-guarded LRU with byte accounting.
///
/// The tier is the single source of truth for its own invariants — every
/// structural operation holds the tier mutex. The counters are atomics so the
/// LRU's eviction callback can share them with the tier itself.
pub(crate) struct ByteCache {
    max_bytes: u64,
    /// Built lazily on the first add, so an untouched tier costs nothing.
    lru: Mutex<Option<Lru<String, ByteView>>>,
    counters: Arc<TierCounters>,
}

#[derive(Debug, Default)]
struct TierCounters {
    bytes: AtomicU64,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl ByteCache {
    /// Creates a tier bounded to `max_bytes` (zero = no byte bound).
    pub(crate) fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            lru: Mutex::new(None),
            counters: Arc::default(),
        }
    }

    /// Stores a value, then evicts oldest entries while over the byte budget.
    pub(crate) fn add(&self, key: String, value: ByteView) {
        let mut guard = self.lru.lock();
        let lru = guard.get_or_insert_with(|| {
            let counters = Arc::clone(&self.counters);
            Lru::with_evict(0, move |key: String, value: ByteView| {
                counters.bytes.fetch_sub(entry_bytes(&key, &value), Ordering::Relaxed);
                counters.evictions.fetch_add(1, Ordering::Relaxed);
            })
        });

        // Replacing an entry re-counts it rather than double-counting it.
        if let Some(old) = lru.get(key.as_str()) {
            self.counters.bytes.fetch_sub(entry_bytes(&key, old), Ordering::Relaxed);
        }
        self.counters.bytes.fetch_add(entry_bytes(&key, &value), Ordering::Relaxed);
        lru.add(key, value);

        while self.max_bytes > 0 && self.counters.bytes.load(Ordering::Relaxed) > self.max_bytes {
            if !lru.remove_oldest() {
                break;
            }
        }
    }

    /// Looks up a value, bumping the get/hit counters.
    pub(crate) fn get(&self, key: &str) -> Option<ByteView> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lru.lock();
        let value = guard.as_mut()?.get(key)?.clone();
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Evicts the oldest entry. Returns false when the tier is empty.
    pub(crate) fn remove_oldest(&self) -> bool {
        let mut guard = self.lru.lock();
        guard.as_mut().is_some_and(Lru::remove_oldest)
    }

    /// Bytes currently stored.
    pub(crate) fn bytes(&self) -> u64 {
        self.counters.bytes.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the tier's counters.
    pub(crate) fn stats(&self) -> CacheStats {
        let items = self.lru.lock().as_ref().map_or(0, Lru::len) as u64;
        CacheStats {
            bytes: self.bytes(),
            items,
            gets: self.counters.gets.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

fn entry_bytes(key: &str, value: &ByteView) -> u64 {
    (key.len() + value.len()) as u64
}

impl fmt::Debug for ByteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteCache")
            .field("max_bytes", &self.max_bytes)
            .field("bytes", &self.bytes())
            .finish_non_exhaustive()
    }
}
