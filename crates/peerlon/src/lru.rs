// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entry-count-bounded LRU storage.
//!
//! [`Lru`] keeps its recency order in a slab of index-linked nodes (head =
//! most recent, tail = oldest) with a free list for slot recycling, alongside
//! a `HashMap` from key to slot. Recency is approximate by design: the
//! byte-budgeted tier that wraps this structure evicts oldest-first until its
//! budget is satisfied, and does not need exact ordering.
//!
//! The structure is not synchronized; callers wrap it in their own lock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Sentinel index meaning "no node".
const NIL: usize = usize::MAX;

struct Node<K, V> {
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
}

/// An LRU map from `K` to `V` bounded by entry count.
///
/// A `max_entries` of zero means unbounded; the caller then bounds the
/// structure itself, typically by bytes, via [`remove_oldest`](Self::remove_oldest).
/// An optional eviction callback observes every removal.
pub struct Lru<K, V> {
    max_entries: usize,
    on_evict: Option<Box<dyn FnMut(K, V) + Send>>,
    nodes: Vec<Node<K, V>>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
    free: usize,
}

impl<K, V> Lru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates an LRU holding at most `max_entries` entries (zero = unbounded).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            on_evict: None,
            nodes: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            free: NIL,
        }
    }

    /// Creates an LRU that reports every removed entry to `on_evict`.
    ///
    /// The callback fires after the entry has been unlinked, receiving the
    /// removed pair by value. It fires for explicit removals as well as for
    /// capacity evictions; it does not fire when an existing key is
    /// overwritten in place.
    #[must_use]
    pub fn with_evict(max_entries: usize, on_evict: impl FnMut(K, V) + Send + 'static) -> Self {
        Self {
            on_evict: Some(Box::new(on_evict)),
            ..Self::new(max_entries)
        }
    }

    /// The number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts a value, replacing and re-fronting any existing entry for the
    /// key, then evicts oldest entries while over capacity.
    pub fn add(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            self.unlink(idx);
            self.push_front(idx);
            self.nodes[idx].entry = Some((key, value));
            return;
        }

        let idx = self.alloc();
        self.nodes[idx].entry = Some((key.clone(), value));
        self.push_front(idx);
        self.index.insert(key, idx);

        while self.max_entries != 0 && self.index.len() > self.max_entries {
            self.remove_oldest();
        }
    }

    /// Looks up a value and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.unlink(idx);
        self.push_front(idx);
        self.nodes[idx].entry.as_ref().map(|(_, value)| value)
    }

    /// Removes the entry for `key`, if present.
    pub fn remove<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(&idx) = self.index.get(key) {
            self.remove_node(idx);
        }
    }

    /// Removes the oldest entry. Returns false when the map is empty.
    pub fn remove_oldest(&mut self) -> bool {
        if self.tail == NIL {
            return false;
        }
        self.remove_node(self.tail);
        true
    }

    fn remove_node(&mut self, idx: usize) {
        self.unlink(idx);
        let (key, value) = self.nodes[idx].entry.take().expect("linked node holds an entry");
        self.index.remove(&key);

        // Recycle the slot.
        self.nodes[idx].next = self.free;
        self.free = idx;

        if let Some(on_evict) = &mut self.on_evict {
            on_evict(key, value);
        }
    }

    fn alloc(&mut self) -> usize {
        if self.free != NIL {
            let idx = self.free;
            self.free = self.nodes[idx].next;
            return idx;
        }
        self.nodes.push(Node {
            entry: None,
            prev: NIL,
            next: NIL,
        });
        self.nodes.len() - 1
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev == NIL {
            if self.head == idx {
                self.head = next;
            }
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            if self.tail == idx {
                self.tail = prev;
            }
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }
}

impl<K, V> fmt::Debug for Lru<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lru")
            .field("max_entries", &self.max_entries)
            .field("len", &self.index.len())
            .finish_non_exhaustive()
    }
}
