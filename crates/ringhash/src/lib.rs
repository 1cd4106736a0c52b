// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Consistent hashing over a sorted virtual-node ring.
//!
//! This crate provides [`Ring`], which maps keys to the member that owns them.
//! Each member contributes a fixed number of virtual points to a ring of 32-bit
//! hashes; a key is owned by the member whose point is the first one at or after
//! the key's own hash, wrapping around at the top of the hash space.
//!
//! Because each member is scattered across the ring many times, adding or
//! removing a member only reassigns the keys adjacent to that member's points,
//! leaving the rest of the keyspace untouched.
//!
//! # Example
//!
//! ```
//! use ringhash::Ring;
//!
//! let mut ring = Ring::new(50);
//! ring.add(["cache-a", "cache-b", "cache-c"]);
//!
//! let owner = ring.get("user:4711").expect("ring is not empty");
//! assert!(owner.starts_with("cache-"));
//! ```
//!
//! # Thread Safety
//!
//! [`Ring`] is a plain value with no interior mutability. Callers that share a
//! ring across threads serialize mutation themselves; the intended pattern for
//! membership changes is to build a fresh ring and swap it in atomically.

use std::collections::HashMap;
use std::fmt;

/// A function hashing arbitrary bytes onto the 32-bit ring.
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Maps keys to owning members using a virtual-node hash ring.
pub struct Ring {
    replicas: usize,
    hash: HashFn,
    /// Virtual points, sorted ascending. Duplicates are allowed.
    points: Vec<u32>,
    /// Point hash to owning member. On collision the first writer wins.
    owners: HashMap<u32, String>,
}

impl Ring {
    /// Creates an empty ring where each member contributes `replicas` virtual
    /// points, hashed with a stable 32-bit checksum.
    ///
    /// # Panics
    ///
    /// Panics if `replicas` is 0.
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32fast::hash)
    }

    /// Creates an empty ring using a caller-provided hash function.
    ///
    /// The distribution of keys across members is only as good as the hash;
    /// any well-distributed 32-bit hash makes point collisions negligible.
    ///
    /// # Panics
    ///
    /// Panics if `replicas` is 0.
    #[must_use]
    pub fn with_hasher(replicas: usize, hash: impl Fn(&[u8]) -> u32 + Send + Sync + 'static) -> Self {
        assert!(replicas > 0, "a ring needs at least one virtual point per member");
        Self {
            replicas,
            hash: Box::new(hash),
            points: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Returns true if no members have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Adds members to the ring.
    ///
    /// Each member contributes exactly `replicas` points, hashed from the
    /// replica index concatenated with the member name, and the point list is
    /// re-sorted. Adding the same member twice doubles its share of the ring;
    /// callers that want idempotent membership updates should rebuild a fresh
    /// ring from the full member set instead.
    pub fn add<I, S>(&mut self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for member in members {
            let member = member.into();
            for replica in 0..self.replicas {
                let point = (self.hash)(format!("{replica}{member}").as_bytes());
                self.points.push(point);
                self.owners.entry(point).or_insert_with(|| member.clone());
            }
        }
        self.points.sort_unstable();
    }

    /// Returns the member that owns `key`, or `None` if the ring is empty.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());

        // First point at or after the key's hash, wrapping to the start of the
        // ring when the key hashes past the last point.
        let idx = self.points.partition_point(|&point| point < hash);
        let point = self.points[if idx == self.points.len() { 0 } else { idx }];

        self.owners.get(&point).map(String::as_str)
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("replicas", &self.replicas)
            .field("points", &self.points.len())
            .finish_non_exhaustive()
    }
}
