// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The group engine: the read pipeline tying the pieces together.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use oneflight::Flight;
use parking_lot::RwLock;
use rand::Rng;

use crate::cache::{ByteCache, CacheStats};
use crate::error::Result;
use crate::peers::{self, ProtoGetter};
use crate::sink::Sink;
use crate::stats::Stats;
use crate::view::ByteView;
use crate::wire::{GetRequest, GetResponse};

/// One out of this many peer-served values is copied into the hot cache.
///
/// A peer-served value is popular by definition (at least two peers consulted
/// it); sampling amortizes cross-peer round trips for re-reads without letting
/// remote keys churn the local working set.
const HOT_SAMPLE_ONE_IN: u32 = 10;

/// The hot tier receives this fraction of a group's byte budget; the rest
/// belongs to the main tier.
const HOT_BUDGET_FRACTION: u64 = 8;

/// Loads authoritative values for the keys this process owns.
///
/// Implemented by the application embedding the cache. On success the getter
/// must call exactly one setter on `dest`.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Produces the value for `key` into `dest`.
    async fn get(&self, key: &str, dest: &mut dyn Sink) -> Result<()>;
}

/// Selects one of a group's two cache tiers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheKind {
    /// Values this peer owns and loaded itself.
    Main,
    /// Values owned by other peers, sampled in opportunistically.
    Hot,
}

/// A named keyspace with one backend getter and a two-tier cache.
///
/// Groups are created with [`new_group`] and shared behind `Arc`; every method
/// takes `&self` and is safe to call from any task.
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    cache_bytes: u64,
    main_cache: ByteCache,
    hot_cache: ByteCache,
    load_flight: Flight<String, Result<ByteView>>,
    stats: Stats,
}

/// Process-wide registry of groups by name.
static GROUPS: LazyLock<RwLock<HashMap<String, Arc<Group>>>> = LazyLock::new(RwLock::default);

/// Creates and registers a group.
///
/// `cache_bytes` bounds the combined size of the group's two cache tiers;
/// zero disables caching for the group entirely. Groups live for the life of
/// the process.
///
/// # Panics
///
/// Panics if a group named `name` already exists.
pub fn new_group(name: impl Into<String>, cache_bytes: u64, getter: impl Getter + 'static) -> Arc<Group> {
    let name = name.into();
    let mut groups = GROUPS.write();
    assert!(!groups.contains_key(&name), "duplicate registration of group {name}");

    let group = Arc::new(Group::new(name.clone(), cache_bytes, Arc::new(getter)));
    groups.insert(name, Arc::clone(&group));
    group
}

/// Returns the previously created group named `name`.
#[must_use]
pub fn get_group(name: &str) -> Option<Arc<Group>> {
    GROUPS.read().get(name).cloned()
}

impl Group {
    fn new(name: String, cache_bytes: u64, getter: Arc<dyn Getter>) -> Self {
        let hot_bytes = cache_bytes / HOT_BUDGET_FRACTION;
        Self {
            name,
            getter,
            cache_bytes,
            main_cache: ByteCache::new(cache_bytes - hot_bytes),
            hot_cache: ByteCache::new(hot_bytes),
            load_flight: Flight::new(),
            stats: Stats::default(),
        }
    }

    /// The name this group was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group's traffic counters.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// A snapshot of one cache tier's counters.
    #[must_use]
    pub fn cache_stats(&self, kind: CacheKind) -> CacheStats {
        match kind {
            CacheKind::Main => self.main_cache.stats(),
            CacheKind::Hot => self.hot_cache.stats(),
        }
    }

    /// Reads the value for `key` into `dest`.
    ///
    /// The value comes from this peer's caches when present; otherwise from
    /// the owning peer, or from the backend getter when this peer owns the key
    /// (or the owner cannot be reached). Concurrent reads of the same missing
    /// key share a single load.
    ///
    /// # Errors
    ///
    /// Returns the backend getter's error verbatim, or a serialization error
    /// from `dest`. Peer failures are not surfaced here; they fall back to a
    /// local load and are tallied in [`Stats::peer_errors`].
    pub async fn get(&self, key: &str, dest: &mut dyn Sink) -> Result<()> {
        self.stats.gets.add(1);

        if let Some(value) = self.lookup_cache(key) {
            self.stats.cache_hits.add(1);
            return dest.set_view(value);
        }

        let (value, dest_populated) = self.load(key, &mut *dest).await?;
        if dest_populated {
            // The getter already wrote through this caller's sink.
            return Ok(());
        }
        dest.set_view(value)
    }

    /// Loads `key`, deduplicating concurrent loads. Returns the loaded view
    /// and whether it was delivered through this caller's sink already.
    async fn load(&self, key: &str, dest: &mut dyn Sink) -> Result<(ByteView, bool)> {
        self.stats.loads.add(1);

        let mut dest_populated = false;
        let outcome = self
            .load_flight
            .work(key.to_owned(), || self.load_once(key, dest, &mut dest_populated))
            .await;

        if !outcome.led {
            self.stats.loads_deduped.add(1);
        }
        Ok((outcome.value?, dest_populated))
    }

    /// The single (per key, per flight) load execution.
    async fn load_once(&self, key: &str, dest: &mut dyn Sink, dest_populated: &mut bool) -> Result<ByteView> {
        // A previous flight may have landed the value between this caller's
        // cache miss and its turn in the flight map.
        if let Some(value) = self.lookup_cache(key) {
            self.stats.cache_hits.add(1);
            return Ok(value);
        }

        // Resolved on every load so transport membership changes take effect
        // immediately.
        let picker = peers::picker_for(&self.name);
        if let Some(peer) = picker.pick_peer(key) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => {
                    self.stats.peer_loads.add(1);
                    if rand::rng().random_ratio(1, HOT_SAMPLE_ONE_IN) {
                        self.populate_cache(key, value.clone(), CacheKind::Hot);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    self.stats.peer_errors.add(1);
                    tracing::debug!(group = %self.name, key, %error, "peer load failed, retrying locally");
                }
            }
        }

        self.stats.local_loads.add(1);
        if let Err(error) = self.getter.get(key, &mut *dest).await {
            self.stats.local_load_errs.add(1);
            return Err(error);
        }

        let value = dest.view()?;
        *dest_populated = true;
        self.populate_cache(key, value.clone(), CacheKind::Main);
        Ok(value)
    }

    async fn get_from_peer(&self, peer: &dyn ProtoGetter, key: &str) -> Result<ByteView> {
        let request = GetRequest {
            group: self.name.clone(),
            key: key.to_owned(),
        };
        let mut response = GetResponse::default();
        peer.get(&request, &mut response).await?;
        Ok(ByteView::from_bytes(response.value))
    }

    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        if self.cache_bytes == 0 {
            return None;
        }
        self.main_cache.get(key).or_else(|| self.hot_cache.get(key))
    }

    fn populate_cache(&self, key: &str, value: ByteView, kind: CacheKind) {
        if self.cache_bytes == 0 {
            return;
        }

        let cache = match kind {
            CacheKind::Main => &self.main_cache,
            CacheKind::Hot => &self.hot_cache,
        };
        cache.add(key.to_owned(), value);

        // Each tier enforces its own budget above; this loop restores the
        // combined invariant if the tiers ever disagree, shrinking whichever
        // tier is over its share.
        loop {
            let main_bytes = self.main_cache.bytes();
            let hot_bytes = self.hot_cache.bytes();
            if main_bytes + hot_bytes <= self.cache_bytes {
                return;
            }

            let victim = if hot_bytes > main_bytes / HOT_BUDGET_FRACTION {
                &self.hot_cache
            } else {
                &self.main_cache
            };
            if !victim.remove_oldest() {
                return;
            }
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache_bytes", &self.cache_bytes)
            .finish_non_exhaustive()
    }
}
