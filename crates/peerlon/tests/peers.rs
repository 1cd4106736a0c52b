// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for peer dispatch, hot-cache sampling, and fallback.
//!
//! This binary registers a per-group picker once; the factory hands each test
//! group its own picker, keyed by group name.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use bytes::Bytes;
use peerlon::{
    CacheKind, Error, GetRequest, GetResponse, Getter, NoPeers, PeerPicker, ProtoGetter, Result, Sink, StringSink,
    new_group, register_per_group_peer_picker,
};

/// Peer stub that answers `peer:<key>`, or fails every fetch.
struct StubPeer {
    fail: bool,
}

#[async_trait]
impl ProtoGetter for StubPeer {
    async fn get(&self, request: &GetRequest, response: &mut GetResponse) -> Result<()> {
        if self.fail {
            return Err(Error::peer("stub peer is down".to_string()));
        }
        response.value = Bytes::from(format!("peer:{}", request.key));
        Ok(())
    }
}

/// Picker that nominates the same remote peer for every key.
struct AlwaysRemote {
    peer: Arc<StubPeer>,
}

impl PeerPicker for AlwaysRemote {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn ProtoGetter>> {
        Some(Arc::clone(&self.peer) as Arc<dyn ProtoGetter>)
    }
}

/// Getter that must never run.
struct UnreachableGetter;

#[async_trait]
impl Getter for UnreachableGetter {
    async fn get(&self, key: &str, _dest: &mut dyn Sink) -> Result<()> {
        unreachable!("getter invoked for remotely owned key {key}");
    }
}

/// Getter that answers `local` for every key.
struct LocalGetter;

#[async_trait]
impl Getter for LocalGetter {
    async fn get(&self, _key: &str, dest: &mut dyn Sink) -> Result<()> {
        dest.set_string("local")
    }
}

fn ensure_picker_registered() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        register_per_group_peer_picker(|group_name| match group_name {
            "hot_sampling" | "hot_rereads" => Arc::new(AlwaysRemote {
                peer: Arc::new(StubPeer { fail: false }),
            }),
            "peer_fallback" => Arc::new(AlwaysRemote {
                peer: Arc::new(StubPeer { fail: true }),
            }),
            _ => Arc::new(NoPeers),
        });
    });
}

#[tokio::test]
async fn remote_values_are_sampled_into_the_hot_cache() {
    ensure_picker_registered();
    let group = new_group("hot_sampling", 1 << 20, UnreachableGetter);

    for i in 0..1000 {
        let key = format!("k{i}");
        let mut out = String::new();
        group.get(&key, &mut StringSink::new(&mut out)).await.expect("peer read");
        assert_eq!(out, format!("peer:{key}"));
    }

    assert_eq!(group.stats().peer_loads.get(), 1000);
    assert_eq!(group.stats().local_loads.get(), 0);
    assert_eq!(group.cache_stats(CacheKind::Main).items, 0);

    // ~1 in 10 of the 1000 remote reads lands in the hot tier. The bounds
    // leave several standard deviations of slack on either side.
    let hot_items = group.cache_stats(CacheKind::Hot).items;
    assert!((60..=150).contains(&hot_items), "hot tier holds {hot_items} items");
}

#[tokio::test]
async fn hot_cached_keys_skip_the_peer_on_rereads() {
    ensure_picker_registered();
    let group = new_group("hot_rereads", 1 << 20, UnreachableGetter);

    for round in 0..2 {
        for i in 0..1000 {
            let key = format!("k{i}");
            let mut out = String::new();
            group.get(&key, &mut StringSink::new(&mut out)).await.expect("read");
            assert_eq!(out, format!("peer:{key}"), "round {round}");
        }
    }

    // The second round finds every key sampled during the first round in the
    // hot tier; everything else goes back to the peer.
    let hits = group.stats().cache_hits.get();
    let sampled = group.cache_stats(CacheKind::Hot).items;
    assert!(hits > 0, "some rereads must land in the hot tier");
    assert!(hits <= sampled, "hits ({hits}) cannot exceed sampled keys ({sampled})");
    assert_eq!(group.stats().peer_loads.get() + hits, 2000);
}

#[tokio::test]
async fn peer_failure_falls_back_to_the_local_getter() {
    ensure_picker_registered();
    let group = new_group("peer_fallback", 1 << 20, LocalGetter);

    let mut out = String::new();
    group.get("k", &mut StringSink::new(&mut out)).await.expect("fallback read");

    assert_eq!(out, "local");
    assert_eq!(group.stats().peer_errors.get(), 1);
    assert_eq!(group.stats().local_loads.get(), 1);
    assert_eq!(group.stats().peer_loads.get(), 0);
}

#[tokio::test]
async fn unconfigured_groups_own_every_key() {
    ensure_picker_registered();
    let group = new_group("locally_owned", 1 << 20, LocalGetter);

    let mut out = String::new();
    group.get("k", &mut StringSink::new(&mut out)).await.expect("local read");

    assert_eq!(out, "local");
    assert_eq!(group.stats().peer_loads.get(), 0);
    assert_eq!(group.stats().peer_errors.get(), 0);
}
