// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the group read pipeline with local ownership.
//!
//! No peer picker is registered in this binary, so every key is owned by the
//! local process.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use peerlon::{ByteView, ByteViewSink, CacheKind, Error, Getter, Result, Sink, StringSink, new_group};

/// Getter that answers `<key>!` after an optional delay, counting invocations.
struct EchoGetter {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl EchoGetter {
    fn new(delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                delay,
            },
            calls,
        )
    }
}

#[async_trait]
impl Getter for EchoGetter {
    async fn get(&self, key: &str, dest: &mut dyn Sink) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        dest.set_string(&format!("{key}!"))
    }
}

/// Getter that always fails.
struct BrokenGetter {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Getter for BrokenGetter {
    async fn get(&self, _key: &str, _dest: &mut dyn Sink) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::loader("backing store unavailable".to_string()))
    }
}

#[tokio::test]
async fn second_read_is_a_cache_hit() {
    let (getter, calls) = EchoGetter::new(Duration::ZERO);
    let group = new_group("local_hits", 1 << 20, getter);

    let mut first = String::new();
    group.get("alpha", &mut StringSink::new(&mut first)).await.expect("load");
    assert_eq!(first, "alpha!");

    let mut second = String::new();
    group.get("alpha", &mut StringSink::new(&mut second)).await.expect("cached read");
    assert_eq!(second, "alpha!");

    assert_eq!(calls.load(Ordering::SeqCst), 1, "the getter must not run for a cached key");
    assert_eq!(group.stats().gets.get(), 2);
    assert_eq!(group.stats().cache_hits.get(), 1);
    assert_eq!(group.stats().local_loads.get(), 1);
}

#[tokio::test]
async fn cached_value_compares_equal_to_the_loaded_one() {
    let (getter, _calls) = EchoGetter::new(Duration::ZERO);
    let group = new_group("cached_roundtrip", 1 << 20, getter);

    let mut loaded = ByteView::default();
    group.get("key", &mut ByteViewSink::new(&mut loaded)).await.expect("load");

    let mut cached = ByteView::default();
    group.get("key", &mut ByteViewSink::new(&mut cached)).await.expect("cached read");

    assert_eq!(loaded, cached);
    assert_eq!(cached, "key!");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_reads_share_one_load() {
    let (getter, calls) = EchoGetter::new(Duration::from_millis(200));
    let group = new_group("dedup", 1 << 20, getter);

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let group = Arc::clone(&group);
        tasks.push(tokio::spawn(async move {
            let mut out = String::new();
            group.get("k", &mut StringSink::new(&mut out)).await.expect("read");
            out
        }));
    }

    for task in tasks {
        assert_eq!(task.await.expect("task panicked"), "k!");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1, "one backend load for 100 readers");
    assert_eq!(group.stats().gets.get(), 100);
    assert_eq!(group.stats().loads_deduped.get(), 99);
    assert_eq!(group.stats().local_loads.get(), 1);
}

#[tokio::test]
async fn byte_budget_bounds_both_tiers() {
    let (getter, calls) = EchoGetter::new(Duration::ZERO);
    let group = new_group("byte_budget", 1024, getter);

    // 8-byte keys, 9-byte values ("<key>!"), 200 of them: far over budget.
    for i in 0..200 {
        let key = format!("k{i:07}");
        let mut out = String::new();
        group.get(&key, &mut StringSink::new(&mut out)).await.expect("read");
    }

    let main = group.cache_stats(CacheKind::Main);
    let hot = group.cache_stats(CacheKind::Hot);
    assert!(main.bytes + hot.bytes <= 1024, "over budget: {} bytes", main.bytes + hot.bytes);
    assert!(main.evictions > 0);
    assert!(main.items < 200);

    // The oldest key fell out, so reading it loads again.
    let before = calls.load(Ordering::SeqCst);
    let mut out = String::new();
    group.get("k0000000", &mut StringSink::new(&mut out)).await.expect("reload");
    assert_eq!(out, "k0000000!");
    assert_eq!(calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test]
async fn getter_errors_surface_and_are_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = new_group(
        "loader_errors",
        1 << 20,
        BrokenGetter {
            calls: Arc::clone(&calls),
        },
    );

    for attempt in 1..=2 {
        let mut out = String::new();
        let error = group
            .get("k", &mut StringSink::new(&mut out))
            .await
            .expect_err("broken getter must fail");
        assert!(matches!(error, Error::Loader(_)), "got {error:?}");
        assert_eq!(calls.load(Ordering::SeqCst), attempt, "errors must not be cached");
    }

    assert_eq!(group.stats().local_load_errs.get(), 2);
    assert_eq!(group.stats().cache_hits.get(), 0);
}

#[tokio::test]
async fn zero_budget_disables_caching() {
    let (getter, calls) = EchoGetter::new(Duration::ZERO);
    let group = new_group("uncached", 0, getter);

    for _ in 0..3 {
        let mut out = String::new();
        group.get("k", &mut StringSink::new(&mut out)).await.expect("read");
        assert_eq!(out, "k!");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(group.stats().cache_hits.get(), 0);
    assert_eq!(group.cache_stats(CacheKind::Main).items, 0);
}
