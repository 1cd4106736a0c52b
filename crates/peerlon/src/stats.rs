// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Monotonic counters describing a group's traffic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic counter that is cheap to bump from concurrent tasks.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Adds `n` to the counter.
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

/// Per-group counters, all monotonic.
///
/// `gets` counts every read; exactly one of `cache_hits`, `peer_loads`, or
/// `local_loads` accounts for where each value ultimately came from, except
/// that reads which piggybacked on another caller's in-flight load count under
/// `loads_deduped` instead.
#[derive(Debug, Default)]
pub struct Stats {
    /// Any read of the group.
    pub gets: Counter,
    /// Reads answered from either cache tier.
    pub cache_hits: Counter,
    /// Values fetched from the owning peer.
    pub peer_loads: Counter,
    /// Peer fetches that failed and fell back to a local load.
    pub peer_errors: Counter,
    /// Reads that missed the caches (`gets` minus `cache_hits`).
    pub loads: Counter,
    /// Reads that reused another caller's in-flight load.
    pub loads_deduped: Counter,
    /// Values loaded by the backend getter in this process.
    pub local_loads: Counter,
    /// Backend getter invocations that failed.
    pub local_load_errs: Counter,
    /// Reads served on behalf of other peers by the transport layer.
    pub server_requests: Counter,
}
