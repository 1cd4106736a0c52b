// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key suppression of duplicate in-flight async work.
//!
//! This crate provides [`Flight`], which collapses concurrent executions of the
//! same operation (identified by a key) into a single one. The first caller for
//! a key becomes the *leader* and runs the supplied closure; callers that arrive
//! while the leader is still working become *followers*, wait without running
//! anything, and receive a clone of the leader's result.
//!
//! Once a result has been delivered the key is retired, so a later call with the
//! same key starts a fresh execution. `Flight` deduplicates concurrency, it does
//! not memoize.
//!
//! # Example
//!
//! ```
//! use oneflight::Flight;
//!
//! # futures::executor::block_on(async {
//! let flight: Flight<String, String> = Flight::new();
//!
//! let outcome = flight
//!     .work("user:42".to_string(), || async {
//!         // Expensive work runs at most once per key at a time, no matter
//!         // how many callers show up while it is in progress.
//!         "loaded".to_string()
//!     })
//!     .await;
//!
//! assert_eq!(outcome.value, "loaded");
//! assert!(outcome.led);
//! # });
//! ```
//!
//! # Cancellation
//!
//! Dropping the leader's future before it completes does not strand the
//! followers: one of them is promoted to leader and runs its own closure. Every
//! caller therefore observes the outcome of exactly one execution.
//!
//! # Thread Safety
//!
//! [`Flight`] is `Send` and `Sync` and is usually shared behind an `Arc` or
//! stored in a long-lived structure. The returned futures do not require the
//! closure or its output to be `Send`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use event_listener::Event;
use parking_lot::Mutex;

/// Deduplicates concurrent executions of keyed async work.
///
/// See the [crate docs](crate) for an overview and examples.
pub struct Flight<K, T> {
    calls: Mutex<HashMap<K, Arc<Call<T>>>>,
}

/// The result of one [`Flight::work`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Outcome<T> {
    /// The value produced by whichever caller executed the work.
    pub value: T,
    /// True if this caller executed the work itself; false if it reused a
    /// result produced under another caller's execution.
    pub led: bool,
}

/// State shared between every caller waiting on one key.
struct Call<T> {
    /// Written once by the leader that completes; lock-free reads afterwards.
    result: OnceLock<T>,
    /// Lowered (notified) when the result lands or the leader disappears.
    done: Event,
    /// Number of callers currently executing the work. Either 0 or 1; it drops
    /// back to 0 only when a leader's future is dropped before completing.
    leaders: AtomicUsize,
}

impl<T> Call<T> {
    fn new() -> Self {
        Self {
            result: OnceLock::new(),
            done: Event::new(),
            leaders: AtomicUsize::new(0),
        }
    }
}

/// Decrements the leader count when a leader's future is dropped mid-work, and
/// wakes one follower so it can take over.
struct LeaderGuard<T> {
    call: Option<Arc<Call<T>>>,
}

impl<T> LeaderGuard<T> {
    fn new(call: &Arc<Call<T>>) -> Self {
        Self {
            call: Some(Arc::clone(call)),
        }
    }

    /// Consumes the guard without touching the leader count; called once the
    /// result is stored and the count no longer matters.
    fn disarm(mut self) {
        self.call.take();
    }
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            let previous = call.leaders.fetch_sub(1, Ordering::AcqRel);
            if previous == 1 && call.result.get().is_none() {
                call.done.notify(1);
            }
        }
    }
}

impl<K, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            calls: Mutex::default(),
        }
    }
}

impl<K, T> std::fmt::Debug for Flight<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}

impl<K, T> Flight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    /// Creates an empty flight group.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes `func` for `key`, unless an execution for the same key is
    /// already in progress, in which case this caller waits for it instead.
    ///
    /// The returned [`Outcome`] carries the shared value and whether this
    /// caller was the one that executed `func`. The closure is taken by every
    /// caller but invoked by at most one of them (or by a promoted follower if
    /// the original leader is cancelled).
    pub async fn work<F, Fut>(&self, key: K, func: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let (call, first) = {
            let mut calls = self.calls.lock();
            match calls.get(&key) {
                Some(call) => (Arc::clone(call), false),
                None => {
                    let call = Arc::new(Call::new());
                    call.leaders.store(1, Ordering::Release);
                    calls.insert(key.clone(), Arc::clone(&call));
                    (call, true)
                }
            }
        };

        if first {
            let value = self.lead(&key, &call, func).await;
            Outcome { value, led: true }
        } else {
            self.follow(key, &call, func).await
        }
    }

    /// Runs the work as the (sole) leader and broadcasts the result.
    async fn lead<F, Fut>(&self, key: &K, call: &Arc<Call<T>>, func: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = LeaderGuard::new(call);

        // A previous leader may have finished between this caller joining and
        // being promoted.
        if let Some(value) = call.result.get() {
            guard.disarm();
            return value.clone();
        }

        let value = func().await;

        if call.result.set(value.clone()).is_ok() {
            // Retire the key so later callers start a fresh execution. Callers
            // that joined before this point still read the stored result.
            self.calls.lock().remove(key);
        }

        call.done.notify(usize::MAX);
        guard.disarm();

        value
    }

    /// Waits for a leader's result, taking over as leader if every leader is
    /// cancelled before one completes.
    async fn follow<F, Fut>(&self, key: K, call: &Arc<Call<T>>, func: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            if let Some(value) = call.result.get() {
                return Outcome {
                    value: value.clone(),
                    led: false,
                };
            }

            // Register before re-checking so a notification between the check
            // and the await cannot be missed.
            let listener = call.done.listen();

            if let Some(value) = call.result.get() {
                return Outcome {
                    value: value.clone(),
                    led: false,
                };
            }

            if call
                .leaders
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // The leader vanished without a result; this follower takes over.
                let value = self.lead(&key, call, func).await;
                return Outcome { value, led: true };
            }

            listener.await;
        }
    }
}
