// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for [`Flight::work()`].

use std::sync::Arc;
use std::sync::atomic::{
    AtomicUsize,
    Ordering::{AcqRel, Acquire},
};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use oneflight::Flight;

#[tokio::test]
async fn direct_call() {
    let flight: Flight<String, String> = Flight::new();

    let outcome = flight
        .work("key".to_string(), || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "value".to_string()
        })
        .await;

    assert_eq!(outcome.value, "value");
    assert!(outcome.led);
}

#[tokio::test]
async fn concurrent_calls_share_one_execution() {
    let executions = AtomicUsize::default();
    let flight: Flight<String, String> = Flight::new();

    let futures = FuturesUnordered::new();
    for _ in 0..100 {
        futures.push(flight.work("key".to_string(), || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            executions.fetch_add(1, AcqRel);
            "value".to_string()
        }));
    }

    let outcomes: Vec<_> = futures.collect().await;

    assert_eq!(executions.load(Acquire), 1);
    assert!(outcomes.iter().all(|o| o.value == "value"));
    assert_eq!(outcomes.iter().filter(|o| o.led).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| !o.led).count(), 99);
}

#[tokio::test]
async fn distinct_keys_run_independently() {
    let executions = Arc::new(AtomicUsize::default());
    let flight: Arc<Flight<String, usize>> = Arc::new(Flight::new());

    let futures = FuturesUnordered::new();
    for i in 0..10 {
        let flight = Arc::clone(&flight);
        let executions = Arc::clone(&executions);
        futures.push(tokio::spawn(async move {
            flight
                .work(format!("key-{i}"), || async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    executions.fetch_add(1, AcqRel);
                    i
                })
                .await
        }));
    }

    let outcomes: Vec<_> = futures.map(|r| r.expect("task panicked")).collect().await;

    assert_eq!(executions.load(Acquire), 10);
    assert!(outcomes.iter().all(|o| o.led));
}

#[tokio::test]
async fn completed_keys_are_retired() {
    let executions = AtomicUsize::default();
    let flight: Flight<&str, usize> = Flight::new();

    for expected in 1..=3 {
        let outcome = flight
            .work("key", || async {
                executions.fetch_add(1, AcqRel);
                expected
            })
            .await;
        assert_eq!(outcome.value, expected);
        assert!(outcome.led);
    }

    assert_eq!(executions.load(Acquire), 3);
}

#[tokio::test]
async fn failed_executions_are_not_memoized() {
    let executions = AtomicUsize::default();
    let flight: Flight<&str, Result<String, String>> = Flight::new();

    let outcome = flight
        .work("key", || async {
            executions.fetch_add(1, AcqRel);
            Err::<String, _>("boom".to_string())
        })
        .await;
    assert_eq!(outcome.value, Err("boom".to_string()));

    // A failed execution does not pin the key; the next caller retries.
    let outcome = flight
        .work("key", || async {
            executions.fetch_add(1, AcqRel);
            Ok("recovered".to_string())
        })
        .await;
    assert_eq!(outcome.value, Ok("recovered".to_string()));
    assert_eq!(executions.load(Acquire), 2);
}

#[tokio::test]
async fn cancelled_leader_promotes_a_follower() {
    let flight: Arc<Flight<&'static str, String>> = Arc::new(Flight::new());

    // The first caller claims leadership but its work never finishes; the
    // timeout drops the whole future mid-flight.
    let stalled = {
        let flight = Arc::clone(&flight);
        tokio::spawn(async move {
            let work = flight.work("key", || async {
                std::future::pending::<()>().await;
                unreachable!("stalled leader never completes")
            });
            tokio::time::timeout(Duration::from_millis(50), work).await
        })
    };

    // Give the stalled leader time to claim the key, then join as a follower.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let follower = {
        let flight = Arc::clone(&flight);
        tokio::spawn(async move { flight.work("key", || async { "rescued".to_string() }).await })
    };

    assert!(stalled.await.expect("task panicked").is_err(), "leader should time out");

    let outcome = follower.await.expect("task panicked");
    assert_eq!(outcome.value, "rescued");
    assert!(outcome.led, "the follower should have been promoted to leader");
}

#[tokio::test]
async fn late_caller_after_completion_leads_again() {
    let flight: Flight<&str, usize> = Flight::new();

    let first = flight.work("key", || async { 1 }).await;
    let second = flight.work("key", || async { 2 }).await;

    assert_eq!((first.value, first.led), (1, true));
    assert_eq!((second.value, second.led), (2, true));
}
