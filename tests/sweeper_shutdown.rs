//! Background sweeper lifecycle against a real runtime and clock.

#![cfg(feature = "async")]

use std::time::Duration;

use tierguard::{CacheKey, SetOptions, Tier, TierGuard};

#[tokio::test]
async fn test_sweeper_reclaims_expired_entries_in_background() {
    let guard = TierGuard::builder()
        .with_sweep_intervals(Duration::from_millis(20), Duration::from_millis(20))
        .build()
        .unwrap();

    guard.cache_set(
        CacheKey::simple("analyze", "ephemeral"),
        &"v",
        SetOptions::new("analyze", "model-a", Tier::Free).with_ttl(Duration::from_millis(1)),
    );
    assert_eq!(guard.cache_stats(0).entries, 1);

    guard.start_sweeper();

    // A couple of sweep periods is plenty.
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(guard.cache_stats(0).entries, 0);
    assert!(guard.metrics().cache_expirations() >= 1);

    guard.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_the_sweeps() {
    let guard = TierGuard::builder()
        .with_sweep_intervals(Duration::from_millis(10), Duration::from_millis(10))
        .build()
        .unwrap();

    guard.start_sweeper();
    tokio::time::sleep(Duration::from_millis(50)).await;
    guard.shutdown().await;

    // An entry expiring after shutdown stays resident until someone looks.
    guard.cache_set(
        CacheKey::simple("analyze", "left behind"),
        &"v",
        SetOptions::new("analyze", "model-a", Tier::Free).with_ttl(Duration::from_millis(1)),
    );
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(guard.cache_stats(0).entries, 1);
}

#[tokio::test]
async fn test_shutdown_without_start_is_a_noop() {
    let guard = TierGuard::new();
    guard.shutdown().await;
    guard.shutdown().await;
}

#[tokio::test]
async fn test_restart_after_shutdown() {
    let guard = TierGuard::builder()
        .with_sweep_intervals(Duration::from_millis(10), Duration::from_millis(10))
        .build()
        .unwrap();

    guard.start_sweeper();
    guard.shutdown().await;

    // A fresh sweeper can be started on the same guard.
    guard.cache_set(
        CacheKey::simple("analyze", "second life"),
        &"v",
        SetOptions::new("analyze", "model-a", Tier::Free).with_ttl(Duration::from_millis(1)),
    );
    guard.start_sweeper();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(guard.cache_stats(0).entries, 0);
    guard.shutdown().await;
}
