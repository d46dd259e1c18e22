//! Mutex behaviour against the in-memory store
//!
//! Timing-sensitive cases run on a paused clock, so waits and leases advance
//! deterministically.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dlock_common::error::{MISMATCH, WAIT_TIMEOUT};
use dlock_core::{LockContext, LockOptions, Mutex};
use tokio::time::{self, Instant};

use common::{init_tracing, options, two_nodes};

#[tokio::test(start_paused = true)]
async fn test_mutual_exclusion() -> anyhow::Result<()> {
    init_tracing();
    let ctx = LockContext::in_memory();
    let counter = Arc::new(AtomicU64::new(0));
    let inside = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..8 {
        let ctx = ctx.clone();
        let counter = counter.clone();
        let inside = inside.clone();
        workers.push(tokio::spawn(async move {
            let mutex = Mutex::new(&ctx, "counter", options(10_000, 30_000)).await?;
            for _ in 0..5 {
                let guard = mutex.lock().await?;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);

                // Deliberately racy read-modify-write
                let value = counter.load(Ordering::SeqCst);
                time::sleep(Duration::from_millis(1)).await;
                counter.store(value + 1, Ordering::SeqCst);

                inside.fetch_sub(1, Ordering::SeqCst);
                mutex.unlock(guard).await?;
            }
            anyhow::Ok(())
        }));
    }

    for worker in workers {
        worker.await??;
    }
    assert_eq!(counter.load(Ordering::SeqCst), 40);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_waiter_wakes_on_release() -> anyhow::Result<()> {
    init_tracing();
    let ctx = LockContext::in_memory();
    let mutex = Arc::new(Mutex::new(&ctx, "report", options(10_000, 30_000)).await?);

    let holder = mutex.lock_as("holder").await?;
    let started = Instant::now();
    let waiter = tokio::spawn({
        let mutex = mutex.clone();
        async move { mutex.lock_as("waiter").await }
    });

    time::sleep(Duration::from_millis(100)).await;
    mutex.unlock(holder).await?;

    let guard = waiter.await??;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(100));
    // Far below the 10s the waiter would sleep on the holder's TTL
    assert!(waited < Duration::from_secs(1), "waited {:?}", waited);

    assert_eq!(guard.token().unit_id(), "waiter");
    mutex.unlock(guard).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout() -> anyhow::Result<()> {
    let ctx = LockContext::in_memory();
    let mutex = Mutex::new(&ctx, "report", options(10_000, 500)).await?;

    let holder = mutex.lock_as("holder").await?;
    let started = Instant::now();
    let err = mutex.lock_as("waiter").await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.code(), WAIT_TIMEOUT);
    assert_eq!(started.elapsed(), Duration::from_millis(500));

    // The holder is unaffected
    mutex.unlock(holder).await?;
    Ok(())
}

#[tokio::test]
async fn test_unlock_with_foreign_token() -> anyhow::Result<()> {
    let (node_a, node_b) = two_nodes();
    let mutex_a = Mutex::new(&node_a, "report", options(10_000, 200)).await?;
    let mutex_b = Mutex::new(&node_b, "report", options(10_000, 200)).await?;

    let guard = mutex_a.lock_as("worker").await?;

    // Same unit name on another node is a different owner
    let err = mutex_b.unlock_as(&node_b.token("worker")).await.unwrap_err();
    assert!(err.is_mismatch());
    assert_eq!(err.code(), MISMATCH);
    assert!(mutex_b.try_lock().await?.is_none());

    mutex_a.unlock(guard).await?;
    let guard = mutex_b.try_lock().await?.expect("released by node-a");
    mutex_b.unlock(guard).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_after_expiry_is_ok() -> anyhow::Result<()> {
    let ctx = LockContext::in_memory();
    let mutex = Mutex::new(&ctx, "report", options(1_000, 200)).await?;

    let guard = mutex.lock().await?;
    let token = guard.token().clone();
    // Dropping the guard stops renewal; the record lapses with the lease
    drop(guard);
    time::sleep(Duration::from_millis(1_100)).await;
    assert!(!mutex.is_locked().await?);

    mutex.unlock_as(&token).await?;
    mutex.unlock_as(&token).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lease_renewed_while_held() -> anyhow::Result<()> {
    let ctx = LockContext::in_memory();
    let mutex = Mutex::new(&ctx, "report", options(2_000, 200)).await?;

    let guard = mutex.lock().await?;
    let held_until = Instant::now() + Duration::from_secs(5);
    while Instant::now() < held_until {
        time::sleep(Duration::from_millis(250)).await;
        let ttl = mutex.remaining_lease().await?;
        assert!(ttl.is_some_and(|t| t > Duration::ZERO), "ttl {:?}", ttl);
    }
    mutex.unlock(guard).await?;

    assert_eq!(mutex.remaining_lease().await?, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_guard_lets_waiter_in_after_lease() -> anyhow::Result<()> {
    let (node_a, node_b) = two_nodes();
    let mutex_a = Mutex::new(&node_a, "report", options(1_000, 5_000)).await?;
    let mutex_b = Mutex::new(&node_b, "report", options(1_000, 5_000)).await?;

    let guard = mutex_a.lock().await?;
    drop(guard);

    let started = Instant::now();
    let guard = mutex_b.lock().await?;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(900), "waited {:?}", waited);
    assert!(waited <= Duration::from_millis(1_100), "waited {:?}", waited);

    mutex_b.unlock(guard).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_wait_and_lease() -> anyhow::Result<()> {
    let ctx = LockContext::in_memory();
    let forever = LockOptions::default().with_max_wait(Duration::MAX);
    let mutex = Mutex::new(&ctx, "report", forever).await?;

    let guard = mutex.lock_as("a").await?;
    mutex.unlock(guard).await?;

    let mutex = Mutex::new(&ctx, "report", forever.with_lease(Duration::MAX)).await?;
    let guard = mutex.lock_as("a").await?;
    assert!(mutex.remaining_lease().await?.is_some());
    mutex.unlock(guard).await?;
    Ok(())
}
