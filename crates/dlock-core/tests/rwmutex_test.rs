//! RwMutex behaviour against the in-memory store

mod common;

use std::sync::Arc;
use std::time::Duration;

use dlock_core::{LockContext, RwMutex};
use tokio::time::{self, Instant};

use common::{init_tracing, options, two_nodes};

#[tokio::test(start_paused = true)]
async fn test_writer_waits_for_all_readers() -> anyhow::Result<()> {
    init_tracing();
    let ctx = LockContext::in_memory();
    let lock = Arc::new(RwMutex::new(&ctx, "catalog", options(10_000, 30_000)).await?);

    let r1 = lock.rlock_as("r1").await?;
    let r2 = lock.rlock_as("r2").await?;

    let started = Instant::now();
    let writer = tokio::spawn({
        let lock = lock.clone();
        async move { lock.lock_as("w").await }
    });

    time::sleep(Duration::from_millis(100)).await;
    lock.runlock(r1).await?;
    time::sleep(Duration::from_millis(100)).await;
    assert!(!writer.is_finished());

    lock.runlock(r2).await?;
    let guard = writer.await??;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(200));
    assert!(waited < Duration::from_secs(1), "waited {:?}", waited);

    // Readers now wait for the writer in turn
    assert!(lock.try_rlock().await?.is_none());
    let reader = tokio::spawn({
        let lock = lock.clone();
        async move { lock.rlock_as("r3").await }
    });
    time::sleep(Duration::from_millis(50)).await;
    assert!(!reader.is_finished());

    lock.unlock(guard).await?;
    let reader = reader.await??;
    lock.runlock(reader).await?;
    assert!(!lock.is_locked().await?);
    Ok(())
}

#[tokio::test]
async fn test_readers_on_different_nodes_share() -> anyhow::Result<()> {
    let (node_a, node_b) = two_nodes();
    let lock_a = RwMutex::new(&node_a, "catalog", options(10_000, 200)).await?;
    let lock_b = RwMutex::new(&node_b, "catalog", options(10_000, 200)).await?;

    let a = lock_a.rlock().await?;
    let b = lock_b.rlock().await?;
    assert_ne!(a.token(), b.token());

    let err = lock_b.lock().await.unwrap_err();
    assert!(err.is_timeout());

    lock_a.runlock(a).await?;
    lock_b.runlock(b).await?;
    let guard = lock_b.lock().await?;
    lock_b.unlock(guard).await?;
    Ok(())
}

#[tokio::test]
async fn test_reentrant_read_within_task() -> anyhow::Result<()> {
    let ctx = LockContext::in_memory();
    let lock = RwMutex::new(&ctx, "catalog", options(10_000, 200)).await?;

    let outer = lock.rlock().await?;
    let inner = lock.rlock().await?;
    assert_eq!(outer.token(), inner.token());

    lock.runlock(inner).await?;
    assert!(lock.is_locked().await?);
    lock.runlock(outer).await?;
    assert!(!lock.is_locked().await?);
    Ok(())
}

#[tokio::test]
async fn test_runlock_by_non_reader() -> anyhow::Result<()> {
    let (node_a, node_b) = two_nodes();
    let lock_a = RwMutex::new(&node_a, "catalog", options(10_000, 200)).await?;
    let lock_b = RwMutex::new(&node_b, "catalog", options(10_000, 200)).await?;

    let reader = lock_a.rlock_as("reader").await?;
    let err = lock_b
        .runlock_as(&node_b.token("reader"))
        .await
        .unwrap_err();
    assert!(err.is_mismatch());
    assert!(lock_a.is_locked().await?);

    lock_a.runlock(reader).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_read_lease_renewed_while_held() -> anyhow::Result<()> {
    let ctx = LockContext::in_memory();
    let lock = RwMutex::new(&ctx, "catalog", options(2_000, 200)).await?;

    let reader = lock.rlock().await?;
    for _ in 0..20 {
        time::sleep(Duration::from_millis(250)).await;
        assert!(lock.remaining_lease().await?.is_some());
    }
    lock.runlock(reader).await?;
    assert!(!lock.is_locked().await?);
    Ok(())
}
