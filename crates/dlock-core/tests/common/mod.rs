//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dlock_core::{LockContext, LockOptions, LockStore, MemoryStore};

/// Install a test-writer subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn options(lease_ms: u64, max_wait_ms: u64) -> LockOptions {
    LockOptions::default()
        .with_lease(Duration::from_millis(lease_ms))
        .with_max_wait(Duration::from_millis(max_wait_ms))
}

/// Two contexts standing in for two processes over one store.
pub fn two_nodes() -> (LockContext, LockContext) {
    let store: Arc<dyn LockStore> = Arc::new(MemoryStore::new());
    (
        LockContext::with_instance_id(store.clone(), "node-a"),
        LockContext::with_instance_id(store, "node-b"),
    )
}
