//! dlock Core - Distributed locks over a shared Redis key
//!
//! This crate provides:
//! - `Mutex`: exclusive lock across processes
//! - `RwMutex`: shared/exclusive lock on the same kind of key
//! - Lease renewal (watchdog) for held locks
//! - Wake-up of waiters through pub/sub instead of busy polling
//! - `RedisStore` (Lua scripts) and `MemoryStore` (single process) backends
//!
//! Locks are acquired through guards carrying the owner token, and released by
//! handing the guard back, so release never depends on which task calls it.

pub mod base;
pub mod context;
pub mod error;
pub mod guard;
pub mod identity;
pub mod mutex;
pub mod renewal;
pub mod rwmutex;
pub mod scripts;
pub mod store;

// Re-export commonly used types
pub use base::LockOptions;
pub use context::LockContext;
pub use error::{LockError, Result};
pub use guard::{AnyGuard, LockGuard, ReadGuard};
pub use identity::{OwnerToken, channel_name, unit_id};
pub use mutex::Mutex;
pub use rwmutex::RwMutex;
pub use store::{AcquireOutcome, LockStore, MemoryStore, RedisStore, ReleaseOutcome, Subscription};
