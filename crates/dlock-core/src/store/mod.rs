//! Backing store abstraction
//!
//! A [`LockStore`] exposes the five atomic lock operations plus pub/sub. The
//! Redis implementation runs them as Lua scripts; the in-memory one emulates
//! the same semantics under a single mutex for tests and single-process use.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::time::Instant;

use crate::error::{LockError, Result};
use crate::identity::OwnerToken;
use crate::scripts;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Stream of wake notices from a notification channel.
///
/// Dropping it unsubscribes and releases the underlying connection.
pub type Subscription = BoxStream<'static, ()>;

/// Result of an acquire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock
    Acquired,
    /// The lock is held elsewhere; `ttl` is its remaining lease (zero if unknown)
    Held { ttl: Duration },
}

impl AcquireOutcome {
    /// Decode an acquire script reply: nil means acquired, an integer is the
    /// remaining TTL in milliseconds (negative when the store reports none).
    pub fn from_reply(reply: Option<i64>) -> Self {
        match reply {
            None => AcquireOutcome::Acquired,
            Some(ttl_ms) => AcquireOutcome::Held {
                ttl: Duration::from_millis(ttl_ms.max(0) as u64),
            },
        }
    }
}

/// Result of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The record was deleted and a release notice published
    Released,
    /// Shared hold dropped but readers remain; nothing published
    StillHeld,
    /// The key had already expired; a release notice was published anyway
    AlreadyFree,
    /// The record belongs to another owner; nothing changed
    Mismatch,
}

impl ReleaseOutcome {
    pub fn from_code(script: &'static str, code: i64) -> Result<Self> {
        match code {
            scripts::RELEASED => Ok(ReleaseOutcome::Released),
            scripts::STILL_HELD => Ok(ReleaseOutcome::StillHeld),
            scripts::ALREADY_FREE => Ok(ReleaseOutcome::AlreadyFree),
            scripts::MISMATCH => Ok(ReleaseOutcome::Mismatch),
            reply => Err(LockError::UnexpectedReply { script, reply }),
        }
    }
}

/// Atomic lock operations against a single backing store
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create the exclusive record if the key is free.
    async fn acquire_exclusive(
        &self,
        key: &str,
        token: &OwnerToken,
        lease: Duration,
    ) -> Result<AcquireOutcome>;

    /// Add one shared hold for `token` unless a writer holds the key.
    async fn acquire_shared(
        &self,
        key: &str,
        token: &OwnerToken,
        lease: Duration,
    ) -> Result<AcquireOutcome>;

    /// Reset the key's TTL to `lease` if `token` still holds it.
    async fn renew(&self, key: &str, token: &OwnerToken, lease: Duration) -> Result<bool>;

    /// Delete the exclusive record owned by `token` and publish on `channel`.
    async fn release_exclusive(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
    ) -> Result<ReleaseOutcome>;

    /// Drop one shared hold of `token`; publish on `channel` once the key is gone.
    async fn release_shared(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
    ) -> Result<ReleaseOutcome>;

    /// Remaining TTL of the key, `None` when it does not exist.
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Subscribe to a notification channel.
    ///
    /// The subscription is active once this returns.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

/// Stand-in for "never" when a deadline does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Lease in whole milliseconds, at least one.
pub(crate) fn lease_millis(lease: Duration) -> u64 {
    u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// `from + after`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(from: Instant, after: Duration) -> Instant {
    from.checked_add(after).unwrap_or_else(|| from + FAR_FUTURE)
}
