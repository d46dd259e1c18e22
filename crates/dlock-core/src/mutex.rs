//! Distributed exclusive lock

use std::time::Duration;

use crate::base::{LockBase, LockOptions, Mode};
use crate::context::LockContext;
use crate::error::Result;
use crate::guard::LockGuard;
use crate::identity::{OwnerToken, unit_id};

/// Exclusive lock on one store key, shared across processes.
///
/// The key holds the owner token while locked. A watchdog renews the lease
/// every third of it until `unlock`, and waiters sleep on the key's
/// notification channel instead of polling.
///
/// ```no_run
/// use dlock_core::{LockContext, LockOptions, Mutex};
///
/// # async fn run() -> dlock_core::Result<()> {
/// let ctx = LockContext::connect("redis://127.0.0.1:6379/0").await?;
/// let mutex = Mutex::new(&ctx, "orders:42", LockOptions::default()).await?;
///
/// let guard = mutex.lock().await?;
/// // critical section
/// mutex.unlock(guard).await?;
/// # Ok(())
/// # }
/// ```
pub struct Mutex {
    base: LockBase,
}

impl Mutex {
    /// Create the lock and subscribe to its notification channel.
    pub async fn new(
        ctx: &LockContext,
        name: impl Into<String>,
        options: LockOptions,
    ) -> Result<Self> {
        let base = LockBase::new(ctx, name.into(), options).await?;
        Ok(Self { base })
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn options(&self) -> LockOptions {
        self.base.options()
    }

    /// Acquire for the current task, waiting up to `max_wait`.
    pub async fn lock(&self) -> Result<LockGuard> {
        self.lock_as(&unit_id()).await
    }

    /// Acquire for an explicit concurrency unit of this process.
    pub async fn lock_as(&self, unit: &str) -> Result<LockGuard> {
        let hold = self
            .base
            .acquire(self.base.token(unit), Mode::Exclusive)
            .await?;
        Ok(LockGuard { hold })
    }

    /// Acquire only if the lock is free right now.
    pub async fn try_lock(&self) -> Result<Option<LockGuard>> {
        let hold = self
            .base
            .try_acquire(self.base.token(&unit_id()), Mode::Exclusive)
            .await?;
        Ok(hold.map(|hold| LockGuard { hold }))
    }

    /// Stop renewal and release.
    ///
    /// Releasing a lock whose lease already expired succeeds. Fails with
    /// `Mismatch` if another owner holds it now. A guard issued by a lock with
    /// a different name is refused with `ForeignGuard`, which hands it back
    /// still renewing (see [`LockError::into_guard`](crate::LockError::into_guard)).
    pub async fn unlock(&self, guard: LockGuard) -> Result<()> {
        self.base.release_hold(guard.hold, Mode::Exclusive).await
    }

    /// Release a record created under `token`, e.g. one persisted from
    /// [`LockGuard::token`]. Any renewal still running for it stops on its own
    /// once the record is gone.
    pub async fn unlock_as(&self, token: &OwnerToken) -> Result<()> {
        self.base.release(token, Mode::Exclusive).await
    }

    /// Remaining lease of the current holder, `None` when free.
    pub async fn remaining_lease(&self) -> Result<Option<Duration>> {
        self.base.remaining_lease().await
    }

    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self.remaining_lease().await?.is_some())
    }
}
