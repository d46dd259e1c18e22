//! Distributed reader-writer lock
//!
//! One store key carries both modes:
//! - write-held: a string whose value is the writer's owner token
//! - read-held: a hash of owner token -> hold count
//!
//! Every script checks the key type before mutating, so the two never coexist.
//!
//! ## Fairness
//!
//! There is none. Waiting readers and writers are not queued and writers get
//! no priority: after any release notice (or TTL poll) every waiter retries
//! and whichever script runs first wins. A steady stream of overlapping
//! readers can therefore keep a writer waiting until its `max_wait` elapses.

use std::time::Duration;

use crate::base::{LockBase, LockOptions, Mode};
use crate::context::LockContext;
use crate::error::Result;
use crate::guard::{LockGuard, ReadGuard};
use crate::identity::{OwnerToken, unit_id};

/// Shared/exclusive lock on one store key, shared across processes.
pub struct RwMutex {
    base: LockBase,
}

impl RwMutex {
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

    /// Acquire write mode for the current task; waits while any reader or
    /// writer holds the key.
    pub async fn lock(&self) -> Result<LockGuard> {
        self.lock_as(&unit_id()).await
    }

    pub async fn lock_as(&self, unit: &str) -> Result<LockGuard> {
        let hold = self
            .base
            .acquire(self.base.token(unit), Mode::Exclusive)
            .await?;
        Ok(LockGuard { hold })
    }

    pub async fn try_lock(&self) -> Result<Option<LockGuard>> {
        let hold = self
            .base
            .try_acquire(self.base.token(&unit_id()), Mode::Exclusive)
            .await?;
        Ok(hold.map(|hold| LockGuard { hold }))
    }

    /// Release write mode.
    pub async fn unlock(&self, guard: LockGuard) -> Result<()> {
        self.base.release_hold(guard.hold, Mode::Exclusive).await
    }

    pub async fn unlock_as(&self, token: &OwnerToken) -> Result<()> {
        self.base.release(token, Mode::Exclusive).await
    }

    /// Acquire one read hold for the current task; waits while a writer
    /// holds the key.
    ///
    /// Holds are counted per owner token, so the same task may read-lock
    /// repeatedly; each guard must be released once.
    pub async fn rlock(&self) -> Result<ReadGuard> {
        self.rlock_as(&unit_id()).await
    }

    pub async fn rlock_as(&self, unit: &str) -> Result<ReadGuard> {
        let hold = self
            .base
            .acquire(self.base.token(unit), Mode::Shared)
            .await?;
        Ok(ReadGuard { hold })
    }

    pub async fn try_rlock(&self) -> Result<Option<ReadGuard>> {
        let hold = self
            .base
            .try_acquire(self.base.token(&unit_id()), Mode::Shared)
            .await?;
        Ok(hold.map(|hold| ReadGuard { hold }))
    }

    /// Release one read hold.
    ///
    /// Waiters are only notified once the last hold is gone. A guard from a
    /// differently named lock is handed back in `ForeignGuard`.
    pub async fn runlock(&self, guard: ReadGuard) -> Result<()> {
        self.base.release_hold(guard.hold, Mode::Shared).await
    }

    pub async fn runlock_as(&self, token: &OwnerToken) -> Result<()> {
        self.base.release(token, Mode::Shared).await
    }

    /// Remaining lease of the key in either mode, `None` when free.
    pub async fn remaining_lease(&self) -> Result<Option<Duration>> {
        self.base.remaining_lease().await
    }

    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self.remaining_lease().await?.is_some())
    }
}
