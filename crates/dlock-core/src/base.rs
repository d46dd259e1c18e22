//! State and wait loop shared by `Mutex` and `RwMutex`

use std::sync::Arc;
use std::time::Duration;

use dlock_common::{Configuration, DEFAULT_LEASE_MS, DEFAULT_MAX_WAIT_MS};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::context::LockContext;
use crate::error::{LockError, Result};
use crate::guard::{AnyGuard, Hold, LockGuard, ReadGuard};
use crate::identity::{OwnerToken, channel_name};
use crate::renewal::RenewalTask;
use crate::store::{AcquireOutcome, LockStore, ReleaseOutcome, Subscription, deadline_after};

/// Poll interval used when the holder's record reports no TTL.
const NO_TTL_POLL: Duration = Duration::from_millis(100);

/// Delay before the first resubscribe attempt; doubles on failure.
const RESUBSCRIBE_MIN: Duration = Duration::from_millis(100);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(5);

/// Longest lease given to a record; longer leases are clamped to it.
pub const MAX_LEASE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Per-lock lease settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Lease of a record; renewed every third of it while held
    pub lease: Duration,
    /// Longest time `lock`/`rlock` waits before `WaitTimeout`
    pub max_wait: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_millis(DEFAULT_LEASE_MS),
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

impl LockOptions {
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            lease: configuration.lease_duration(),
            max_wait: configuration.max_wait(),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Replace zero durations with the defaults and clamp the lease to
    /// [`MAX_LEASE`].
    ///
    /// `max_wait` may be as long as `Duration::MAX`, meaning "wait forever".
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            lease: if self.lease.is_zero() {
                defaults.lease
            } else {
                self.lease.min(MAX_LEASE)
            },
            max_wait: if self.max_wait.is_zero() {
                defaults.max_wait
            } else {
                self.max_wait
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Exclusive,
    Shared,
}

/// Name, lease settings and wake subscription of one lock instance.
///
/// The subscription is opened in `new`, before any acquire attempt, and a
/// listener task turns its messages into bumps of a `watch` counter. Waiters
/// mark the counter seen before each attempt, so a release published between
/// "observed held" and "started waiting" still wakes them.
pub(crate) struct LockBase {
    ctx: LockContext,
    name: String,
    channel: String,
    options: LockOptions,
    wake: watch::Receiver<u64>,
    listener: JoinHandle<()>,
}

impl LockBase {
    pub(crate) async fn new(ctx: &LockContext, name: String, options: LockOptions) -> Result<Self> {
        let options = options.normalized();
        let channel = channel_name(&name);
        let subscription = ctx.store().subscribe(&channel).await?;
        let (wake_tx, wake) = watch::channel(0u64);

        let listener = tokio::spawn(Self::listen(
            ctx.store().clone(),
            channel.clone(),
            subscription,
            wake_tx,
        ));

        Ok(Self {
            ctx: ctx.clone(),
            name,
            channel,
            options,
            wake,
            listener,
        })
    }

    /// Turn release notices into bumps of the wake counter.
    ///
    /// A subscription that ends (e.g. its connection dropped) is replaced,
    /// retrying with backoff. Waiters get one extra wake after each
    /// resubscribe since notices sent in between were lost.
    async fn listen(
        store: Arc<dyn LockStore>,
        channel: String,
        mut subscription: Subscription,
        wake_tx: watch::Sender<u64>,
    ) {
        loop {
            while subscription.next().await.is_some() {
                wake_tx.send_modify(|seq| *seq = seq.wrapping_add(1));
            }
            warn!(channel = %channel, "Lock channel subscription ended, resubscribing");

            let mut backoff = RESUBSCRIBE_MIN;
            subscription = loop {
                time::sleep(backoff).await;
                match store.subscribe(&channel).await {
                    Ok(next) => break next,
                    Err(e) => {
                        warn!(
                            channel = %channel,
                            error = %e,
                            "Lock channel resubscribe failed"
                        );
                        backoff = (backoff * 2).min(RESUBSCRIBE_MAX);
                    }
                }
            };

            debug!(channel = %channel, "Lock channel resubscribed");
            wake_tx.send_modify(|seq| *seq = seq.wrapping_add(1));
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn options(&self) -> LockOptions {
        self.options
    }

    pub(crate) fn token(&self, unit: &str) -> OwnerToken {
        self.ctx.token(unit)
    }

    async fn attempt(&self, token: &OwnerToken, mode: Mode) -> Result<AcquireOutcome> {
        let store = self.ctx.store();
        match mode {
            Mode::Exclusive => {
                store
                    .acquire_exclusive(&self.name, token, self.options.lease)
                    .await
            }
            Mode::Shared => {
                store
                    .acquire_shared(&self.name, token, self.options.lease)
                    .await
            }
        }
    }

    fn hold(&self, token: OwnerToken, mode: Mode) -> Hold {
        debug!(key = %self.name, token = %token, mode = ?mode, "Lock acquired");
        let renewal = RenewalTask::spawn(
            self.ctx.store().clone(),
            self.name.clone(),
            token.clone(),
            self.options.lease,
        );
        Hold {
            name: self.name.clone(),
            token,
            renewal,
        }
    }

    /// Single attempt, no waiting.
    pub(crate) async fn try_acquire(&self, token: OwnerToken, mode: Mode) -> Result<Option<Hold>> {
        match self.attempt(&token, mode).await? {
            AcquireOutcome::Acquired => Ok(Some(self.hold(token, mode))),
            AcquireOutcome::Held { .. } => Ok(None),
        }
    }

    /// Retry until acquired or `max_wait` elapses.
    ///
    /// Between attempts the caller sleeps until the first of: the deadline,
    /// the holder's remaining TTL, or a release notice. Waiters are not
    /// ordered; every wake lets all of them race for the key.
    pub(crate) async fn acquire(&self, token: OwnerToken, mode: Mode) -> Result<Hold> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.options.max_wait);
        let mut wake = self.wake.clone();
        let mut wake_open = true;

        loop {
            let _ = wake.borrow_and_update();

            let ttl = match self.attempt(&token, mode).await? {
                AcquireOutcome::Acquired => return Ok(self.hold(token, mode)),
                AcquireOutcome::Held { ttl } => ttl,
            };
            let poll = if ttl.is_zero() { NO_TTL_POLL } else { ttl };
            trace!(key = %self.name, token = %token, ttl = ?ttl, "Lock held, waiting");

            tokio::select! {
                biased;
                _ = time::sleep_until(deadline) => {
                    let waited = started.elapsed();
                    debug!(key = %self.name, token = %token, waited = ?waited, "Lock wait timed out");
                    return Err(LockError::WaitTimeout {
                        name: self.name.clone(),
                        waited,
                    });
                }
                changed = wake.changed(), if wake_open => {
                    if changed.is_err() {
                        warn!(key = %self.name, "Lock channel closed, falling back to TTL polling");
                        wake_open = false;
                    }
                }
                _ = time::sleep(poll) => {}
            }
        }
    }

    /// Stop the hold's watchdog, then release its record.
    ///
    /// A hold issued by another lock is handed back untouched, renewal
    /// included, inside [`LockError::ForeignGuard`].
    pub(crate) async fn release_hold(&self, hold: Hold, mode: Mode) -> Result<()> {
        if hold.name != self.name {
            warn!(
                key = %self.name,
                guard = %hold.name,
                token = %hold.token,
                "Guard belongs to another lock"
            );
            let guard = match mode {
                Mode::Exclusive => AnyGuard::Write(LockGuard { hold }),
                Mode::Shared => AnyGuard::Read(ReadGuard { hold }),
            };
            return Err(LockError::ForeignGuard {
                name: self.name.clone(),
                guard,
            });
        }

        let Hold { token, renewal, .. } = hold;
        renewal.stop().await;
        self.release(&token, mode).await
    }

    pub(crate) async fn release(&self, token: &OwnerToken, mode: Mode) -> Result<()> {
        let store = self.ctx.store();
        let outcome = match mode {
            Mode::Exclusive => {
                store
                    .release_exclusive(&self.name, &self.channel, token)
                    .await?
            }
            Mode::Shared => {
                store
                    .release_shared(&self.name, &self.channel, token)
                    .await?
            }
        };

        match outcome {
            ReleaseOutcome::Released => {
                debug!(key = %self.name, token = %token, mode = ?mode, "Lock released");
            }
            ReleaseOutcome::StillHeld => {
                debug!(key = %self.name, token = %token, "Read hold released, lock still held");
            }
            ReleaseOutcome::AlreadyFree => {
                debug!(key = %self.name, token = %token, "Lock already expired before release");
            }
            ReleaseOutcome::Mismatch => {
                warn!(key = %self.name, token = %token, mode = ?mode, "Release by non-owner");
                return Err(LockError::Mismatch {
                    name: self.name.clone(),
                    token: token.to_string(),
                });
            }
        }
        Ok(())
    }

    pub(crate) async fn remaining_lease(&self) -> Result<Option<Duration>> {
        self.ctx.store().remaining_ttl(&self.name).await
    }
}

impl Drop for LockBase {
    fn drop(&mut self) {
        // Drops the subscription with the task, closing its connection.
        self.listener.abort();
    }
}
