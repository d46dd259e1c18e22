//! Lease renewal (watchdog)
//!
//! Every acquisition spawns one renewal task that resets the key's TTL each
//! `lease / 3`. The task ends when:
//! - the owner stops it (unlock), which waits for it to finish
//! - the handle is dropped, which aborts it
//! - the store reports the token no longer holds the key

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::identity::OwnerToken;
use crate::store::{LockStore, deadline_after};

/// Renewal period for a lease: one third of it, at least one millisecond.
pub fn renewal_interval(lease: Duration) -> Duration {
    (lease / 3).max(Duration::from_millis(1))
}

/// Handle to a running renewal task
pub struct RenewalTask {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RenewalTask {
    pub fn spawn(
        store: Arc<dyn LockStore>,
        key: String,
        token: OwnerToken,
        lease: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let period = renewal_interval(lease);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(deadline_after(Instant::now(), period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match store.renew(&key, &token, lease).await {
                            Ok(true) => {
                                trace!(key = %key, token = %token, "Lease renewed");
                            }
                            Ok(false) => {
                                debug!(
                                    key = %key,
                                    token = %token,
                                    "Lease no longer held, stopping renewal"
                                );
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    key = %key,
                                    token = %token,
                                    error = %e,
                                    "Lease renewal failed, retrying next tick"
                                );
                            }
                        }
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop the task and wait until it has exited.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for RenewalTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
