//! In-memory lock store
//!
//! Emulates the Lua scripts with the same reply semantics: one mutex guards all
//! records, so every operation is atomic with respect to the others. Expiry is
//! evaluated lazily against `tokio::time::Instant`, which lets tests drive it
//! with a paused clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

use super::{AcquireOutcome, LockStore, ReleaseOutcome, Subscription, deadline_after};
use crate::error::Result;
use crate::identity::OwnerToken;

const CHANNEL_CAPACITY: usize = 64;

enum Record {
    /// Write-held: the owner token
    Exclusive(String),
    /// Read-held: owner token -> hold count
    Shared(HashMap<String, u64>),
}

struct Entry {
    record: Record,
    expires_at: Instant,
}

impl Entry {
    fn ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Single-process lock store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    channels: DashMap<String, broadcast::Sender<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |tx| tx.receiver_count())
    }

    fn publish(&self, channel: &str) {
        if let Some(tx) = self.channels.get(channel) {
            // No receivers is fine: nobody is waiting.
            let _ = tx.send(());
        }
        self.channels.remove_if(channel, |_, tx| tx.receiver_count() == 0);
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
    }

    /// Drop every expired record; run before a new key is inserted so
    /// abandoned keys do not pile up.
    fn cleanup_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, e| e.expires_at > now);
    }

    fn release(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
        shared: bool,
    ) -> ReleaseOutcome {
        let outcome = {
            let mut entries = self.entries.lock();
            Self::purge_expired(&mut entries, key, Instant::now());

            let outcome = match entries.get_mut(key) {
                None => ReleaseOutcome::AlreadyFree,
                Some(entry) => match &mut entry.record {
                    Record::Exclusive(owner) if owner.as_str() == token.as_str() => {
                        ReleaseOutcome::Released
                    }
                    Record::Exclusive(_) => ReleaseOutcome::Mismatch,
                    Record::Shared(_) if !shared => ReleaseOutcome::Mismatch,
                    Record::Shared(holders) => match holders.get_mut(token.as_str()) {
                        None => ReleaseOutcome::Mismatch,
                        Some(count) => {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                holders.remove(token.as_str());
                            }
                            if holders.is_empty() {
                                ReleaseOutcome::Released
                            } else {
                                ReleaseOutcome::StillHeld
                            }
                        }
                    },
                },
            };

            if outcome == ReleaseOutcome::Released {
                entries.remove(key);
            }
            outcome
        };

        if matches!(
            outcome,
            ReleaseOutcome::Released | ReleaseOutcome::AlreadyFree
        ) {
            self.publish(channel);
        }
        outcome
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn acquire_exclusive(
        &self,
        key: &str,
        token: &OwnerToken,
        lease: Duration,
    ) -> Result<AcquireOutcome> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Self::purge_expired(&mut entries, key, now);

        if let Some(entry) = entries.get(key) {
            return Ok(AcquireOutcome::Held { ttl: entry.ttl(now) });
        }

        Self::cleanup_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                record: Record::Exclusive(token.as_str().to_string()),
                expires_at: deadline_after(now, lease),
            },
        );
        Ok(AcquireOutcome::Acquired)
    }

    async fn acquire_shared(
        &self,
        key: &str,
        token: &OwnerToken,
        lease: Duration,
    ) -> Result<AcquireOutcome> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Self::purge_expired(&mut entries, key, now);
        if !entries.contains_key(key) {
            Self::cleanup_expired(&mut entries, now);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            record: Record::Shared(HashMap::new()),
            expires_at: now,
        });

        if let Record::Shared(holders) = &mut entry.record {
            *holders.entry(token.as_str().to_string()).or_insert(0) += 1;
        } else {
            return Ok(AcquireOutcome::Held {
                ttl: entry.ttl(now),
            });
        }
        entry.expires_at = entry.expires_at.max(deadline_after(now, lease));
        Ok(AcquireOutcome::Acquired)
    }

    async fn renew(&self, key: &str, token: &OwnerToken, lease: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Self::purge_expired(&mut entries, key, now);

        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        let held = match &entry.record {
            Record::Exclusive(owner) => owner == token.as_str(),
            Record::Shared(holders) => holders.contains_key(token.as_str()),
        };
        if held {
            entry.expires_at = deadline_after(now, lease);
        }
        Ok(held)
    }

    async fn release_exclusive(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
    ) -> Result<ReleaseOutcome> {
        Ok(self.release(key, channel, token, false))
    }

    async fn release_shared(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
    ) -> Result<ReleaseOutcome> {
        Ok(self.release(key, channel, token, true))
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        Self::purge_expired(&mut entries, key, now);
        Ok(entries.get(key).map(|e| e.ttl(now)))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        // Forget channels whose subscribers are all gone
        self.channels.retain(|_, tx| tx.receiver_count() > 0);

        let rx = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        // A lagged receiver still means "something was released".
        Ok(BroadcastStream::new(rx).map(|_| ()).boxed())
    }
}
