//! Redis-backed lock store

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{AcquireOutcome, LockStore, ReleaseOutcome, Subscription, lease_millis};
use crate::error::Result;
use crate::identity::OwnerToken;
use crate::scripts::ScriptRegistry;

/// Lock store over a single Redis server.
///
/// Commands share one auto-reconnecting [`ConnectionManager`]; every
/// subscription opens its own pub/sub connection, closed when the
/// subscription is dropped.
///
/// A subscription does not reconnect: its stream ends when the pub/sub
/// connection drops. Locks notice the end and call [`LockStore::subscribe`]
/// again with backoff, polling the holder's TTL in the meantime.
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    scripts: ScriptRegistry,
}

impl RedisStore {
    /// Connect to `url` and load the lock scripts.
    ///
    /// Fails with [`LockError::ScriptLoad`](crate::LockError::ScriptLoad) if the
    /// server refuses any script.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        Self::with_client(client).await
    }

    pub async fn with_client(client: Client) -> Result<Self> {
        let conn = client.get_connection_manager().await?;
        let scripts = ScriptRegistry::new();
        scripts.load(&mut conn.clone()).await?;

        info!(
            addr = %client.get_connection_info().addr,
            "Connected Redis lock store"
        );

        Ok(Self {
            client,
            conn,
            scripts,
        })
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn acquire_exclusive(
        &self,
        key: &str,
        token: &OwnerToken,
        lease: Duration,
    ) -> Result<AcquireOutcome> {
        let mut conn = self.conn.clone();
        let reply: Option<i64> = self
            .scripts
            .acquire_exclusive
            .key(key)
            .arg(token.as_str())
            .arg(lease_millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(AcquireOutcome::from_reply(reply))
    }

    async fn acquire_shared(
        &self,
        key: &str,
        token: &OwnerToken,
        lease: Duration,
    ) -> Result<AcquireOutcome> {
        let mut conn = self.conn.clone();
        let reply: Option<i64> = self
            .scripts
            .acquire_shared
            .key(key)
            .arg(token.as_str())
            .arg(lease_millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(AcquireOutcome::from_reply(reply))
    }

    async fn renew(&self, key: &str, token: &OwnerToken, lease: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let renewed: i64 = self
            .scripts
            .renew
            .key(key)
            .arg(token.as_str())
            .arg(lease_millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn release_exclusive(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
    ) -> Result<ReleaseOutcome> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .scripts
            .release_exclusive
            .key(key)
            .key(channel)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        ReleaseOutcome::from_code("release_exclusive", code)
    }

    async fn release_shared(
        &self,
        key: &str,
        channel: &str,
        token: &OwnerToken,
    ) -> Result<ReleaseOutcome> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .scripts
            .release_shared
            .key(key)
            .key(channel)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        ReleaseOutcome::from_code("release_shared", code)
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let ttl_ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(match ttl_ms {
            // -2: no such key
            -2 => None,
            // -1: key without expiry
            ms => Some(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel = %channel, "Subscribed to lock channel");

        Ok(pubsub.into_on_message().map(|_| ()).boxed())
    }
}
