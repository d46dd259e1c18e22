//! Shared execution context for locks

use std::sync::{Arc, LazyLock};

use dlock_common::Configuration;
use uuid::Uuid;

use crate::error::Result;
use crate::identity::OwnerToken;
use crate::store::{LockStore, MemoryStore, RedisStore};

/// Random identifier of this process, the first half of every owner token.
static INSTANCE_ID: LazyLock<String> = LazyLock::new(|| Uuid::new_v4().to_string());

/// Store connection plus process identity, shared by every lock built from it.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct LockContext {
    store: Arc<dyn LockStore>,
    instance_id: Arc<str>,
}

impl LockContext {
    /// Context over `store` using the process-wide instance id.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_instance_id(store, INSTANCE_ID.as_str())
    }

    /// Context with an explicit instance id, e.g. to stand in for another
    /// process sharing the same store.
    pub fn with_instance_id(store: Arc<dyn LockStore>, instance_id: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
        }
    }

    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let store = RedisStore::connect(url).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Connect to the Redis server named by the configuration.
    pub async fn from_configuration(configuration: &Configuration) -> Result<Self> {
        Self::connect(&configuration.redis_url()).await
    }

    /// Context over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Owner token for `unit` within this process.
    pub fn token(&self, unit: &str) -> OwnerToken {
        OwnerToken::new(&self.instance_id, unit)
    }
}
