//! Lock error types

use std::time::Duration;

use dlock_common::ErrorCode;

use crate::guard::AnyGuard;
use dlock_common::error::{
    MISMATCH, SCRIPT_LOAD_ERROR, STORE_ERROR, UNEXPECTED_REPLY, WAIT_TIMEOUT,
};

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock '{name}'")]
    WaitTimeout { name: String, waited: Duration },

    #[error("lock '{name}' is not held by '{token}'")]
    Mismatch { name: String, token: String },

    /// The guard was issued by another lock; it is returned untouched.
    #[error("guard of lock '{}' cannot release lock '{name}'", .guard.name())]
    ForeignGuard { name: String, guard: AnyGuard },

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("failed to load script '{script}': {source}")]
    ScriptLoad {
        script: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("unexpected reply from script '{script}': {reply}")]
    UnexpectedReply { script: &'static str, reply: i64 },
}

impl LockError {
    /// Stable namespace/code pair for this error.
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            LockError::WaitTimeout { .. } => WAIT_TIMEOUT,
            LockError::Mismatch { .. } | LockError::ForeignGuard { .. } => MISMATCH,
            LockError::Store(_) => STORE_ERROR,
            LockError::ScriptLoad { .. } => SCRIPT_LOAD_ERROR,
            LockError::UnexpectedReply { .. } => UNEXPECTED_REPLY,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::WaitTimeout { .. })
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            LockError::Mismatch { .. } | LockError::ForeignGuard { .. }
        )
    }

    /// Take back the guard of a refused [`LockError::ForeignGuard`] release.
    pub fn into_guard(self) -> Option<AnyGuard> {
        match self {
            LockError::ForeignGuard { guard, .. } => Some(guard),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
