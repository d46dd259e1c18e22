//! Error codes for dlock
//!
//! Every error surfaced by the lock crates maps onto one of these codes so that
//! callers in other services can identify it by `(namespace, code)` without
//! parsing messages.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ERROR_NAMESPACE;

/// Error code structure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub namespace: &'a str,
    pub code: i32,
    pub message: &'a str,
}

impl Display for ErrorCode<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: {}", self.namespace, self.code, self.message)
    }
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    namespace: ERROR_NAMESPACE,
    code: 0,
    message: "success",
};

// Lock acquisition and release
pub const WAIT_TIMEOUT: ErrorCode<'static> = ErrorCode {
    namespace: ERROR_NAMESPACE,
    code: 10001,
    message: "timed out waiting for lock",
};

pub const MISMATCH: ErrorCode<'static> = ErrorCode {
    namespace: ERROR_NAMESPACE,
    code: 10002,
    message: "lock not held by this owner",
};

// Backing store
pub const STORE_ERROR: ErrorCode<'static> = ErrorCode {
    namespace: ERROR_NAMESPACE,
    code: 20001,
    message: "lock store error",
};

pub const SCRIPT_LOAD_ERROR: ErrorCode<'static> = ErrorCode {
    namespace: ERROR_NAMESPACE,
    code: 20002,
    message: "failed to load lock script",
};

pub const UNEXPECTED_REPLY: ErrorCode<'static> = ErrorCode {
    namespace: ERROR_NAMESPACE,
    code: 20003,
    message: "unexpected lock script reply",
};
