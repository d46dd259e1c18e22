//! dlock Common - Shared types and configuration
//!
//! This crate provides the foundational pieces used by the lock crates:
//! - Error codes (namespace/code pairs) for cross-service identification
//! - Configuration loading from files and environment

pub mod error;
pub mod settings;

// Re-exports for convenience
pub use error::ErrorCode;
pub use settings::Configuration;

/// Namespace carried by every dlock error code
pub const ERROR_NAMESPACE: &str = "dlock";

/// Default lease duration in milliseconds
pub const DEFAULT_LEASE_MS: u64 = 10_000;

/// Default maximum wait duration in milliseconds
pub const DEFAULT_MAX_WAIT_MS: u64 = 30_000;

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
