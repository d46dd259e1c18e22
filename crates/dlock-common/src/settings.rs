//! Configuration management for dlock
//!
//! Settings are read from an optional YAML file and then from `DLOCK_`
//! prefixed environment variables, which take precedence:
//!
//! | Key          | Environment       | Default                    |
//! |--------------|-------------------|----------------------------|
//! | `redis.url`  | `DLOCK_REDIS_URL` | `redis://127.0.0.1:6379/0` |
//! | `lease.ms`   | `DLOCK_LEASE_MS`  | `10000`                    |
//! | `wait.ms`    | `DLOCK_WAIT_MS`   | `30000`                    |

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};

use crate::{DEFAULT_LEASE_MS, DEFAULT_MAX_WAIT_MS, DEFAULT_REDIS_URL};

/// Default configuration file, loaded when present
pub const DEFAULT_CONFIG_FILE: &str = "conf/dlock.yml";

pub const REDIS_URL_PROPERTY: &str = "redis.url";
pub const LEASE_MS_PROPERTY: &str = "lease.ms";
pub const WAIT_MS_PROPERTY: &str = "wait.ms";

/// Lock configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load `conf/dlock.yml` (if it exists) overlaid with the environment.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Some(Path::new(DEFAULT_CONFIG_FILE)))
    }

    /// Load the given file (optional, may be missing) overlaid with the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("DLOCK")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        Ok(Configuration { config })
    }

    /// Wrap an already built `Config`.
    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    pub fn redis_url(&self) -> String {
        self.config
            .get_string(REDIS_URL_PROPERTY)
            .unwrap_or(DEFAULT_REDIS_URL.to_string())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.positive_millis(LEASE_MS_PROPERTY, DEFAULT_LEASE_MS))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.positive_millis(WAIT_MS_PROPERTY, DEFAULT_MAX_WAIT_MS))
    }

    // Non-positive values fall back to the default.
    fn positive_millis(&self, key: &str, default: u64) -> u64 {
        match self.config.get_int(key) {
            Ok(v) if v > 0 => v as u64,
            _ => default,
        }
    }
}
