//! Command-line client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Caller-side connection policy. The server itself has no timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How long one attempt may take to reach LOGGED
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Attempts allowed after a port or timeout failure; ssh failures are final
    pub max_retries: u32,

    pub retry_delay: RetryDelay,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_delay: RetryDelay::default(),
        }
    }
}

/// Pause between connection attempts, growing by `factor` up to `limit`
/// with up to `jitter` of random extra
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDelay {
    #[serde(with = "duration_millis")]
    pub first: Duration,

    #[serde(with = "duration_millis")]
    pub limit: Duration,

    pub factor: f64,

    pub jitter: f64,
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            limit: Duration::from_secs(15),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}
