//! Caller side retry policy around [`Server::connect`]

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use gebr_core::config::{CliConfig, RetryDelay};
use gebr_core::error::CommError;
use gebr_core::types::{ServerErrorKind, ServerState};

use crate::server::{Server, ServerEvent};

/// Growing pause between connection attempts
pub struct ExponentialBackoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Fraction of the delay added at random, 0.0 to 1.0
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn from_config(config: &RetryDelay) -> Self {
        Self::new(config.first, config.limit, config.factor, config.jitter)
    }

    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            current: initial,
            max,
            multiplier,
            jitter,
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = std::cmp::min(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }

    /// Reset the backoff to initial delay
    pub fn reset(&mut self, initial: Duration) {
        self.current = initial;
    }
}

/// Result of waiting on one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Logged,
    Failed(ServerErrorKind, String),
    TimedOut,
}

/// Connect and wait until the server is logged in or gave up
pub async fn attempt(server: &Server, timeout: Duration) -> Result<AttemptOutcome, CommError> {
    if server.state() == ServerState::Logged {
        return Ok(AttemptOutcome::Logged);
    }
    let mut events = server.subscribe();
    server.connect()?;

    let settled = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(ServerEvent::StateChanged { new: ServerState::Logged, .. }) => {
                    return Ok(AttemptOutcome::Logged)
                }
                Ok(ServerEvent::StateChanged {
                    old,
                    new: ServerState::Disconnected,
                }) if old != ServerState::Unknown => {
                    let (kind, message) = server.last_error();
                    return Ok(AttemptOutcome::Failed(kind, message));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(CommError::Closed),
            }
        }
    })
    .await;

    match settled {
        Ok(outcome) => outcome,
        Err(_) => {
            server.disconnect()?;
            Ok(AttemptOutcome::TimedOut)
        }
    }
}

/// Connect with the retry policy of `config`.
///
/// ssh failures (authentication, host key) are final; port and timeout
/// failures are retried up to `max_retries` times.
pub async fn connect_with_retry(server: &Server, config: &CliConfig) -> Result<AttemptOutcome, CommError> {
    let mut backoff = ExponentialBackoff::from_config(&config.retry_delay);
    let mut retries = 0;

    loop {
        let outcome = attempt(server, config.connect_timeout).await?;
        match &outcome {
            AttemptOutcome::Logged => {
                tracing::info!("Connected to {}", server.address());
                return Ok(outcome);
            }
            AttemptOutcome::Failed(ServerErrorKind::Ssh, message) => {
                tracing::warn!("{}: {}", server.address(), message);
                return Ok(outcome);
            }
            _ if retries >= config.max_retries => return Ok(outcome),
            _ => {
                retries += 1;
                let delay = backoff.next_delay();
                tracing::warn!(
                    "Connection to {} failed ({:?}). Retrying in {:?}",
                    server.address(),
                    outcome,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_increases() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
            0.0, // No jitter for deterministic test
        );

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));

        backoff.reset(Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_max() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(60), 1.0, 0.5);
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_secs(15));
        }
    }
}
