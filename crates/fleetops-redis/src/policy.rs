//! # Reconnect Policy
//!
//! Retry and failover policy for the shared Redis connection.

use std::time::Duration;

use redis::aio::ConnectionManagerConfig;
use redis::{ErrorKind, RedisError};

/// Error fragment Redis emits when a write hits a non-primary node.
const READONLY_FRAGMENT: &str = "READONLY";

/// Retry and failover policy for the shared connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Per-attempt delay increment
    pub retry_step: Duration,

    /// Upper bound for the retry delay
    pub max_retry_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_step: Duration::from_millis(50),
            max_retry_delay: Duration::from_millis(2000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given reconnect attempt (1-based).
    ///
    /// Grows linearly with the attempt count, clamped to `max_retry_delay`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        (self.retry_step * attempt).min(self.max_retry_delay)
    }

    /// Whether an error should force a fresh connection instead of being
    /// surfaced to the caller.
    ///
    /// `READONLY` means the write landed on a replica while a failover is
    /// promoting a new primary; a fresh connection resolves the new primary
    /// so the retried write can land there.
    pub fn should_reconnect(&self, err: &RedisError) -> bool {
        if matches!(err.kind(), ErrorKind::ReadOnly) {
            return true;
        }
        err.to_string().contains(READONLY_FRAGMENT)
    }

    /// Connection-manager config backing this policy.
    ///
    /// Per-request retries are effectively unlimited: commands keep retrying
    /// against dropped connections until the connection comes back or the
    /// provider shuts down.
    pub(crate) fn manager_config(&self) -> ConnectionManagerConfig {
        ConnectionManagerConfig::new()
            .set_exponent_base(1)
            .set_factor(self.retry_step.as_millis() as u64)
            .set_max_delay(self.max_retry_delay.as_millis() as u64)
            .set_number_of_retries(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_linearly_and_clamps() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.retry_delay(1), Duration::from_millis(50));
        assert_eq!(policy.retry_delay(10), Duration::from_millis(500));
        assert_eq!(policy.retry_delay(50), Duration::from_millis(2000));
        assert_eq!(policy.retry_delay(100), Duration::from_millis(2000));
    }

    #[test]
    fn readonly_errors_force_a_reconnect() {
        let policy = ReconnectPolicy::default();
        let err = RedisError::from((
            ErrorKind::ReadOnly,
            "READONLY",
            "You can't write against a read only replica.".to_string(),
        ));

        assert!(policy.should_reconnect(&err));
    }

    #[test]
    fn readonly_in_message_forces_a_reconnect() {
        let policy = ReconnectPolicy::default();
        let err = RedisError::from((
            ErrorKind::ResponseError,
            "READONLY You can't write against a read only replica.",
        ));

        assert!(policy.should_reconnect(&err));
    }

    #[test]
    fn other_errors_are_surfaced_to_the_caller() {
        let policy = ReconnectPolicy::default();
        let err = RedisError::from((ErrorKind::ResponseError, "ERR unknown command"));

        assert!(!policy.should_reconnect(&err));
    }
}
