//! Config validation.
//! Rejects values that would make locking or walking misbehave at runtime.

use tracing::debug;

use super::types::Config;
use crate::errors::{FileGateError, Result};

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.lease.is_zero() {
            return Err(invalid("lease must be greater than zero"));
        }
        if self.reap_interval.is_zero() {
            return Err(invalid("reap_interval must be greater than zero"));
        }
        if self.lease < self.reap_interval {
            return Err(invalid(format!(
                "lease ({}s) must not be shorter than reap_interval ({}s)",
                self.lease.as_secs_f64(),
                self.reap_interval.as_secs_f64()
            )));
        }
        if self.lock_attempts == 0 {
            return Err(invalid("lock_attempts must be at least 1"));
        }
        if self.walk_port == 0 {
            return Err(invalid("walk_port must not be 0"));
        }
        if self.walk_timeout.is_zero() {
            return Err(invalid("walk_timeout must be greater than zero"));
        }
        if self.walk_host.trim().is_empty() {
            return Err(invalid("walk_host must not be empty"));
        }
        debug!(
            lease_s = self.lease.as_secs(),
            reap_s = self.reap_interval.as_secs(),
            attempts = self.lock_attempts,
            policy = %self.error_policy,
            walk = %self.walk,
            "config validated"
        );
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> FileGateError {
    FileGateError::Config(msg.into())
}
