// src/retry/policy.rs

use crate::config::RetryConfig;
use std::time::Duration;

/// Decides between retrying the same backend and failing over to another.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `retry_delay` and forward to the same backend again.
    Retry,
    /// Mark the backend dead and dispatch to another one.
    Failover,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// What to do after a recoverable forwarding error, given the
    /// retries already spent on the current backend.
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries < self.config.max_retries {
            RetryDecision::Retry
        } else {
            RetryDecision::Failover
        }
    }

    /// True once a request has failed over more than `max_attempts` times.
    pub fn attempts_exhausted(&self, attempts: u32) -> bool {
        attempts > self.config.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.config.retry_delay()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
