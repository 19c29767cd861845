//! Retry policy and the state machine that applies it
//!
//! The schedule is pure bookkeeping: it never sleeps or performs I/O, so
//! retry behavior can be tested without a server.

use reqwest::StatusCode;
use std::time::Duration;

/// How often and how patiently a failed request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before the first retry
    pub wait_min: Duration,
    /// Upper bound for any single wait
    pub wait_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential backoff before retry number `retry` (0-indexed)
    ///
    /// `wait_min * 2^retry`, never above `wait_max`.
    pub fn backoff(&self, retry: u32) -> Duration {
        1u32.checked_shl(retry)
            .and_then(|factor| self.wait_min.checked_mul(factor))
            .unwrap_or(self.wait_max)
            .min(self.wait_max)
    }

    /// Rate limiting and server errors are worth another try; other
    /// client errors are not.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

/// Where a request currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is in flight
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed; the next one starts after `delay`
    Waiting { attempt: u32, delay: Duration },
    Succeeded,
    /// Every attempt failed with a retryable outcome
    Exhausted { attempts: u32 },
    /// The last attempt failed in a way retrying cannot fix
    Failed { attempts: u32 },
}

impl RetryState {
    /// `true` once no further attempt will be made
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded | RetryState::Exhausted { .. } | RetryState::Failed { .. }
        )
    }
}

/// Tracks attempts of one logical request against a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    state: RetryState,
    last_delay: Duration,
}

impl RetrySchedule {
    /// Start a schedule with the first attempt in flight
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
            last_delay: Duration::ZERO,
        }
    }

    /// Current state of the schedule
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Current attempt number, 1-based
    pub fn attempt(&self) -> u32 {
        match self.state {
            RetryState::Attempting { attempt } | RetryState::Waiting { attempt, .. } => attempt,
            RetryState::Exhausted { attempts } | RetryState::Failed { attempts } => attempts,
            RetryState::Succeeded => 0,
        }
    }

    /// Leave `Waiting` and start the next attempt
    pub fn begin_attempt(&mut self) -> RetryState {
        if let RetryState::Waiting { attempt, .. } = self.state {
            self.state = RetryState::Attempting {
                attempt: attempt + 1,
            };
        }
        self.state
    }

    /// Record that the in-flight attempt succeeded
    pub fn record_success(&mut self) -> RetryState {
        if let RetryState::Attempting { .. } = self.state {
            self.state = RetryState::Succeeded;
        }
        self.state
    }

    /// Record a failed attempt and decide what happens next
    ///
    /// `retry_after` is a server-supplied hint; it can lengthen the wait but
    /// never shorten it. Waits never decrease and never exceed `wait_max`.
    pub fn record_failure(&mut self, retryable: bool, retry_after: Option<Duration>) -> RetryState {
        let RetryState::Attempting { attempt } = self.state else {
            return self.state;
        };

        self.state = if !retryable {
            RetryState::Failed { attempts: attempt }
        } else if attempt >= self.policy.max_attempts() {
            RetryState::Exhausted { attempts: attempt }
        } else {
            let delay = self
                .policy
                .backoff(attempt - 1)
                .max(retry_after.unwrap_or(Duration::ZERO))
                .max(self.last_delay)
                .min(self.policy.wait_max);
            self.last_delay = delay;
            RetryState::Waiting { attempt, delay }
        };
        self.state
    }
}
