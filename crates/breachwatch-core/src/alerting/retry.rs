//! Retry budget for rate-limited notifications
//!
//! A [`RetryPolicy`] is configuration; a [`RetryBudget`] is the per-dispatch
//! state machine that counts attempts and hands out the delay before the
//! next one, growing it by `multiplier` up to `max_delay`.

use std::time::Duration;

/// Configuration for bounded retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied after each retry (1.0 = fixed delay)
    pub multiplier: f64,
    /// Total attempts allowed, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5), 5)
    }
}

impl RetryPolicy {
    /// Same delay between every attempt
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Exponential growth from `initial_delay`, capped at `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            max_attempts,
        }
    }

    /// Fresh budget for one dispatch
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.clone())
    }
}

/// Remaining attempts and backoff state for one dispatch
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    attempts: u32,
    current_delay: Duration,
}

impl RetryBudget {
    /// Create a budget from a policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current_delay: std::cmp::min(policy.initial_delay, policy.max_delay),
            attempts: 0,
            policy,
        }
    }

    /// Record that an attempt is being made; returns its 1-based number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.current_delay;
        let grown =
            Duration::try_from_secs_f64(self.current_delay.as_secs_f64() * self.policy.multiplier)
                .unwrap_or(self.policy.max_delay);
        self.current_delay = std::cmp::min(grown, self.policy.max_delay);

        Some(delay)
    }

    /// Whether another attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts still available
    pub fn remaining(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.attempts)
    }
}
