//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Alert and failure thresholds for one monitored subject
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPair {
    /// Values above this trigger an evaluation
    pub alert_threshold: f64,
    /// Value the trend is extrapolated toward
    pub failure_threshold: f64,
}

impl ThresholdPair {
    /// Create a new threshold pair
    pub fn new(alert_threshold: f64, failure_threshold: f64) -> Self {
        Self {
            alert_threshold,
            failure_threshold,
        }
    }

    /// Whether `value` has reached or gone beyond the failure threshold.
    ///
    /// The direction of failure follows the thresholds: a failure threshold
    /// below the alert threshold means falling values are the bad ones.
    pub fn has_failed(&self, value: f64) -> bool {
        if self.failure_threshold >= self.alert_threshold {
            value >= self.failure_threshold
        } else {
            value <= self.failure_threshold
        }
    }
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self {
            alert_threshold: 1.0,
            failure_threshold: 200.0,
        }
    }
}

/// Everything a provider needs to describe one breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Field the subject was matched on (e.g. `datname`)
    pub subject_field: String,
    /// Identity of the breaching subject (e.g. a database name)
    pub subject_key: String,
    /// Human-readable one line summary
    pub summary: String,
    /// Most recent metric value
    pub current_value: f64,
    /// Configured thresholds
    pub thresholds: ThresholdPair,
    /// Linear estimate of seconds until the failure threshold is reached
    pub estimated_seconds_to_failure: f64,
    /// When the context was built
    pub timestamp: DateTime<Utc>,
}

/// Classified provider answer to one notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// Notification registered
    Accepted {
        /// Provider-issued deduplication key
        dedup_key: String,
    },
    /// Provider asked us to slow down; retry after a delay
    RateLimited,
    /// Provider refused the notification for good
    Rejected {
        /// Provider status text
        status: String,
        /// Provider explanation
        message: String,
    },
}

impl ProviderResponse {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::RateLimited => "rate_limited",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Terminal state of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The provider accepted the notification
    Delivered { dedup_key: String, attempts: u32 },
    /// The provider refused the notification; no further attempts were made
    Rejected {
        status: String,
        message: String,
        attempts: u32,
    },
    /// Every attempt in the retry budget was rate limited
    RetriesExhausted { attempts: u32 },
    /// Cancellation was requested between attempts
    Cancelled { attempts: u32 },
}

impl DispatchOutcome {
    /// Number of provider calls made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::RetriesExhausted { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Whether the notification reached the provider
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Convert into the dedup key, mapping every other terminal state onto an error
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Delivered { dedup_key, .. } => Ok(dedup_key),
            Self::Rejected {
                status, message, ..
            } => Err(Error::ProviderRejected { status, message }),
            Self::RetriesExhausted { attempts } => Err(Error::RetriesExhausted { attempts }),
            Self::Cancelled { attempts } => Err(Error::Cancelled { attempts }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_failed_follows_threshold_direction() {
        let rising = ThresholdPair::new(80.0, 200.0);
        assert!(!rising.has_failed(150.0));
        assert!(rising.has_failed(200.0));
        assert!(rising.has_failed(250.0));

        let draining = ThresholdPair::new(20.0, 0.0);
        assert!(!draining.has_failed(10.0));
        assert!(draining.has_failed(-5.0));
    }

    #[test]
    fn test_delivered_into_result() {
        let outcome = DispatchOutcome::Delivered {
            dedup_key: "abc".to_string(),
            attempts: 2,
        };

        assert_eq!(outcome.attempts(), 2);
        assert_eq!(outcome.into_result().unwrap(), "abc");
    }

    #[test]
    fn test_terminal_failures_map_to_errors() {
        let rejected = DispatchOutcome::Rejected {
            status: "invalid event".to_string(),
            message: "Event object is invalid".to_string(),
            attempts: 1,
        };
        match rejected.into_result() {
            Err(Error::ProviderRejected { status, message }) => {
                assert_eq!(status, "invalid event");
                assert_eq!(message, "Event object is invalid");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(matches!(
            DispatchOutcome::RetriesExhausted { attempts: 3 }.into_result(),
            Err(Error::RetriesExhausted { attempts: 3 })
        ));
        assert!(matches!(
            DispatchOutcome::Cancelled { attempts: 1 }.into_result(),
            Err(Error::Cancelled { attempts: 1 })
        ));
    }
}
