//! # BreachWatch
//!
//! Threshold breach detection with time-to-failure estimates and paging.
//!
//! BreachWatch samples a time-ordered metric, checks the newest value against
//! an alert threshold, extrapolates how long remains before a failure
//! threshold is reached, and pages through a provider that may rate limit.
//!
//! ## Architecture
//!
//! - **Source**: fetches the newest samples for a subject (Elasticsearch)
//! - **Alerting**: threshold monitor, trend estimator, context builder
//! - **Dispatch**: bounded retry loop over a paging provider (PagerDuty)
//!
//! ## Quick Start
//!
//! ```bash
//! export PAGERDUTY_KEY=... PAGERDUTY_SERVICE=...
//! breachwatch check --match-field datname --match-value orders --threshold 80
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod source;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEvaluator, Dispatcher, Evaluation, RetryPolicy, Subject};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::provider::{NotificationProvider, PagerDutyClient};
    pub use crate::source::{ElasticsearchSource, SampleSource};
}
