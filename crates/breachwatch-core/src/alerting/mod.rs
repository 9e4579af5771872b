//! Alerting pipeline for BreachWatch
//!
//! Threshold checks, time-to-failure estimation, and notification delivery
//! with bounded retries.

pub mod context;
pub mod estimator;
pub mod monitor;

mod dispatcher;
mod evaluator;
mod retry;

pub use context::{build_alert_context, format_time_to_failure, Subject};
pub use dispatcher::Dispatcher;
pub use estimator::{estimate_time_to_failure, estimate_trend, TrendEstimate};
pub use evaluator::{assess, AlertEvaluator, Assessment, Evaluation};
pub use monitor::is_over_threshold;
pub use retry::{RetryBudget, RetryPolicy};
