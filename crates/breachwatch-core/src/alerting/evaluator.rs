//! One evaluation run: sample, check, estimate, page

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{AlertContext, DispatchOutcome, ThresholdPair};
use crate::provider::NotificationProvider;
use crate::source::SampleSource;

use super::context::{build_alert_context, format_time_to_failure, Subject};
use super::dispatcher::Dispatcher;
use super::estimator::{estimate_trend, TrendEstimate};
use super::monitor::is_over_threshold;

/// What the samples say, before anything is sent
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// The newest value is within the alert threshold
    InRange {
        /// Most recent value
        current: f64,
    },
    /// The alert threshold was breached and a trend was estimated
    Breached {
        /// Context a provider would be given
        context: AlertContext,
        /// Trend the estimate was drawn from
        estimate: TrendEstimate,
    },
}

/// What a single run concluded
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The newest value is within the alert threshold; nothing was sent
    InRange {
        /// Most recent value
        current: f64,
    },
    /// The alert threshold was breached and a dispatch was driven to a terminal state
    Alerted {
        /// Context that was dispatched
        context: AlertContext,
        /// How the dispatch ended
        outcome: DispatchOutcome,
    },
}

/// Fetch the newest samples for `subject` and decide whether they warrant an alert.
///
/// Source and estimation errors are returned as-is; nothing is sent.
pub async fn assess<S: SampleSource>(
    source: &S,
    subject: &Subject,
    thresholds: ThresholdPair,
    window: usize,
) -> Result<Assessment> {
    let samples = source.fetch_recent_samples(subject, window).await?;

    let (Some(latest), Some(oldest)) = (samples.latest(), samples.oldest()) else {
        return Err(Error::InsufficientData {
            required: 1,
            actual: 0,
        });
    };
    let current = latest.value;

    debug!(
        subject = %subject.key,
        count = samples.len(),
        newest = %latest.timestamp.to_rfc3339(),
        oldest = %oldest.timestamp.to_rfc3339(),
        "Fetched samples"
    );

    if !is_over_threshold(current, thresholds.alert_threshold) {
        info!(
            field = %subject.field,
            subject = %subject.key,
            current,
            threshold = thresholds.alert_threshold,
            "Currently in range"
        );
        return Ok(Assessment::InRange { current });
    }

    let estimate = match estimate_trend(&samples, thresholds.failure_threshold) {
        Ok(estimate) => estimate,
        Err(e @ Error::ImplausibleEstimate { .. }) if thresholds.has_failed(current) => {
            error!(
                field = %subject.field,
                subject = %subject.key,
                current,
                failure_threshold = thresholds.failure_threshold,
                error = %e,
                "Failure threshold already passed"
            );
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let context = build_alert_context(
        subject,
        &samples,
        thresholds,
        estimate.seconds_to_failure,
        Utc::now(),
    )?;

    warn!(
        field = %subject.field,
        subject = %subject.key,
        current,
        threshold = thresholds.alert_threshold,
        failure_threshold = thresholds.failure_threshold,
        rate_per_second = estimate.rate,
        time_to_failure = %format_time_to_failure(estimate.seconds_to_failure),
        "Threshold breached"
    );

    Ok(Assessment::Breached { context, estimate })
}

/// Runs the sample → threshold → trend → dispatch pipeline for one subject
pub struct AlertEvaluator<S, P> {
    source: S,
    dispatcher: Dispatcher<P>,
    subject: Subject,
    thresholds: ThresholdPair,
    window: usize,
}

impl<S: SampleSource, P: NotificationProvider> AlertEvaluator<S, P> {
    /// Create a new alert evaluator
    pub fn new(
        source: S,
        dispatcher: Dispatcher<P>,
        subject: Subject,
        thresholds: ThresholdPair,
        window: usize,
    ) -> Self {
        Self {
            source,
            dispatcher,
            subject,
            thresholds,
            window,
        }
    }

    /// The dispatcher used for breaches
    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    /// Evaluate once, dispatching on a breach.
    ///
    /// Source and estimation errors abort the run before anything is sent.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Evaluation> {
        match assess(&self.source, &self.subject, self.thresholds, self.window).await? {
            Assessment::InRange { current } => Ok(Evaluation::InRange { current }),
            Assessment::Breached { context, .. } => {
                let outcome = self.dispatcher.dispatch(&context, cancel).await?;
                Ok(Evaluation::Alerted { context, outcome })
            }
        }
    }
}
