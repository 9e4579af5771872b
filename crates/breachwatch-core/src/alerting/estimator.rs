//! Linear time-to-failure estimation

use chrono::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::SampleSeries;

/// Minimum number of samples needed to compute a rate of change
pub const MIN_SAMPLES: usize = 2;

/// Result of a trend estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendEstimate {
    /// Average rate of change, metric units per second
    pub rate: f64,
    /// Seconds until the failure threshold is reached at `rate`
    pub seconds_to_failure: f64,
}

/// Per-pair rates of change across the window.
///
/// Each sample is paired with the one stored after it (its older
/// neighbour). Both differences are taken as "older minus newer", so the
/// time delta is negative for a newest-first series and the sign carries
/// through to the value delta.
pub fn change_rates(samples: &SampleSeries) -> Vec<f64> {
    samples
        .as_slice()
        .windows(2)
        .map(|pair| {
            let (current, next) = (&pair[0], &pair[1]);
            let elapsed = signed_seconds(next.timestamp - current.timestamp);
            (next.value - current.value) / elapsed
        })
        .collect()
}

/// Average rate of change across the window, metric units per second
#[allow(clippy::cast_precision_loss)]
pub fn average_rate(samples: &SampleSeries) -> Result<f64> {
    if samples.len() < MIN_SAMPLES {
        return Err(Error::InsufficientData {
            required: MIN_SAMPLES,
            actual: samples.len(),
        });
    }

    let rates = change_rates(samples);
    debug!(rates = ?rates, "Computed change rates");

    let average = rates.iter().sum::<f64>() / rates.len() as f64;
    debug!(
        average_rate = average,
        sample_count = samples.len(),
        "Computed average rate per second"
    );

    Ok(average)
}

/// Estimate seconds until the most recent value reaches `failure_threshold`.
///
/// Fails with [`Error::InsufficientData`] for fewer than two samples,
/// [`Error::NoTrend`] when the average rate is zero, and
/// [`Error::ImplausibleEstimate`] when the trend moves away from the
/// threshold (or the threshold has already been passed).
pub fn estimate_time_to_failure(samples: &SampleSeries, failure_threshold: f64) -> Result<f64> {
    estimate_trend(samples, failure_threshold).map(|estimate| estimate.seconds_to_failure)
}

/// Same as [`estimate_time_to_failure`] but also returns the rate used
pub fn estimate_trend(samples: &SampleSeries, failure_threshold: f64) -> Result<TrendEstimate> {
    let rate = average_rate(samples)?;

    // average_rate guarantees at least two samples
    let most_recent = samples.as_slice()[0].value;
    let gap = failure_threshold - most_recent;

    if rate == 0.0 {
        return Err(Error::NoTrend);
    }

    if gap == 0.0 {
        return Ok(TrendEstimate {
            rate,
            seconds_to_failure: 0.0,
        });
    }

    let seconds_to_failure = gap / rate;
    if !seconds_to_failure.is_finite() {
        return Err(Error::NoTrend);
    }
    if seconds_to_failure < 0.0 {
        return Err(Error::ImplausibleEstimate { rate, gap });
    }

    Ok(TrendEstimate {
        rate,
        seconds_to_failure,
    })
}

#[allow(clippy::cast_precision_loss)]
fn signed_seconds(delta: Duration) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
