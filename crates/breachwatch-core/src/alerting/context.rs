//! Alert context assembly

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{AlertContext, SampleSeries, ThresholdPair};

/// Identity of the monitored subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Field the subject is matched on
    pub field: String,
    /// Value of that field
    pub key: String,
}

impl Subject {
    /// Create a new subject
    pub fn new(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
        }
    }
}

/// Build the context for a breach of `subject` observed in `samples`
pub fn build_alert_context(
    subject: &Subject,
    samples: &SampleSeries,
    thresholds: ThresholdPair,
    estimated_seconds_to_failure: f64,
    now: DateTime<Utc>,
) -> Result<AlertContext> {
    let current = samples
        .latest()
        .ok_or(Error::InsufficientData {
            required: 1,
            actual: 0,
        })?
        .value;

    Ok(AlertContext {
        subject_field: subject.field.clone(),
        subject_key: subject.key.clone(),
        summary: format_summary(subject, current),
        current_value: current,
        thresholds,
        estimated_seconds_to_failure,
        timestamp: now,
    })
}

/// One line description of a breach
pub fn format_summary(subject: &Subject, current: f64) -> String {
    format!(
        "{} {} is out of range at {:.2}",
        subject.field, subject.key, current
    )
}

/// Render seconds as `"H hrs, M mins and S seconds"`, truncating each unit
#[allow(clippy::cast_possible_truncation)]
pub fn format_time_to_failure(seconds: f64) -> String {
    let total = seconds.trunc() as i64;
    let hours = total / 3600;
    let mins = (total - hours * 3600) / 60;
    let secs = total - hours * 3600 - mins * 60;

    format!("{hours} hrs, {mins} mins and {secs} seconds")
}
