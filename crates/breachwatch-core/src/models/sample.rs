//! Metric samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single observation of the monitored metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the value was observed
    pub timestamp: DateTime<Utc>,
    /// Observed value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples ordered newest first.
///
/// Index 0 is always the most recent observation. Construction rejects any
/// sequence whose timestamps are not strictly decreasing, so adjacent samples
/// never share a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleSeries {
    samples: Vec<Sample>,
}

impl SampleSeries {
    /// Build a series from samples already ordered newest first
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        if let Some(pos) = samples
            .windows(2)
            .position(|pair| pair[0].timestamp <= pair[1].timestamp)
        {
            return Err(Error::validation(format!(
                "samples must be strictly newest-first: sample {} at {} is not newer than sample {} at {}",
                pos,
                samples[pos].timestamp.to_rfc3339(),
                pos + 1,
                samples[pos + 1].timestamp.to_rfc3339(),
            )));
        }

        Ok(Self { samples })
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.first()
    }

    /// Oldest sample in the window
    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples, newest first
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterate over samples, newest first
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }
}
