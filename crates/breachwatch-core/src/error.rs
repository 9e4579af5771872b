//! Error types for BreachWatch

use thiserror::Error;

/// Result type alias using BreachWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for BreachWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer samples than the trend estimator needs
    #[error("Insufficient data: need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// The average rate of change is zero, so no failure time can be extrapolated
    #[error("No trend: metric is not changing over the sampled window")]
    NoTrend,

    /// The trend moves away from the failure threshold
    #[error("Implausible estimate: rate {rate} per second cannot close a gap of {gap}")]
    ImplausibleEstimate { rate: f64, gap: f64 },

    /// The provider call could not be completed
    #[error("Provider transport error: {0}")]
    ProviderTransport(String),

    /// The provider permanently rejected the notification
    #[error("Provider rejected notification: {status} {message}")]
    ProviderRejected { status: String, message: String },

    /// The provider kept rate limiting until the retry budget ran out
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Dispatch was cancelled between attempts
    #[error("Dispatch cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    /// The notification payload could not be built; indicates bad configuration
    #[error("Payload construction failed: {0}")]
    PayloadConstruction(String),

    /// Sample source error
    #[error("Sample source error: {0}")]
    Source(String),

    /// A record from the sample source could not be converted to a sample
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a sample source error
    pub fn sample_source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a malformed record error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
