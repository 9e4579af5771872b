//! Configuration management for BreachWatch
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `BREACHWATCH__SECTION__KEY` environment variables. Command-line flags are
//! applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerting::RetryPolicy;
use crate::error::{Error, Result};
use crate::models::ThresholdPair;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "BREACHWATCH";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search index the samples are read from
    pub elasticsearch: ElasticsearchConfig,

    /// Which subject to watch and how its documents are shaped
    pub subject: SubjectConfig,

    /// Alert and failure thresholds
    pub thresholds: ThresholdPair,

    /// Retry behaviour of the notification dispatcher
    pub dispatch: DispatchConfig,

    /// Paging provider settings
    pub pagerduty: PagerDutyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.subject.sample_length < 2 {
            return Err(Error::config(format!(
                "sample_length must be at least 2 to estimate a trend, got {}",
                self.subject.sample_length
            )));
        }

        if self.dispatch.max_attempts == 0 {
            return Err(Error::config("dispatch.max_attempts must be at least 1"));
        }

        if self.dispatch.backoff_multiplier.is_nan() || self.dispatch.backoff_multiplier < 1.0 {
            return Err(Error::config(format!(
                "dispatch.backoff_multiplier must be >= 1.0, got {}",
                self.dispatch.backoff_multiplier
            )));
        }

        if self.dispatch.retry_delay > self.dispatch.max_delay {
            return Err(Error::config(format!(
                "dispatch.retry_delay ({}) exceeds dispatch.max_delay ({})",
                humantime::format_duration(self.dispatch.retry_delay),
                humantime::format_duration(self.dispatch.max_delay)
            )));
        }

        if !self.thresholds.alert_threshold.is_finite()
            || !self.thresholds.failure_threshold.is_finite()
        {
            return Err(Error::config("thresholds must be finite numbers"));
        }

        Ok(())
    }
}

/// Elasticsearch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster
    pub url: String,
    /// Index holding the metric documents
    pub index: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "db_connection_metrix".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Subject selection and document layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectConfig {
    /// Only documents whose `match_field` equals `match_value` are sampled
    pub match_field: String,
    /// Value that must be present in `match_field`
    pub match_value: String,
    /// Field holding an RFC 3339 timestamp
    pub timestamp_field: String,
    /// Field holding the numeric metric
    pub count_field: String,
    /// Number of most recent documents to sample
    pub sample_length: usize,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            match_field: String::new(),
            match_value: String::new(),
            timestamp_field: "timestamp".to_string(),
            count_field: "count".to_string(),
            sample_length: 100,
        }
    }
}

/// Dispatcher retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Wait before the first retry of a rate-limited notification
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Total provider calls allowed, including the first
    pub max_attempts: u32,
    /// Growth factor applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Ceiling for the delay between attempts
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_attempts: 5,
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl DispatchConfig {
    /// Replace the retry delay, raising `max_delay` if it would cap it
    pub fn set_retry_delay(&mut self, delay: Duration) {
        self.retry_delay = delay;
        self.max_delay = self.max_delay.max(delay);
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: self.retry_delay,
            max_delay: self.max_delay,
            multiplier: self.backoff_multiplier,
            max_attempts: self.max_attempts,
        }
    }
}

/// PagerDuty configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerDutyConfig {
    /// Events API endpoint
    pub events_url: String,
    /// Integration routing key; usually supplied through `PAGERDUTY_KEY`
    pub routing_key: Option<String>,
    /// Service identifier reported as the event source; usually `PAGERDUTY_SERVICE`
    pub service_id: Option<String>,
    /// Event severity (critical, error, warning, info)
    pub severity: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            events_url: "https://events.pagerduty.com/v2/enqueue".to_string(),
            routing_key: None,
            service_id: None,
            severity: "critical".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.retry_delay, Duration::from_secs(5));
        assert_eq!(config.thresholds.alert_threshold, 1.0);
        assert_eq!(config.thresholds.failure_threshold, 200.0);
        assert_eq!(config.subject.sample_length, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[subject]
match_field = "datname"
match_value = "orders"
sample_length = 20

[thresholds]
alert_threshold = 50.0
failure_threshold = 300.0

[dispatch]
retry_delay = "2s"
max_attempts = 3
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.subject.match_field, "datname");
        assert_eq!(config.subject.match_value, "orders");
        assert_eq!(config.subject.sample_length, 20);
        assert_eq!(config.subject.count_field, "count");
        assert_eq!(config.thresholds.failure_threshold, 300.0);
        assert_eq!(config.dispatch.retry_delay, Duration::from_secs(2));
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.dispatch.max_attempts = 0;

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_short_window_rejected() {
        let mut config = Config::default();
        config.subject.sample_length = 1;

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_nan_multiplier_rejected() {
        let mut config = Config::default();
        config.dispatch.backoff_multiplier = f64::NAN;

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_retry_delay_above_ceiling_rejected() {
        let mut config = Config::default();
        config.dispatch.retry_delay = Duration::from_secs(120);

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_set_retry_delay_is_honoured() {
        let mut config = Config::default();
        config.dispatch.set_retry_delay(Duration::from_secs(120));

        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.max_delay, Duration::from_secs(120));

        let mut budget = config.dispatch.retry_policy().budget();
        budget.record_attempt();
        assert_eq!(budget.next_delay(), Some(Duration::from_secs(120)));

        config.dispatch.set_retry_delay(Duration::from_secs(2));
        assert_eq!(config.dispatch.max_delay, Duration::from_secs(120));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let dispatch = DispatchConfig {
            retry_delay: Duration::from_secs(1),
            max_attempts: 4,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(3),
        };

        let policy = dispatch.retry_policy();
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.max_delay, Duration::from_secs(3));
    }
}
