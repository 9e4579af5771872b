//! Sample sources
//!
//! Where the metric window comes from. The alerting pipeline only sees a
//! [`SampleSeries`]; everything about queries and document layout stays here.

mod elasticsearch;

pub use elasticsearch::{record_from_hit, search_request_body, ElasticsearchSource};

use async_trait::async_trait;

use crate::alerting::Subject;
use crate::error::Result;
use crate::models::SampleSeries;

/// Provides the most recent samples for a subject
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch up to `window` samples for `subject`, newest first
    async fn fetch_recent_samples(&self, subject: &Subject, window: usize) -> Result<SampleSeries>;
}
