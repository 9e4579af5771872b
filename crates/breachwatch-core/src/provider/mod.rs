//! Paging provider clients
//!
//! A provider turns an [`AlertContext`] into an opaque payload once, then
//! sends that payload as many times as the dispatcher asks, classifying
//! each answer into a [`ProviderResponse`].

mod pagerduty;

pub use pagerduty::{classify_response, PagerDutyClient, PagerDutyEvent, PagerDutyEventPayload};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AlertContext, ProviderResponse};

/// A service that can page someone
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    /// Serialize the context into the provider's request body.
    ///
    /// Failure here means the configuration is malformed and is reported as
    /// [`crate::Error::PayloadConstruction`].
    fn build_payload(&self, context: &AlertContext) -> Result<Vec<u8>>;

    /// Deliver a payload and classify the answer.
    ///
    /// Returns [`crate::Error::ProviderTransport`] when the call itself
    /// could not be completed.
    async fn send(&self, payload: &[u8]) -> Result<ProviderResponse>;
}
