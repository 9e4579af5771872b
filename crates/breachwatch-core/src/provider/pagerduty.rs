//! PagerDuty Events API v2 client

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alerting::format_time_to_failure;
use crate::config::PagerDutyConfig;
use crate::error::{Error, Result};
use crate::models::{AlertContext, ProviderResponse};

use super::NotificationProvider;

/// Sends trigger events to PagerDuty
pub struct PagerDutyClient {
    client: Client,
    events_url: String,
    routing_key: String,
    service_id: String,
    severity: String,
}

impl PagerDutyClient {
    /// Create a new client; the routing key and service id are required
    pub fn new(config: &PagerDutyConfig) -> Result<Self> {
        let routing_key = config
            .routing_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::config("a PagerDuty routing key is required (PAGERDUTY_KEY)"))?;

        let service_id = config
            .service_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::config("a PagerDuty service id is required (PAGERDUTY_SERVICE)"))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("could not create HTTP client: {e}")))?;

        Ok(Self {
            client,
            events_url: config.events_url.clone(),
            routing_key,
            service_id,
            severity: config.severity.clone(),
        })
    }

    /// Build the trigger event for a context
    pub fn event(&self, context: &AlertContext) -> PagerDutyEvent {
        PagerDutyEvent {
            routing_key: self.routing_key.clone(),
            event_action: "trigger".to_string(),
            dedup_key: None,
            payload: PagerDutyEventPayload {
                summary: context.summary.clone(),
                source: self.service_id.clone(),
                severity: self.severity.clone(),
                timestamp: context.timestamp.to_rfc3339(),
                component: context.subject_key.clone(),
                custom_details: serde_json::json!({
                    "currentValue": context.current_value,
                    "alertThreshold": context.thresholds.alert_threshold,
                    "failureThreshold": context.thresholds.failure_threshold,
                    "estimatedTimeToFailure": format_time_to_failure(context.estimated_seconds_to_failure),
                    "estimatedSecondsToFailure": context.estimated_seconds_to_failure,
                }),
            },
        }
    }
}

#[async_trait]
impl NotificationProvider for PagerDutyClient {
    fn name(&self) -> &str {
        "pagerduty"
    }

    fn build_payload(&self, context: &AlertContext) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.event(context))
            .map_err(|e| Error::PayloadConstruction(format!("could not serialize PagerDuty event: {e}")))
    }

    async fn send(&self, payload: &[u8]) -> Result<ProviderResponse> {
        let response = self
            .client
            .post(&self.events_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| Error::ProviderTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ProviderTransport(format!("could not read response body: {e}")))?;

        debug!(status = %status, body = %body, "PagerDuty responded");

        Ok(classify_response(status, &body))
    }
}

/// Map a PagerDuty HTTP answer onto a [`ProviderResponse`]
pub fn classify_response(status: StatusCode, body: &str) -> ProviderResponse {
    let parsed: Option<EventsApiResponse> = serde_json::from_str(body).ok();

    if status.is_success() {
        let dedup_key = parsed.and_then(|r| r.dedup_key).unwrap_or_else(|| {
            warn!(status = %status, "PagerDuty accepted the event without a dedup key");
            String::new()
        });
        return ProviderResponse::Accepted { dedup_key };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderResponse::RateLimited;
    }

    match parsed {
        Some(EventsApiResponse {
            status: Some(api_status),
            message,
            errors,
            ..
        }) => {
            let mut message = message.unwrap_or_default();
            if !errors.is_empty() {
                if !message.is_empty() {
                    message.push_str(": ");
                }
                message.push_str(&errors.join("; "));
            }
            ProviderResponse::Rejected {
                status: api_status,
                message,
            }
        }
        _ => ProviderResponse::Rejected {
            status: status.to_string(),
            message: body.to_string(),
        },
    }
}

/// PagerDuty Events API v2 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyEvent {
    /// Integration key
    pub routing_key: String,
    /// `trigger`, `acknowledge` or `resolve`
    pub event_action: String,
    /// Correlates events for one incident; PagerDuty assigns one when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    /// Event body
    pub payload: PagerDutyEventPayload,
}

/// Body of a PagerDuty event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyEventPayload {
    /// One line summary
    pub summary: String,
    /// Reporting service
    pub source: String,
    /// critical, error, warning or info
    pub severity: String,
    /// RFC 3339 time of the breach
    pub timestamp: String,
    /// Affected component
    pub component: String,
    /// Free-form details
    pub custom_details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EventsApiResponse {
    status: Option<String>,
    message: Option<String>,
    dedup_key: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}
