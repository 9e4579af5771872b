//! Elasticsearch sample source

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::alerting::Subject;
use crate::config::{ElasticsearchConfig, SubjectConfig};
use crate::error::{Error, Result};
use crate::models::{Sample, SampleSeries};

use super::SampleSource;

/// Reads metric documents from an Elasticsearch index
pub struct ElasticsearchSource {
    client: Client,
    base_url: String,
    index: String,
    timestamp_field: String,
    count_field: String,
}

impl ElasticsearchSource {
    /// Create a new source for `config.index`
    pub fn new(config: &ElasticsearchConfig, subject: &SubjectConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("could not create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            timestamp_field: subject.timestamp_field.clone(),
            count_field: subject.count_field.clone(),
        })
    }

    /// Check that the cluster answers
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| Error::sample_source(format!("could not reach {}: {e}", self.base_url)))?;

        if !response.status().is_success() {
            return Err(Error::sample_source(format!(
                "Elasticsearch returned {} on ping",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SampleSource for ElasticsearchSource {
    async fn fetch_recent_samples(&self, subject: &Subject, window: usize) -> Result<SampleSeries> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let body = search_request_body(subject, &self.timestamp_field);

        let response = self
            .client
            .post(&url)
            .query(&[("size", window)])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(index = %self.index, error = %e, "Elasticsearch request failed");
                Error::sample_source(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::sample_source(format!(
                "Elasticsearch returned {status}: {body}"
            )));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            error!(index = %self.index, error = %e, "Could not understand search response");
            Error::sample_source(format!("could not understand search response: {e}"))
        })?;

        let samples = parsed
            .hits
            .hits
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                record_from_hit(hit, &self.timestamp_field, &self.count_field).map_err(|e| {
                    error!(hit = i, error = %e, "Could not convert hit to a sample");
                    e
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(index = %self.index, count = samples.len(), "Converted search hits");

        SampleSeries::new(samples)
    }
}

/// Match query on `<field>.keyword`, newest first
pub fn search_request_body(subject: &Subject, timestamp_field: &str) -> Value {
    json!({
        "query": {
            "match": {
                format!("{}.keyword", subject.field): subject.key,
            }
        },
        "sort": {
            timestamp_field: { "order": "desc" }
        }
    })
}

/// Convert one search hit into a sample
pub fn record_from_hit(hit: &Value, timestamp_field: &str, count_field: &str) -> Result<Sample> {
    let source = hit
        .get("_source")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::malformed("record had no source document"))?;

    let raw_timestamp = source
        .get(timestamp_field)
        .ok_or_else(|| Error::malformed(format!("record had no {timestamp_field} field")))?
        .as_str()
        .ok_or_else(|| Error::malformed(format!("{timestamp_field} is not a string")))?;

    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .map_err(|e| Error::malformed(format!("could not parse timestamp {raw_timestamp:?}: {e}")))?
        .with_timezone(&Utc);

    let raw_value = source
        .get(count_field)
        .ok_or_else(|| Error::malformed(format!("record had no {count_field} field")))?;

    let value = raw_value
        .as_f64()
        .ok_or_else(|| Error::malformed(format!("could not convert {raw_value} to a number")))?;

    Ok(Sample { timestamp, value })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hit(timestamp: &str, count: Value) -> Value {
        json!({ "_index": "db-connections", "_source": { "datname": "orders", "timestamp": timestamp, "count": count } })
    }

    fn source_for(server: &MockServer) -> ElasticsearchSource {
        let config = ElasticsearchConfig {
            url: server.uri(),
            index: "db-connections".to_string(),
            ..ElasticsearchConfig::default()
        };
        ElasticsearchSource::new(&config, &SubjectConfig::default()).unwrap()
    }

    #[test]
    fn test_search_request_body() {
        let body = search_request_body(&Subject::new("datname", "orders"), "timestamp");

        assert_eq!(
            body,
            json!({
                "query": { "match": { "datname.keyword": "orders" } },
                "sort": { "timestamp": { "order": "desc" } }
            })
        );
    }

    #[test]
    fn test_record_from_hit() {
        let sample = record_from_hit(
            &hit("2020-01-02T03:04:05.5Z", json!(12)),
            "timestamp",
            "count",
        )
        .unwrap();

        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::milliseconds(500)
        );
        assert_eq!(sample.value, 12.0);
    }

    #[test]
    fn test_record_from_hit_rejects_malformed() {
        let cases = [
            json!({ "_id": "1" }),
            json!({ "_source": { "count": 1 } }),
            json!({ "_source": { "timestamp": "yesterday", "count": 1 } }),
            json!({ "_source": { "timestamp": "2020-01-02T03:04:05Z" } }),
            json!({ "_source": { "timestamp": "2020-01-02T03:04:05Z", "count": "many" } }),
        ];

        for case in &cases {
            assert!(
                matches!(record_from_hit(case, "timestamp", "count"), Err(Error::MalformedRecord(_))),
                "accepted {case}"
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_recent_samples() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db-connections/_search"))
            .and(query_param("size", "3"))
            .and(body_json(search_request_body(
                &Subject::new("datname", "orders"),
                "timestamp",
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [
                    hit("2020-01-02T03:04:25Z", json!(15)),
                    hit("2020-01-02T03:04:15Z", json!(10)),
                    hit("2020-01-02T03:04:05Z", json!(5.5)),
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let samples = source_for(&server)
            .fetch_recent_samples(&Subject::new("datname", "orders"), 3)
            .await
            .unwrap();

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![15.0, 10.0, 5.5]);
    }

    #[tokio::test]
    async fn test_fetch_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such index"))
            .mount(&server)
            .await;

        let result = source_for(&server)
            .fetch_recent_samples(&Subject::new("datname", "orders"), 3)
            .await;

        assert!(matches!(result, Err(Error::Source(_))));
    }

    #[tokio::test]
    async fn test_ping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tagline": "You Know, for Search" })))
            .mount(&server)
            .await;

        assert!(source_for(&server).ping().await.is_ok());
    }
}
