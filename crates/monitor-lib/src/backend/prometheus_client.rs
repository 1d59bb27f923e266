//! Prometheus HTTP API client
//!
//! Implements [`TimeSeriesBackend`] on top of `/api/v1/query` and
//! `/api/v1/query_range`. Every returned series is converted into a
//! [`LabeledSeries`]; non-finite samples are dropped.

use super::{async_trait, BackendError, TimeSeriesBackend};
use crate::models::{LabeledSeries, Labels, MetricSample, MetricSeries};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Authentication for an externally exposed Prometheus
#[derive(Debug, Clone, Default)]
pub enum PrometheusAuth {
    /// No authentication (in-cluster service or port-forward)
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// Prometheus client for instant and range queries
#[derive(Clone)]
pub struct PrometheusClient {
    base_url: Url,
    http_client: Client,
    auth: PrometheusAuth,
}

impl PrometheusClient {
    /// Create a client without authentication
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        Self::with_auth(url, timeout, PrometheusAuth::None)
    }

    pub fn with_auth(
        url: &str,
        timeout: Duration,
        auth: PrometheusAuth,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(url)
            .map_err(|e| BackendError::TimeSeries(format!("invalid Prometheus URL {url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BackendError::TimeSeries(format!(
                "invalid Prometheus URL {url}: scheme must be http or https"
            )));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::TimeSeries(e.to_string()))?;

        Ok(Self {
            base_url,
            http_client,
            auth,
        })
    }

    fn add_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            PrometheusAuth::None => req,
            PrometheusAuth::Basic { username, password } => {
                req.basic_auth(username, Some(password))
            }
            PrometheusAuth::Bearer(token) => req.bearer_auth(token),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::TimeSeries(e.to_string()))
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<LabeledSeries>, BackendError> {
        let url = self.endpoint(path)?;
        debug!(url = %url, query = ?params.first(), "Querying Prometheus");

        let req = self.http_client.get(url).query(params);
        let response = self
            .add_auth(req)
            .send()
            .await
            .map_err(|e| BackendError::TimeSeries(e.to_string()))?;

        let status = response.status();
        let body: PrometheusResponse = response.json().await.map_err(|e| {
            BackendError::TimeSeries(format!("HTTP {}: failed to parse response: {}", status, e))
        })?;

        body.into_series()
    }
}

#[async_trait]
impl TimeSeriesBackend for PrometheusClient {
    async fn query_instant(
        &self,
        expression: &str,
        time: DateTime<Utc>,
    ) -> Result<Vec<LabeledSeries>, BackendError> {
        let params = [
            ("query", expression.to_string()),
            ("time", time.timestamp().to_string()),
        ];
        self.get("api/v1/query", &params).await
    }

    async fn query_range(
        &self,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<LabeledSeries>, BackendError> {
        let params = [
            ("query", expression.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("step", format!("{}s", step.as_secs())),
        ];
        self.get("api/v1/query_range", &params).await
    }
}

// ============================================================================
// Prometheus API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<PrometheusData>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum PrometheusData {
    Vector(Vec<PrometheusResult>),
    Matrix(Vec<PrometheusResult>),
    Scalar(RawSample),
    String(RawSample),
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    #[serde(default)]
    metric: Labels,
    /// Instant queries
    value: Option<RawSample>,
    /// Range queries
    values: Option<Vec<RawSample>>,
}

/// `[<unix seconds>, "<value>"]`
type RawSample = (f64, String);

fn to_sample((timestamp, value): RawSample) -> Option<MetricSample> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| MetricSample::new(timestamp, v))
}

impl PrometheusResponse {
    fn into_series(self) -> Result<Vec<LabeledSeries>, BackendError> {
        if self.status != "success" {
            return Err(BackendError::TimeSeries(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let series = match self.data {
            None => Vec::new(),
            Some(PrometheusData::Vector(results)) | Some(PrometheusData::Matrix(results)) => {
                results
                    .into_iter()
                    .map(|r| {
                        let samples = r
                            .value
                            .into_iter()
                            .chain(r.values.unwrap_or_default())
                            .filter_map(to_sample)
                            .collect();
                        LabeledSeries {
                            labels: r.metric,
                            series: MetricSeries::new(samples),
                        }
                    })
                    .collect()
            }
            Some(PrometheusData::Scalar(raw)) => vec![LabeledSeries {
                labels: Labels::new(),
                series: MetricSeries::new(to_sample(raw).into_iter().collect()),
            }],
            Some(PrometheusData::String(_)) => Vec::new(),
        };
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> Result<Vec<LabeledSeries>, BackendError> {
        serde_json::from_value::<PrometheusResponse>(json)
            .unwrap()
            .into_series()
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(PrometheusClient::new("ftp://prometheus:9090", Duration::from_secs(5)).is_err());
        assert!(PrometheusClient::new("not a url", Duration::from_secs(5)).is_err());
        assert!(PrometheusClient::new("http://prometheus:9090", Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_parse_matrix() {
        let series = parse(serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [{
                    "metric": { "node": "node-a" },
                    "values": [[1700000060, "2"], [1700000000, "1"], [1700000120, "NaN"]]
                }]
            }
        }))
        .unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].labels["node"], "node-a");
        assert_eq!(
            series[0].series.samples(),
            &[
                MetricSample::new(1_700_000_000.0, 1.0),
                MetricSample::new(1_700_000_060.0, 2.0)
            ]
        );
    }

    #[test]
    fn test_parse_vector() {
        let series = parse(serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    { "metric": { "node": "a" }, "value": [1700000000, "0.25"] },
                    { "metric": { "node": "b" }, "value": [1700000000, "0.5"] }
                ]
            }
        }))
        .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[1].series.last().map(|s| s.value), Some(0.5));
    }

    #[test]
    fn test_parse_scalar() {
        let series = parse(serde_json::json!({
            "status": "success",
            "data": { "resultType": "scalar", "result": [1700000000, "3"] }
        }))
        .unwrap();

        assert_eq!(series.len(), 1);
        assert!(series[0].labels.is_empty());
    }

    #[test]
    fn test_parse_error_response() {
        let err = parse(serde_json::json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error at char 5"
        }))
        .unwrap_err();

        assert_eq!(
            err,
            BackendError::TimeSeries("parse error at char 5".to_string())
        );
    }
}
