//! Core data models for the monitoring query layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric labels, ordered for stable output
pub type Labels = BTreeMap<String, String>;

/// A single point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    pub value: f64,
}

impl MetricSample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn at(time: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp: unix_seconds(time),
            value,
        }
    }
}

/// Samples ordered by ascending timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSeries(Vec<MetricSample>);

impl MetricSeries {
    /// Build a series, sorting samples by timestamp
    pub fn new(mut samples: Vec<MetricSample>) -> Self {
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self(samples)
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&MetricSample> {
        self.0.last()
    }
}

/// Payload of a metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetricData {
    #[default]
    Empty,
    Sample(MetricSample),
    Series(MetricSeries),
}

impl MetricData {
    pub fn is_empty(&self) -> bool {
        matches!(self, MetricData::Empty)
    }
}

/// One named metric for one entity.
///
/// A metric either carries data or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    name: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    labels: Labels,
    #[serde(default)]
    data: MetricData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Metric {
    pub fn sample(name: impl Into<String>, labels: Labels, sample: MetricSample) -> Self {
        Self {
            name: name.into(),
            labels,
            data: MetricData::Sample(sample),
            error: None,
        }
    }

    pub fn series(name: impl Into<String>, labels: Labels, series: MetricSeries) -> Self {
        Self {
            name: name.into(),
            labels,
            data: MetricData::Series(series),
            error: None,
        }
    }

    /// A metric whose backend failed; it carries no data
    pub fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            data: MetricData::Empty,
            error: Some(error.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn data(&self) -> &MetricData {
        &self.data
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Numeric value used for ranking: the sample, or the latest point of a series
    pub fn value(&self) -> Option<f64> {
        match &self.data {
            MetricData::Sample(sample) => Some(sample.value),
            MetricData::Series(series) => series.last().map(|s| s.value),
            MetricData::Empty => None,
        }
    }
}

/// Uniform result of a named-metric query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResultSet {
    pub results: Vec<Metric>,
    /// Zero unless a paging directive was applied
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total: usize,
}

impl MetricResultSet {
    pub fn new(results: Vec<Metric>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_ranked(&self) -> bool {
        self.page > 0
    }
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// CPU and memory quantities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

impl ResourceQuantities {
    pub fn new(cpu_millicores: u64, memory_bytes: u64) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// CPU in whole cores
    pub fn cpu_cores(&self) -> f64 {
        self.cpu_millicores as f64 / 1000.0
    }
}

/// Address of a node as reported by the cluster inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Address type, e.g. `InternalIP`, `ExternalIP`, `Hostname`
    pub kind: String,
    pub address: String,
}

impl NodeAddress {
    pub const INTERNAL_IP: &'static str = "InternalIP";

    pub fn new(kind: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            address: address.into(),
        }
    }
}

/// Capacity and addresses of a node from the cluster inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInventoryEntry {
    pub name: String,
    pub capacity: ResourceQuantities,
    pub addresses: Vec<NodeAddress>,
}

impl NodeInventoryEntry {
    /// First internal IP in the address list
    pub fn internal_address(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.kind == NodeAddress::INTERNAL_IP)
            .map(|a| a.address.as_str())
    }
}

/// Live usage of a node from the metrics collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUsageSample {
    pub node_name: String,
    pub timestamp: DateTime<Utc>,
    pub usage: ResourceQuantities,
}

/// One series of a multi-series time-series result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledSeries {
    pub labels: Labels,
    pub series: MetricSeries,
}

/// Seconds since the epoch with sub-second precision
pub fn unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_millis()) / 1000.0
}
