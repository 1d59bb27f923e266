//! External telemetry sources
//!
//! The query layer consumes three collaborators through these traits: the
//! cluster inventory (node capacity and addresses), the live usage source
//! (metrics API) and a time-series backend (Prometheus). Concrete adapters
//! live in the submodules.

mod kubernetes;
mod prometheus_client;
mod tracked;

pub use kubernetes::{
    connect, metrics_api_supported, ConnectError, KubeInventory, MetricsApiUsage,
};
pub use prometheus_client::{PrometheusAuth, PrometheusClient};
pub use tracked::HealthTracked;

use crate::models::{LabeledSeries, NodeInventoryEntry, NodeUsageSample};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use async_trait::async_trait;

/// Failures of external backends. These never fail a request; they are
/// reported on the affected metrics instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("inventory unavailable: {0}")]
    InventoryUnavailable(String),

    #[error("usage backend unavailable: {0}")]
    UsageBackendUnavailable(String),

    #[error("metrics API not available")]
    MetricsApiNotAvailable,

    #[error("time-series backend not configured")]
    TimeSeriesNotConfigured,

    #[error("time-series query failed: {0}")]
    TimeSeries(String),

    #[error("no expression defined for metric {0}")]
    NoExpression(String),
}

/// Cluster inventory: node capacity and addresses
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeInventoryEntry>, BackendError>;
}

/// Live per-node resource usage
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn list_node_usage(&self) -> Result<Vec<NodeUsageSample>, BackendError>;
}

/// Expression-based time-series store
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// Evaluate `expression` at a single point in time
    async fn query_instant(
        &self,
        expression: &str,
        time: DateTime<Utc>,
    ) -> Result<Vec<LabeledSeries>, BackendError>;

    /// Evaluate `expression` over `[start, end]` every `step`
    async fn query_range(
        &self,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<LabeledSeries>, BackendError>;
}
