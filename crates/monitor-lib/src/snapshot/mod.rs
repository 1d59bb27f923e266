//! Instant metrics derived from live cluster state
//!
//! The snapshot backend answers instant queries without a time-series store,
//! by combining the cluster inventory with the metrics API. Only the node
//! level can be derived this way; the pod level is declared but has no
//! derivation yet.

mod node;

pub use node::{NodeMetricsDeriver, HOST_IP_LABEL, NODE_LABEL};

#[cfg(test)]
pub(crate) use node::tests as fixtures;

use crate::backend::{BackendError, InventorySource, UsageSource};
use crate::level::{LevelSet, MonitorLevel};
use crate::models::Metric;
use crate::options::QuerySpec;
use std::sync::Arc;

/// Levels the snapshot backend can actually derive
pub const DERIVED_LEVELS: LevelSet = LevelSet::empty().with(MonitorLevel::Node);

/// Result of a snapshot query
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// Derived metrics, or one failed metric per requested name
    Metrics(Vec<Metric>),
    /// The level has no derivation; nothing was attempted
    NoDerivation,
}

#[derive(Clone)]
enum Usage {
    Available(NodeMetricsDeriver),
    /// The cluster does not serve a supported metrics API
    Unavailable,
}

/// Instant-query backend over inventory and live usage
#[derive(Clone)]
pub struct SnapshotBackend {
    usage: Usage,
}

impl SnapshotBackend {
    pub fn new(inventory: Arc<dyn InventorySource>, usage: Arc<dyn UsageSource>) -> Self {
        Self {
            usage: Usage::Available(NodeMetricsDeriver::new(inventory, usage)),
        }
    }

    /// Backend for clusters without a metrics API; every derivation fails
    pub fn unavailable() -> Self {
        Self {
            usage: Usage::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.usage, Usage::Available(_))
    }

    pub fn can_derive(&self, level: MonitorLevel) -> bool {
        DERIVED_LEVELS.contains(level)
    }

    /// Derive `metrics` for `spec`.
    ///
    /// Backend failures never escape: they become one failed metric per
    /// requested name, in request order.
    pub async fn query(&self, spec: &QuerySpec, metrics: &[&str]) -> SnapshotOutcome {
        let Some(level) = spec.level.filter(|level| self.can_derive(*level)) else {
            return SnapshotOutcome::NoDerivation;
        };

        let derived = match (&self.usage, level) {
            (Usage::Unavailable, _) => Err(BackendError::MetricsApiNotAvailable),
            (Usage::Available(nodes), MonitorLevel::Node) => nodes.derive(spec, metrics).await,
            _ => return SnapshotOutcome::NoDerivation,
        };

        match derived {
            Ok(results) => SnapshotOutcome::Metrics(results),
            Err(e) => SnapshotOutcome::Metrics(failed_all(metrics, &e)),
        }
    }
}

fn failed_all(metrics: &[&str], error: &BackendError) -> Vec<Metric> {
    metrics
        .iter()
        .map(|name| Metric::failed(*name, error))
        .collect()
}
