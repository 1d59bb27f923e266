//! Node metrics derived from inventory capacity and live usage

use crate::backend::{BackendError, InventorySource, UsageSource};
use crate::catalog::{
    NODE_CPU_TOTAL, NODE_CPU_USAGE, NODE_CPU_UTILISATION, NODE_MEMORY_TOTAL,
    NODE_MEMORY_USAGE_WO_CACHE, NODE_MEMORY_UTILISATION,
};
use crate::models::{Labels, Metric, MetricSample, NodeInventoryEntry, NodeUsageSample};
use crate::options::{QuerySpec, MATCH_ALL};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NODE_LABEL: &str = "node";
pub const HOST_IP_LABEL: &str = "host_ip";

/// Joins node inventory with node usage and computes the node catalog
#[derive(Clone)]
pub struct NodeMetricsDeriver {
    inventory: Arc<dyn InventorySource>,
    usage: Arc<dyn UsageSource>,
}

impl NodeMetricsDeriver {
    pub fn new(inventory: Arc<dyn InventorySource>, usage: Arc<dyn UsageSource>) -> Self {
        Self { inventory, usage }
    }

    /// Derive `metrics` for every node known to both sources.
    ///
    /// Output is grouped by node in name order; within a node, metrics keep
    /// the order of `metrics`.
    pub async fn derive(
        &self,
        spec: &QuerySpec,
        metrics: &[&str],
    ) -> Result<Vec<Metric>, BackendError> {
        let (inventory, usage) =
            tokio::join!(self.inventory.list_nodes(), self.usage.list_node_usage());
        let inventory = inventory?;
        let usage = usage?;

        let Some(selector) = NodeSelector::new(spec) else {
            return Ok(Vec::new());
        };

        let usage_by_node: HashMap<&str, &NodeUsageSample> =
            usage.iter().map(|u| (u.node_name.as_str(), u)).collect();

        let mut nodes: Vec<(&NodeInventoryEntry, &NodeUsageSample)> = inventory
            .iter()
            .filter(|entry| selector.matches(&entry.name))
            .filter_map(|entry| {
                usage_by_node
                    .get(entry.name.as_str())
                    .map(|usage| (entry, *usage))
            })
            .collect();
        nodes.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));

        debug!(
            inventory_nodes = inventory.len(),
            usage_nodes = usage.len(),
            joined_nodes = nodes.len(),
            "Joined node inventory with usage"
        );

        let mut results = Vec::with_capacity(nodes.len() * metrics.len());
        for (entry, usage) in nodes {
            let labels = node_labels(entry);
            for metric in metrics {
                if let Some(value) = derive_value(metric, entry, usage) {
                    let sample = MetricSample::at(usage.timestamp, value);
                    results.push(Metric::sample(*metric, labels.clone(), sample));
                }
            }
        }
        Ok(results)
    }
}

/// Node constraints of a query: an exact name and an anchored name regex
struct NodeSelector {
    node_name: Option<String>,
    filter: Option<Regex>,
}

impl NodeSelector {
    fn new(spec: &QuerySpec) -> Option<Self> {
        let node_name = (!spec.node_name.is_empty()).then(|| spec.node_name.clone());
        let filter = match spec.resource_filter.as_str() {
            "" | MATCH_ALL => None,
            pattern => match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(filter = %pattern, error = %e, "Ignoring query with invalid node filter");
                    return None;
                }
            },
        };
        Some(Self { node_name, filter })
    }

    fn matches(&self, node: &str) -> bool {
        self.node_name.as_deref().map_or(true, |name| name == node)
            && self.filter.as_ref().map_or(true, |re| re.is_match(node))
    }
}

fn node_labels(entry: &NodeInventoryEntry) -> Labels {
    let mut labels = Labels::new();
    labels.insert(NODE_LABEL.to_string(), entry.name.clone());
    if let Some(address) = entry.internal_address() {
        labels.insert(HOST_IP_LABEL.to_string(), address.to_string());
    }
    labels
}

/// `None` for unknown metrics and for utilisation of zero-capacity resources
fn derive_value(metric: &str, entry: &NodeInventoryEntry, usage: &NodeUsageSample) -> Option<f64> {
    let capacity = &entry.capacity;
    let usage = &usage.usage;
    match metric {
        NODE_CPU_USAGE => Some(usage.cpu_cores()),
        NODE_CPU_TOTAL => Some(capacity.cpu_cores()),
        NODE_CPU_UTILISATION => ratio(usage.cpu_millicores, capacity.cpu_millicores),
        NODE_MEMORY_USAGE_WO_CACHE => Some(usage.memory_bytes as f64),
        NODE_MEMORY_TOTAL => Some(capacity.memory_bytes as f64),
        NODE_MEMORY_UTILISATION => ratio(usage.memory_bytes, capacity.memory_bytes),
        _ => None,
    }
}

fn ratio(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| used as f64 / total as f64)
}
