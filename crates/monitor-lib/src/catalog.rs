//! Named-metric catalog
//!
//! Fixed, ordered list of metric identifiers per monitoring level. The
//! catalog is built once at start-up and shared by reference.

use crate::level::MonitorLevel;
use regex::Regex;
use std::collections::HashMap;

pub const NODE_CPU_USAGE: &str = "node_cpu_usage";
pub const NODE_CPU_TOTAL: &str = "node_cpu_total";
pub const NODE_CPU_UTILISATION: &str = "node_cpu_utilisation";
pub const NODE_MEMORY_USAGE_WO_CACHE: &str = "node_memory_usage_wo_cache";
pub const NODE_MEMORY_TOTAL: &str = "node_memory_total";
pub const NODE_MEMORY_UTILISATION: &str = "node_memory_utilisation";

pub const POD_CPU_USAGE: &str = "pod_cpu_usage";
pub const POD_MEMORY_USAGE_WO_CACHE: &str = "pod_memory_usage_wo_cache";

const CLUSTER_METRICS: &[&str] = &[
    "cluster_cpu_usage",
    "cluster_cpu_total",
    "cluster_cpu_utilisation",
    "cluster_memory_usage_wo_cache",
    "cluster_memory_total",
    "cluster_memory_utilisation",
    "cluster_pod_running_count",
    "cluster_node_total",
];

const NODE_METRICS: &[&str] = &[
    NODE_CPU_USAGE,
    NODE_CPU_TOTAL,
    NODE_CPU_UTILISATION,
    NODE_MEMORY_USAGE_WO_CACHE,
    NODE_MEMORY_TOTAL,
    NODE_MEMORY_UTILISATION,
];

const NAMESPACE_METRICS: &[&str] = &[
    "namespace_cpu_usage",
    "namespace_memory_usage_wo_cache",
    "namespace_pod_count",
];

const APPLICATION_METRICS: &[&str] = &[
    "application_cpu_usage",
    "application_memory_usage_wo_cache",
];

const WORKLOAD_METRICS: &[&str] = &["workload_cpu_usage", "workload_memory_usage_wo_cache"];

const SERVICE_METRICS: &[&str] = &["service_cpu_usage", "service_memory_usage_wo_cache"];

const POD_METRICS: &[&str] = &[POD_CPU_USAGE, POD_MEMORY_USAGE_WO_CACHE];

const CONTAINER_METRICS: &[&str] = &["container_cpu_usage", "container_memory_usage_wo_cache"];

const PVC_METRICS: &[&str] = &["pvc_bytes_available", "pvc_bytes_total", "pvc_bytes_utilisation"];

const COMPONENT_METRICS: &[&str] = &[
    "etcd_server_list",
    "apiserver_request_rate",
    "scheduler_schedule_attempts",
];

const INGRESS_METRICS: &[&str] = &["ingress_request_count", "ingress_request_duration_average"];

/// Ordered metric identifiers per level
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    levels: HashMap<MonitorLevel, &'static [&'static str]>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCatalog {
    pub fn new() -> Self {
        let levels = HashMap::from([
            (MonitorLevel::Cluster, CLUSTER_METRICS),
            (MonitorLevel::Node, NODE_METRICS),
            (MonitorLevel::Namespace, NAMESPACE_METRICS),
            (MonitorLevel::Application, APPLICATION_METRICS),
            (MonitorLevel::Workload, WORKLOAD_METRICS),
            (MonitorLevel::Service, SERVICE_METRICS),
            (MonitorLevel::Pod, POD_METRICS),
            (MonitorLevel::Container, CONTAINER_METRICS),
            (MonitorLevel::PersistentVolumeClaim, PVC_METRICS),
            (MonitorLevel::Component, COMPONENT_METRICS),
            (MonitorLevel::Ingress, INGRESS_METRICS),
        ]);
        Self { levels }
    }

    /// All metrics of a level in catalog order
    pub fn metrics(&self, level: MonitorLevel) -> &'static [&'static str] {
        self.levels.get(&level).copied().unwrap_or(&[])
    }

    /// Metrics of a level matching `filter`, in catalog order
    pub fn select(&self, level: MonitorLevel, filter: &Regex) -> Vec<&'static str> {
        self.metrics(level)
            .iter()
            .copied()
            .filter(|name| filter.is_match(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_level_has_a_catalog() {
        let catalog = MetricCatalog::new();
        for level in MonitorLevel::ALL {
            assert!(!catalog.metrics(level).is_empty(), "{level} has no metrics");
        }
    }

    #[test]
    fn test_match_all_returns_full_node_catalog() {
        let catalog = MetricCatalog::new();
        let selected = catalog.select(MonitorLevel::Node, &Regex::new(".*").unwrap());
        assert_eq!(selected, NODE_METRICS);
    }

    #[test]
    fn test_selection_follows_catalog_order() {
        let catalog = MetricCatalog::new();
        let forward = Regex::new("node_memory_total|node_cpu_usage").unwrap();
        let reverse = Regex::new("node_cpu_usage|node_memory_total").unwrap();

        let expected = vec![NODE_CPU_USAGE, NODE_MEMORY_TOTAL];
        assert_eq!(catalog.select(MonitorLevel::Node, &forward), expected);
        assert_eq!(catalog.select(MonitorLevel::Node, &reverse), expected);
    }

    #[test]
    fn test_cpu_prefix_filter() {
        let catalog = MetricCatalog::new();
        let selected = catalog.select(MonitorLevel::Node, &Regex::new("node_cpu_.*").unwrap());
        assert_eq!(
            selected,
            vec![NODE_CPU_USAGE, NODE_CPU_TOTAL, NODE_CPU_UTILISATION]
        );
    }

    #[test]
    fn test_filter_matching_nothing() {
        let catalog = MetricCatalog::new();
        let selected = catalog.select(MonitorLevel::Pod, &Regex::new("^node_").unwrap());
        assert!(selected.is_empty());
    }
}
