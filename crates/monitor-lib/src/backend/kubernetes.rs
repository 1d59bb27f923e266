//! Kubernetes inventory and metrics-API usage sources
//!
//! Node capacity and addresses come from the core API; live usage comes from
//! the `metrics.k8s.io` aggregated API served by metrics-server. The metrics
//! API is not a typed resource in `k8s-openapi`, so it is read with raw
//! requests.

use super::{async_trait, BackendError, InventorySource, UsageSource};
use crate::models::{NodeAddress, NodeInventoryEntry, NodeUsageSample, ResourceQuantities};
use crate::quantity::{parse_cpu_millicores, parse_memory_bytes};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{
    api::{Api, ListParams},
    config::{InferConfigError, KubeConfigOptions, KubeconfigError},
    Client, Config,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const METRICS_API_GROUP_PATH: &str = "/apis/metrics.k8s.io";
const NODE_METRICS_PATH: &str = "/apis/metrics.k8s.io/v1beta1/nodes";
const SUPPORTED_METRICS_API_VERSIONS: &[&str] = &["v1beta1"];

/// Failures building the Kubernetes client
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] InferConfigError),

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to create client: {0}")]
    Client(#[from] kube::Error),
}

/// Build a client from the default kubeconfig or in-cluster config,
/// optionally switching to a named kubeconfig context
pub async fn connect(context: Option<&str>) -> Result<Client, ConnectError> {
    let config = match context {
        None => Config::infer().await?,
        Some(context) => {
            Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            })
            .await?
        }
    };
    Ok(Client::try_from(config)?)
}

/// Whether the cluster serves a supported version of the metrics API
pub async fn metrics_api_supported(client: &Client) -> bool {
    let request = match http::Request::get(METRICS_API_GROUP_PATH).body(Vec::new()) {
        Ok(request) => request,
        Err(_) => return false,
    };

    match client.request::<ApiGroup>(request).await {
        Ok(group) => group
            .versions
            .iter()
            .any(|v| SUPPORTED_METRICS_API_VERSIONS.contains(&v.version.as_str())),
        Err(e) => {
            debug!(error = %e, "Metrics API discovery failed");
            false
        }
    }
}

/// Node inventory read from the core API
#[derive(Clone)]
pub struct KubeInventory {
    client: Client,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InventorySource for KubeInventory {
    async fn list_nodes(&self) -> Result<Vec<NodeInventoryEntry>, BackendError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| BackendError::InventoryUnavailable(e.to_string()))?;

        Ok(list.items.into_iter().filter_map(node_to_entry).collect())
    }
}

/// Node usage read from the metrics API
#[derive(Clone)]
pub struct MetricsApiUsage {
    client: Client,
}

impl MetricsApiUsage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UsageSource for MetricsApiUsage {
    async fn list_node_usage(&self) -> Result<Vec<NodeUsageSample>, BackendError> {
        let request = http::Request::get(NODE_METRICS_PATH)
            .body(Vec::new())
            .map_err(|e| BackendError::UsageBackendUnavailable(e.to_string()))?;

        let list = self
            .client
            .request::<NodeMetricsList>(request)
            .await
            .map_err(|e| BackendError::UsageBackendUnavailable(e.to_string()))?;

        Ok(usage_samples(list.items))
    }
}

/// A node whose metrics item cannot be read is skipped; the join then
/// excludes it while the remaining nodes are still reported
fn usage_samples(items: Vec<NodeMetricsItem>) -> Vec<NodeUsageSample> {
    items
        .into_iter()
        .filter_map(|item| match item.into_sample() {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable node metrics");
                None
            }
        })
        .collect()
}

fn node_to_entry(node: Node) -> Option<NodeInventoryEntry> {
    let name = node.metadata.name?;
    let status = node.status.unwrap_or_default();

    let capacity = status
        .capacity
        .map(|capacity| capacity_quantities(&name, &capacity))
        .unwrap_or_default();

    let addresses = status
        .addresses
        .unwrap_or_default()
        .into_iter()
        .map(|a| NodeAddress::new(a.type_, a.address))
        .collect();

    Some(NodeInventoryEntry {
        name,
        capacity,
        addresses,
    })
}

/// Unparsable capacity counts as zero, which suppresses utilisation for the node
fn capacity_quantities(node: &str, capacity: &BTreeMap<String, Quantity>) -> ResourceQuantities {
    let read = |key: &str, parse: fn(&str) -> Result<u64, crate::quantity::QuantityError>| {
        capacity.get(key).map(|q| parse(&q.0)).transpose().unwrap_or_else(|e| {
            warn!(node = %node, resource = key, error = %e, "Ignoring node capacity");
            None
        })
    };

    ResourceQuantities {
        cpu_millicores: read("cpu", parse_cpu_millicores).unwrap_or_default(),
        memory_bytes: read("memory", parse_memory_bytes).unwrap_or_default(),
    }
}

// ============================================================================
// Metrics API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiGroup {
    #[serde(default)]
    versions: Vec<GroupVersion>,
}

#[derive(Debug, Deserialize)]
struct GroupVersion {
    version: String,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    items: Vec<NodeMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsItem {
    metadata: NodeMetricsMetadata,
    timestamp: String,
    usage: ResourceUsage,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResourceUsage {
    cpu: String,
    memory: String,
}

impl NodeMetricsItem {
    fn into_sample(self) -> Result<NodeUsageSample, BackendError> {
        let unavailable = |e: &dyn std::fmt::Display| {
            BackendError::UsageBackendUnavailable(format!("node {}: {}", self.metadata.name, e))
        };

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| unavailable(&e))?
            .with_timezone(&Utc);
        let usage = ResourceQuantities {
            cpu_millicores: parse_cpu_millicores(&self.usage.cpu).map_err(|e| unavailable(&e))?,
            memory_bytes: parse_memory_bytes(&self.usage.memory).map_err(|e| unavailable(&e))?,
        };

        Ok(NodeUsageSample {
            node_name: self.metadata.name,
            timestamp,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress as K8sNodeAddress, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str, cpu: &str, memory: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                capacity: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(cpu.to_string())),
                    ("memory".to_string(), Quantity(memory.to_string())),
                ])),
                addresses: Some(vec![
                    K8sNodeAddress {
                        type_: "Hostname".to_string(),
                        address: name.to_string(),
                    },
                    K8sNodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "192.168.1.10".to_string(),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_to_entry() {
        let entry = node_to_entry(node("node-a", "4", "16Gi")).unwrap();
        assert_eq!(entry.name, "node-a");
        assert_eq!(entry.capacity, ResourceQuantities::new(4000, 16 << 30));
        assert_eq!(entry.internal_address(), Some("192.168.1.10"));
    }

    #[test]
    fn test_node_with_bad_capacity_counts_as_zero() {
        let entry = node_to_entry(node("node-b", "many", "8Gi")).unwrap();
        assert_eq!(entry.capacity.cpu_millicores, 0);
        assert_eq!(entry.capacity.memory_bytes, 8 << 30);
    }

    #[test]
    fn test_unnamed_node_is_skipped() {
        assert!(node_to_entry(Node::default()).is_none());
    }

    #[test]
    fn test_node_metrics_item_into_sample() {
        let item: NodeMetricsItem = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "node-a" },
            "timestamp": "2024-05-01T12:00:00Z",
            "window": "20s",
            "usage": { "cpu": "1500000000n", "memory": "2Gi" }
        }))
        .unwrap();

        let sample = item.into_sample().unwrap();
        assert_eq!(sample.node_name, "node-a");
        assert_eq!(sample.timestamp.timestamp(), 1_714_564_800);
        assert_eq!(sample.usage, ResourceQuantities::new(1500, 2 << 30));
    }

    #[test]
    fn test_node_metrics_item_with_bad_timestamp() {
        let item: NodeMetricsItem = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "node-a" },
            "timestamp": "yesterday",
            "usage": { "cpu": "1", "memory": "1Gi" }
        }))
        .unwrap();

        assert!(matches!(
            item.into_sample(),
            Err(BackendError::UsageBackendUnavailable(_))
        ));
    }

    #[test]
    fn test_unreadable_item_skips_only_that_node() {
        let list: NodeMetricsList = serde_json::from_value(serde_json::json!({
            "items": [
                {
                    "metadata": { "name": "good" },
                    "timestamp": "2024-05-01T12:00:00Z",
                    "usage": { "cpu": "250m", "memory": "1Gi" }
                },
                {
                    "metadata": { "name": "bad" },
                    "timestamp": "2024-05-01T12:00:00Z",
                    "usage": { "cpu": "lots", "memory": "1Gi" }
                }
            ]
        }))
        .unwrap();

        let samples = usage_samples(list.items);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].node_name, "good");
        assert_eq!(samples[0].usage, ResourceQuantities::new(250, 1 << 30));
    }

    #[tokio::test]
    async fn test_unknown_context_is_a_kubeconfig_error() {
        let err = connect(Some("no-such-context-for-monitor-tests"))
            .await
            .err()
            .expect("connect should fail for an unknown context");
        assert!(matches!(err, ConnectError::Kubeconfig(_)));
    }
}
