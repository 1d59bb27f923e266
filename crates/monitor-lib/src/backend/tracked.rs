//! Health reporting around backend sources
//!
//! Every call through a [`HealthTracked`] source updates its component in
//! the [`HealthRegistry`]: success marks it healthy, failure marks it
//! unhealthy or degraded depending on whether the component is critical.

use super::{async_trait, BackendError, InventorySource, TimeSeriesBackend, UsageSource};
use crate::health::HealthRegistry;
use crate::models::{LabeledSeries, NodeInventoryEntry, NodeUsageSample};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub struct HealthTracked<S> {
    inner: S,
    component: &'static str,
    registry: HealthRegistry,
}

impl<S> HealthTracked<S> {
    pub fn new(inner: S, component: &'static str, registry: HealthRegistry) -> Self {
        Self {
            inner,
            component,
            registry,
        }
    }

    async fn observe<T>(&self, result: Result<T, BackendError>) -> Result<T, BackendError> {
        match &result {
            Ok(_) => self.registry.set_healthy(self.component).await,
            Err(e) => self.registry.record_failure(self.component, e.to_string()).await,
        }
        result
    }
}

#[async_trait]
impl<S: InventorySource> InventorySource for HealthTracked<S> {
    async fn list_nodes(&self) -> Result<Vec<NodeInventoryEntry>, BackendError> {
        self.observe(self.inner.list_nodes().await).await
    }
}

#[async_trait]
impl<S: UsageSource> UsageSource for HealthTracked<S> {
    async fn list_node_usage(&self) -> Result<Vec<NodeUsageSample>, BackendError> {
        self.observe(self.inner.list_node_usage().await).await
    }
}

#[async_trait]
impl<S: TimeSeriesBackend> TimeSeriesBackend for HealthTracked<S> {
    async fn query_instant(
        &self,
        expression: &str,
        time: DateTime<Utc>,
    ) -> Result<Vec<LabeledSeries>, BackendError> {
        self.observe(self.inner.query_instant(expression, time).await)
            .await
    }

    async fn query_range(
        &self,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<LabeledSeries>, BackendError> {
        self.observe(self.inner.query_range(expression, start, end, step).await)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{components, ComponentStatus};
    use crate::snapshot::fixtures::*;

    #[tokio::test]
    async fn test_inventory_failure_blocks_readiness_until_recovery() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        let failing = HealthTracked::new(
            StaticInventory(Err(BackendError::InventoryUnavailable(
                "forbidden".to_string(),
            ))),
            components::INVENTORY,
            registry.clone(),
        );
        assert!(failing.list_nodes().await.is_err());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Critical component unhealthy: inventory")
        );

        let recovered = HealthTracked::new(
            StaticInventory(Ok(vec![inventory_entry("node-a", 4000, 1 << 30)])),
            components::INVENTORY,
            registry.clone(),
        );
        assert_eq!(recovered.list_nodes().await.unwrap().len(), 1);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_usage_failure_degrades_without_blocking_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        let usage = HealthTracked::new(
            StaticUsage(Err(BackendError::UsageBackendUnavailable(
                "timeout".to_string(),
            ))),
            components::METRICS_API,
            registry.clone(),
        );
        assert!(usage.list_node_usage().await.is_err());

        let health = registry.health().await;
        assert_eq!(
            health.components[components::METRICS_API].status,
            ComponentStatus::Degraded
        );
        assert!(registry.readiness().await.ready);
    }
}
