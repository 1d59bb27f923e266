//! Monitoring query server
//!
//! Serves named-metric and raw-expression queries over HTTP. Instant node
//! metrics are derived from the cluster inventory and the metrics API; range
//! queries go to Prometheus when one is configured.

use anyhow::{Context, Result};
use monitor_api::{api, config::ServerConfig};
use monitor_lib::{
    backend::{
        connect, metrics_api_supported, HealthTracked, KubeInventory, MetricsApiUsage,
        PrometheusClient, TimeSeriesBackend,
    },
    health::{components, HealthRegistry},
    MetricCatalog, MetricsFacade, QueryLogger, QueryMetrics, QueryResolver, SnapshotBackend,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting monitor-api");

    let config = ServerConfig::load().context("invalid MONITOR_* configuration")?;
    info!(
        instance = %config.instance,
        api_port = config.api_port,
        prometheus_url = ?config.prometheus_url,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::INVENTORY).await;

    let client = connect(config.kube_context.as_deref())
        .await
        .context("failed to build Kubernetes client")?;

    let metrics_api = metrics_api_supported(&client).await;
    let snapshot = if metrics_api {
        health_registry.register(components::METRICS_API).await;
        SnapshotBackend::new(
            Arc::new(HealthTracked::new(
                KubeInventory::new(client.clone()),
                components::INVENTORY,
                health_registry.clone(),
            )),
            Arc::new(HealthTracked::new(
                MetricsApiUsage::new(client),
                components::METRICS_API,
                health_registry.clone(),
            )),
        )
    } else {
        warn!("Metrics API not available, node metrics will report errors");
        health_registry
            .set_degraded(components::METRICS_API, "metrics API not available")
            .await;
        SnapshotBackend::unavailable()
    };

    let time_series: Option<Arc<dyn TimeSeriesBackend>> = match &config.prometheus_url {
        Some(url) => {
            let client =
                PrometheusClient::with_auth(url, config.request_timeout(), config.prometheus_auth())
                    .context("invalid Prometheus configuration")?;
            health_registry.register(components::TIME_SERIES).await;
            Some(Arc::new(HealthTracked::new(
                client,
                components::TIME_SERIES,
                health_registry.clone(),
            )) as Arc<dyn TimeSeriesBackend>)
        }
        None => {
            health_registry
                .set_degraded(components::TIME_SERIES, "no Prometheus URL configured")
                .await;
            None
        }
    };
    let has_time_series = time_series.is_some();

    // Register self-metrics before the first scrape
    QueryMetrics::new();

    let logger = QueryLogger::new(&config.instance);
    let facade = MetricsFacade::new(snapshot, time_series, logger.clone());
    let resolver = QueryResolver::new(Arc::new(MetricCatalog::new()), facade, logger.clone());

    let app_state = Arc::new(api::AppState::new(
        resolver,
        health_registry.clone(),
        config.request_timeout(),
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(SERVER_VERSION, metrics_api, has_time_series);

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
