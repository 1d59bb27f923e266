//! HTTP API for metric queries, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    params::{RequestParams, TimeParams},
    MetricResultSet, MonitorLevel, QueryResolver, ScopeParams, ValidationError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Route prefix of the query API
pub const API_PREFIX: &str = "/kapis/monitor.captain.io/v1alpha1";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub resolver: QueryResolver,
    pub health_registry: HealthRegistry,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        resolver: QueryResolver,
        health_registry: HealthRegistry,
        request_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            health_registry,
            request_timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// Request failures. Backend failures are not errors; they are reported on
/// the affected metrics with a 200.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Timeout(Duration),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Timeout(limit) => (
                StatusCode::GATEWAY_TIMEOUT,
                format!("query did not complete within {}s", limit.as_secs()),
            ),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

type QueryResult = Result<Json<MetricResultSet>, ApiError>;

/// Run a query under the request timeout; dropping the future cancels
/// in-flight backend calls
async fn with_timeout<F>(state: &AppState, query: F) -> QueryResult
where
    F: Future<Output = Result<MetricResultSet, ValidationError>>,
{
    match tokio::time::timeout(state.request_timeout, query).await {
        Ok(result) => Ok(Json(result?)),
        Err(_) => {
            warn!(
                timeout_secs = state.request_timeout.as_secs(),
                "Query timed out"
            );
            Err(ApiError::Timeout(state.request_timeout))
        }
    }
}

async fn resolve(
    state: &AppState,
    level: MonitorLevel,
    params: RequestParams,
    scope: impl FnOnce(&mut ScopeParams),
) -> QueryResult {
    let (mut scope_params, time, page) = params.split();
    scope(&mut scope_params);
    with_timeout(
        state,
        state
            .resolver
            .resolve_query(level, &scope_params, &time, &page),
    )
    .await
}

async fn cluster_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RequestParams>,
) -> QueryResult {
    resolve(&state, MonitorLevel::Cluster, params, |_| {}).await
}

async fn node_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RequestParams>,
) -> QueryResult {
    resolve(&state, MonitorLevel::Node, params, |_| {}).await
}

async fn single_node_metrics(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
    Query(params): Query<RequestParams>,
) -> QueryResult {
    resolve(&state, MonitorLevel::Node, params, |scope| {
        scope.node = Some(node)
    })
    .await
}

async fn namespace_metrics(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(params): Query<RequestParams>,
) -> QueryResult {
    resolve(&state, MonitorLevel::Namespace, params, |scope| {
        scope.namespace = Some(namespace)
    })
    .await
}

async fn pod_metrics(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(params): Query<RequestParams>,
) -> QueryResult {
    resolve(&state, MonitorLevel::Pod, params, |scope| {
        scope.namespace = Some(namespace)
    })
    .await
}

async fn single_pod_metrics(
    State(state): State<Arc<AppState>>,
    Path((namespace, pod)): Path<(String, String)>,
    Query(params): Query<RequestParams>,
) -> QueryResult {
    resolve(&state, MonitorLevel::Pod, params, |scope| {
        scope.namespace = Some(namespace);
        scope.pod = Some(pod);
    })
    .await
}

/// Parameters of a raw-expression query
#[derive(Debug, Default, Deserialize)]
pub struct ExpressionParams {
    #[serde(default)]
    pub expr: String,
    #[serde(flatten)]
    pub time: TimeParams,
}

async fn expression_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExpressionParams>,
) -> QueryResult {
    with_timeout(
        &state,
        state.resolver.resolve_expression(&params.expr, &params.time),
    )
    .await
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

fn query_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cluster", get(cluster_metrics))
        .route("/nodes", get(node_metrics))
        .route("/nodes/:node", get(single_node_metrics))
        .route("/namespaces/:namespace", get(namespace_metrics))
        .route("/namespaces/:namespace/pods", get(pod_metrics))
        .route("/namespaces/:namespace/pods/:pod", get(single_pod_metrics))
        .route("/query", get(expression_query))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(API_PREFIX, query_routes())
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
