//! Metrics facade
//!
//! Routes a compiled query to the backend that can answer it: instant
//! queries go to the snapshot backend, range queries to the time-series
//! backend. Backend failures are attached to the affected metrics and never
//! fail the query.

use crate::backend::{BackendError, TimeSeriesBackend};
use crate::expression;
use crate::level::MonitorLevel;
use crate::models::{LabeledSeries, Labels, Metric, MetricSeries};
use crate::observability::{QueryLogger, QueryMetrics};
use crate::options::QuerySpec;
use crate::params::TimeSelector;
use crate::snapshot::{SnapshotBackend, SnapshotOutcome};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::error;

const SNAPSHOT_BACKEND: &str = "snapshot";
const TIME_SERIES_BACKEND: &str = "time_series";

/// What the facade can do for a (level, time selector) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Derived from live cluster state
    Snapshot,
    /// Evaluated by the time-series backend
    TimeSeries,
    /// A backend would answer, but it is unavailable; metrics carry errors
    Unavailable,
    /// Nothing can answer this query; no backend is called
    NoDerivation,
}

/// Result of a facade query
#[derive(Debug, Clone, PartialEq)]
pub enum FacadeOutcome {
    Metrics(Vec<Metric>),
    /// The level has no derivation for the selector; distinct from failure
    NoDerivation(MonitorLevel),
}

impl FacadeOutcome {
    pub fn into_metrics(self) -> Vec<Metric> {
        match self {
            FacadeOutcome::Metrics(metrics) => metrics,
            FacadeOutcome::NoDerivation(_) => Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsFacade {
    snapshot: SnapshotBackend,
    time_series: Option<Arc<dyn TimeSeriesBackend>>,
    metrics: QueryMetrics,
    logger: QueryLogger,
}

impl MetricsFacade {
    pub fn new(
        snapshot: SnapshotBackend,
        time_series: Option<Arc<dyn TimeSeriesBackend>>,
        logger: QueryLogger,
    ) -> Self {
        Self {
            snapshot,
            time_series,
            metrics: QueryMetrics::new(),
            logger,
        }
    }

    pub fn capability(&self, level: MonitorLevel, selector: &TimeSelector) -> Capability {
        match selector {
            TimeSelector::Instant(_) if !self.snapshot.can_derive(level) => {
                Capability::NoDerivation
            }
            TimeSelector::Instant(_) if self.snapshot.is_available() => Capability::Snapshot,
            TimeSelector::Range { .. } if self.time_series.is_some() => Capability::TimeSeries,
            _ => Capability::Unavailable,
        }
    }

    /// Query `metric_names` (in catalog order) for `spec`
    pub async fn query(
        &self,
        spec: &QuerySpec,
        selector: &TimeSelector,
        metric_names: &[&str],
    ) -> FacadeOutcome {
        if metric_names.is_empty() {
            return FacadeOutcome::Metrics(Vec::new());
        }

        let outcome = match *selector {
            TimeSelector::Instant(_) => match self.snapshot.query(spec, metric_names).await {
                SnapshotOutcome::Metrics(metrics) => FacadeOutcome::Metrics(metrics),
                SnapshotOutcome::NoDerivation => match spec.level {
                    Some(level) => {
                        self.logger.log_no_derivation(level);
                        FacadeOutcome::NoDerivation(level)
                    }
                    None => FacadeOutcome::Metrics(Vec::new()),
                },
            },
            TimeSelector::Range { .. } => {
                FacadeOutcome::Metrics(self.query_range(spec, selector, metric_names).await)
            }
        };

        if let FacadeOutcome::Metrics(metrics) = &outcome {
            let backend = if selector.is_instant() {
                SNAPSHOT_BACKEND
            } else {
                TIME_SERIES_BACKEND
            };
            self.record_failures(metrics, backend);
        }
        outcome
    }

    /// Evaluate one expression per metric concurrently, reassembling in request order
    async fn query_range(
        &self,
        spec: &QuerySpec,
        selector: &TimeSelector,
        metric_names: &[&str],
    ) -> Vec<Metric> {
        let Some(backend) = &self.time_series else {
            return metric_names
                .iter()
                .map(|name| Metric::failed(*name, BackendError::TimeSeriesNotConfigured))
                .collect();
        };

        let mut tasks = JoinSet::new();
        let mut per_metric: Vec<Vec<Metric>> = vec![Vec::new(); metric_names.len()];

        for (index, name) in metric_names.iter().enumerate() {
            let Some(expr) = expression::render(name, spec) else {
                per_metric[index] = vec![Metric::failed(
                    *name,
                    BackendError::NoExpression(name.to_string()),
                )];
                continue;
            };
            let backend = Arc::clone(backend);
            let selector = *selector;
            tasks.spawn(async move { (index, evaluate(backend.as_ref(), &expr, &selector).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    per_metric[index] = series_metrics(metric_names[index], result);
                }
                // a panicked task leaves its slot empty
                Err(e) => error!(error = %e, "Range query task failed"),
            }
        }

        per_metric
            .into_iter()
            .zip(metric_names)
            .flat_map(|(metrics, name)| {
                if metrics.is_empty() {
                    vec![Metric::series(*name, Labels::new(), MetricSeries::default())]
                } else {
                    metrics
                }
            })
            .collect()
    }

    /// Evaluate a raw expression; a failure yields one failed metric named after it
    pub async fn query_expression(&self, expr: &str, selector: &TimeSelector) -> Vec<Metric> {
        let result = match &self.time_series {
            None => Err(BackendError::TimeSeriesNotConfigured),
            Some(backend) => evaluate(backend.as_ref(), expr, selector).await,
        };

        let metrics = match (result, selector) {
            (Err(e), _) => vec![Metric::failed(expr, e)],
            (Ok(series), TimeSelector::Instant(_)) => series
                .into_iter()
                .filter_map(|s| {
                    let sample = *s.series.last()?;
                    Some(Metric::sample(expr, s.labels, sample))
                })
                .collect(),
            (Ok(series), TimeSelector::Range { .. }) => series
                .into_iter()
                .map(|s| Metric::series(expr, s.labels, s.series))
                .collect(),
        };
        self.record_failures(&metrics, TIME_SERIES_BACKEND);
        metrics
    }

    fn record_failures(&self, metrics: &[Metric], backend: &str) {
        for metric in metrics {
            if let Some(error) = metric.error() {
                self.metrics.inc_backend_errors(backend);
                self.logger.log_backend_degraded(backend, metric.name(), error);
            }
        }
    }
}

async fn evaluate(
    backend: &dyn TimeSeriesBackend,
    expr: &str,
    selector: &TimeSelector,
) -> Result<Vec<LabeledSeries>, BackendError> {
    match *selector {
        TimeSelector::Instant(time) => backend.query_instant(expr, time).await,
        TimeSelector::Range { start, end, step } => {
            backend.query_range(expr, start, end, step).await
        }
    }
}

fn series_metrics(name: &str, result: Result<Vec<LabeledSeries>, BackendError>) -> Vec<Metric> {
    match result {
        Ok(series) => series
            .into_iter()
            .map(|s| Metric::series(name, s.labels, s.series))
            .collect(),
        Err(e) => vec![Metric::failed(name, e)],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::async_trait;
    use crate::catalog::{NODE_CPU_TOTAL, NODE_CPU_USAGE, NODE_CPU_UTILISATION, POD_CPU_USAGE};
    use crate::models::MetricSample;
    use crate::snapshot::fixtures::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every expression with `series`, failing expressions that
    /// contain `fail_on`
    pub(crate) struct ScriptedTimeSeries {
        pub series: Vec<LabeledSeries>,
        pub fail_on: Option<&'static str>,
        pub calls: AtomicUsize,
    }

    impl ScriptedTimeSeries {
        pub(crate) fn new(series: Vec<LabeledSeries>) -> Self {
            Self {
                series,
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn answer(&self, expression: &str) -> Result<Vec<LabeledSeries>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_on {
                Some(pattern) if expression.contains(pattern) => {
                    Err(BackendError::TimeSeries("bad_data".to_string()))
                }
                _ => Ok(self.series.clone()),
            }
        }
    }

    #[async_trait]
    impl TimeSeriesBackend for ScriptedTimeSeries {
        async fn query_instant(
            &self,
            expression: &str,
            _time: DateTime<Utc>,
        ) -> Result<Vec<LabeledSeries>, BackendError> {
            self.answer(expression)
        }

        async fn query_range(
            &self,
            expression: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _step: Duration,
        ) -> Result<Vec<LabeledSeries>, BackendError> {
            self.answer(expression)
        }
    }

    fn labeled(node: &str) -> LabeledSeries {
        LabeledSeries {
            labels: Labels::from([("node".to_string(), node.to_string())]),
            series: MetricSeries::new(vec![
                MetricSample::new(1_700_000_000.0, 1.0),
                MetricSample::new(1_700_000_600.0, 2.0),
            ]),
        }
    }

    fn snapshot() -> SnapshotBackend {
        SnapshotBackend::new(
            Arc::new(StaticInventory(Ok(vec![inventory_entry("node-a", 4000, 1 << 30)]))),
            Arc::new(StaticUsage(Ok(vec![usage_sample("node-a", 1000, 1 << 20)]))),
        )
    }

    fn facade(time_series: Option<Arc<dyn TimeSeriesBackend>>) -> MetricsFacade {
        MetricsFacade::new(snapshot(), time_series, QueryLogger::new("test"))
    }

    fn node_spec() -> QuerySpec {
        QuerySpec {
            level: Some(MonitorLevel::Node),
            resource_filter: ".*".to_string(),
            ..Default::default()
        }
    }

    fn range() -> TimeSelector {
        TimeSelector::Range {
            start: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            end: Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
            step: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn test_empty_metric_names_calls_no_backend() {
        let backend = Arc::new(ScriptedTimeSeries::new(vec![labeled("node-a")]));
        let facade = facade(Some(backend.clone()));

        let outcome = facade.query(&node_spec(), &range(), &[]).await;

        assert_eq!(outcome, FacadeOutcome::Metrics(Vec::new()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_instant_node_query_uses_snapshot() {
        let outcome = facade(None)
            .query(
                &node_spec(),
                &TimeSelector::Instant(observed_at()),
                &[NODE_CPU_USAGE],
            )
            .await;

        let metrics = outcome.into_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value(), Some(1.0));
    }

    #[tokio::test]
    async fn test_instant_pod_query_reports_no_derivation() {
        let spec = QuerySpec {
            level: Some(MonitorLevel::Pod),
            ..Default::default()
        };
        let facade = facade(None);
        let selector = TimeSelector::Instant(observed_at());

        assert_eq!(
            facade.capability(MonitorLevel::Pod, &selector),
            Capability::NoDerivation
        );
        let outcome = facade.query(&spec, &selector, &[POD_CPU_USAGE]).await;
        assert_eq!(outcome, FacadeOutcome::NoDerivation(MonitorLevel::Pod));
    }

    #[tokio::test]
    async fn test_range_failure_is_per_metric() {
        let backend = ScriptedTimeSeries {
            fail_on: Some("count by (node)"),
            ..ScriptedTimeSeries::new(vec![labeled("node-a")])
        };
        let facade = facade(Some(Arc::new(backend)));
        let requested = [NODE_CPU_USAGE, NODE_CPU_TOTAL, NODE_CPU_UTILISATION];

        let metrics = facade
            .query(&node_spec(), &range(), &requested)
            .await
            .into_metrics();

        let names: Vec<&str> = metrics.iter().map(Metric::name).collect();
        assert_eq!(names, requested);
        assert!(metrics[0].error().is_none());
        assert_eq!(
            metrics[1].error(),
            Some("time-series query failed: bad_data")
        );
        assert!(metrics[2].error().is_none());
        assert_eq!(metrics[2].value(), Some(2.0));
    }

    #[tokio::test]
    async fn test_range_without_backend_fails_each_metric() {
        let facade = facade(None);
        assert_eq!(
            facade.capability(MonitorLevel::Node, &range()),
            Capability::Unavailable
        );

        let metrics = facade
            .query(&node_spec(), &range(), &[NODE_CPU_USAGE, NODE_CPU_TOTAL])
            .await
            .into_metrics();

        assert_eq!(metrics.len(), 2);
        assert!(metrics
            .iter()
            .all(|m| m.error() == Some("time-series backend not configured")));
    }

    #[tokio::test]
    async fn test_range_emits_one_metric_per_series() {
        let backend = ScriptedTimeSeries::new(vec![labeled("node-a"), labeled("node-b")]);
        let metrics = facade(Some(Arc::new(backend)))
            .query(&node_spec(), &range(), &[NODE_CPU_USAGE])
            .await
            .into_metrics();

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].labels()["node"], "node-b");
    }

    #[tokio::test]
    async fn test_instant_expression_takes_last_sample() {
        let backend = ScriptedTimeSeries::new(vec![labeled("node-a")]);
        let metrics = facade(Some(Arc::new(backend)))
            .query_expression("up", &TimeSelector::Instant(observed_at()))
            .await;

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "up");
        assert_eq!(metrics[0].value(), Some(2.0));
    }
}
