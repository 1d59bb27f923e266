//! Query resolution
//!
//! Validates raw request parameters, compiles the level option, asks the
//! facade for the selected metrics and assembles the result set. Every
//! validation error is raised before any backend is called.

use crate::assembler;
use crate::catalog::MetricCatalog;
use crate::facade::{FacadeOutcome, MetricsFacade};
use crate::level::MonitorLevel;
use crate::models::{Metric, MetricResultSet};
use crate::observability::{QueryLogger, QueryMetrics};
use crate::options::{CompileQuery, QueryOption, QuerySpec};
use crate::params::{
    PageParams, PagingDirective, ScopeParams, TimeParams, TimeSelector, ValidationError,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

const EXPRESSION_LEVEL: &str = "expression";

/// A request that passed validation
#[derive(Debug)]
struct ValidatedQuery {
    selector: TimeSelector,
    directive: Option<PagingDirective>,
    metric_names: Vec<&'static str>,
    specs: Vec<QuerySpec>,
}

#[derive(Clone)]
pub struct QueryResolver {
    catalog: Arc<MetricCatalog>,
    facade: MetricsFacade,
    metrics: QueryMetrics,
    logger: QueryLogger,
}

impl QueryResolver {
    pub fn new(catalog: Arc<MetricCatalog>, facade: MetricsFacade, logger: QueryLogger) -> Self {
        Self {
            catalog,
            facade,
            metrics: QueryMetrics::new(),
            logger,
        }
    }

    /// Resolve a named-metric query at `level`
    pub async fn resolve_query(
        &self,
        level: MonitorLevel,
        scope: &ScopeParams,
        time: &TimeParams,
        page: &PageParams,
    ) -> Result<MetricResultSet, ValidationError> {
        let started = Instant::now();
        let query = self
            .validate(level, scope, time, page)
            .map_err(|e| self.reject(&level.to_string(), e))?;

        let mut results = Vec::new();
        for spec in &query.specs {
            match self
                .facade
                .query(spec, &query.selector, &query.metric_names)
                .await
            {
                FacadeOutcome::Metrics(metrics) => results.extend(metrics),
                FacadeOutcome::NoDerivation(_) => {}
            }
        }

        let result_set = match (&query.directive, query.selector) {
            (Some(directive), TimeSelector::Instant(_)) => assembler::rank(results, directive),
            _ => MetricResultSet::new(results),
        };

        let elapsed = started.elapsed();
        self.metrics
            .observe_query_latency(&level.to_string(), elapsed.as_secs_f64());
        self.metrics.add_metrics_emitted(result_set.results.len());
        self.logger.log_query_resolved(
            level,
            query.selector.is_instant(),
            query.metric_names.len(),
            result_set.results.len(),
            count_failed(&result_set.results),
            elapsed.as_millis(),
        );

        Ok(result_set)
    }

    /// Evaluate a raw expression against the time-series backend
    pub async fn resolve_expression(
        &self,
        expr: &str,
        time: &TimeParams,
    ) -> Result<MetricResultSet, ValidationError> {
        let started = Instant::now();
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(self.reject(EXPRESSION_LEVEL, ValidationError::MissingParameter("expr")));
        }
        let selector = TimeSelector::resolve(time, Utc::now())
            .map_err(|e| self.reject(EXPRESSION_LEVEL, e))?;

        let results = self.facade.query_expression(expr, &selector).await;

        self.metrics
            .observe_query_latency(EXPRESSION_LEVEL, started.elapsed().as_secs_f64());
        self.metrics.add_metrics_emitted(results.len());
        self.logger
            .log_expression_resolved(expr, results.len(), count_failed(&results) > 0);

        Ok(MetricResultSet::new(results))
    }

    fn validate(
        &self,
        level: MonitorLevel,
        scope: &ScopeParams,
        time: &TimeParams,
        page: &PageParams,
    ) -> Result<ValidatedQuery, ValidationError> {
        let selector = TimeSelector::resolve(time, Utc::now())?;
        let directive = PagingDirective::resolve(page)?;
        let filter = scope.metric_filter()?;
        let option = scope.into_option(level)?;

        Ok(ValidatedQuery {
            selector,
            directive,
            metric_names: self.catalog.select(level, &filter),
            specs: expand(option),
        })
    }

    fn reject(&self, level: &str, error: ValidationError) -> ValidationError {
        self.metrics.inc_validation_failures(level);
        self.logger.log_validation_rejected(level, &error.to_string());
        error
    }
}

/// List options fan out into one compiled spec per listed item
fn expand(option: QueryOption) -> Vec<QuerySpec> {
    match option {
        QueryOption::Applications(list) => list
            .into_detail_options()
            .iter()
            .map(CompileQuery::compile)
            .collect(),
        QueryOption::Services(list) => list
            .into_detail_options()
            .iter()
            .map(CompileQuery::compile)
            .collect(),
        other => vec![other.compile()],
    }
}

fn count_failed(metrics: &[Metric]) -> usize {
    metrics.iter().filter(|m| m.error().is_some()).count()
}
