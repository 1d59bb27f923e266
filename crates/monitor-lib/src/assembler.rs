//! Ranking and paging of multi-entity results
//!
//! An entity is the set of metrics sharing one label set (one node, one
//! pod, ...). Entities are ranked by the value of a target metric and sliced
//! into a page. Failed metrics carry no labels and belong to no entity; they
//! are returned on every page after the ranked entities.

use crate::models::{Labels, Metric, MetricResultSet};
use crate::params::{PagingDirective, SortOrder};
use std::cmp::Ordering;

struct Entity {
    labels: Labels,
    metrics: Vec<Metric>,
    rank: Option<f64>,
}

/// Rank and page `metrics` according to `directive`
pub fn rank(metrics: Vec<Metric>, directive: &PagingDirective) -> MetricResultSet {
    let (failed, ranked): (Vec<Metric>, Vec<Metric>) = metrics
        .into_iter()
        .partition(|m| m.error().is_some() && m.labels().is_empty());

    let mut entities = group(ranked);
    for entity in &mut entities {
        entity.rank = entity
            .metrics
            .iter()
            .filter(|m| m.name() == directive.target)
            .find_map(Metric::value);
    }

    // stable: ties and unranked entities keep emission order
    entities.sort_by(|a, b| compare(a.rank, b.rank, directive.order));

    let total = entities.len();
    let results = entities
        .into_iter()
        .skip(directive.page.saturating_sub(1).saturating_mul(directive.size))
        .take(directive.size)
        .flat_map(|entity| entity.metrics)
        .chain(failed)
        .collect();

    MetricResultSet {
        results,
        page: directive.page,
        size: directive.size,
        total,
    }
}

/// Group metrics by label set, in order of first appearance
fn group(metrics: Vec<Metric>) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    for metric in metrics {
        match entities.iter_mut().find(|e| &e.labels == metric.labels()) {
            Some(entity) => entity.metrics.push(metric),
            None => entities.push(Entity {
                labels: metric.labels().clone(),
                metrics: vec![metric],
                rank: None,
            }),
        }
    }
    entities
}

/// Entities without a value sort last in either order
fn compare(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => a.total_cmp(&b),
            SortOrder::Desc => b.total_cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
