//! Request parameter validation
//!
//! Turns raw string parameters into a [`TimeSelector`], an optional
//! [`PagingDirective`] and a level [`QueryOption`]. Every input error is
//! reported here, before any backend is touched.

use crate::level::MonitorLevel;
use crate::options::{
    ApplicationOption, ApplicationsOption, ClusterOption, ComponentOption, ContainerOption,
    IngressOption, NamespaceOption, NodeOption, PodOption, PvcOption, QueryOption, ServiceOption,
    ServicesOption, WorkloadOption, MATCH_ALL,
};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

/// Step used for range queries without an explicit `step`
pub const DEFAULT_STEP: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_FILTER: &str = MATCH_ALL;
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_SIZE: usize = 5;

/// Input validation failures. Messages are stable for a given input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid parameter '{param}': '{value}' is not a Unix timestamp.")]
    InvalidTimestamp { param: &'static str, value: String },

    #[error("'start' must be before 'end'.")]
    InvalidTimeRange,

    #[error("Invalid parameter '{param}': '{value}' is not a duration of the form [0-9]+[smhdwy].")]
    InvalidDuration { param: &'static str, value: String },

    #[error("'time' and the combination of 'start' and 'end' are mutually exclusive.")]
    MutuallyExclusiveParameters,

    #[error("Invalid parameter 'page': '{0}'.")]
    InvalidPage(String),

    #[error("Invalid parameter 'limit': '{0}'.")]
    InvalidLimit(String),

    #[error("Invalid parameter 'metrics_filter': {0}")]
    InvalidMetricFilter(String),

    #[error("Invalid parameter 'resources_filter': {0}")]
    InvalidResourceFilter(String),

    #[error("Missing required parameter '{0}'.")]
    MissingParameter(&'static str),
}

/// Raw time parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeParams {
    pub time: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub step: Option<String>,
}

/// Raw ranking parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub target: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

/// Raw scope parameters. List parameters are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParams {
    pub metrics_filter: Option<String>,
    pub resources_filter: Option<String>,
    pub namespaced_resources_filter: Option<String>,
    #[serde(rename = "type")]
    pub query_type: Option<String>,
    pub node: Option<String>,
    pub workspace: Option<String>,
    pub namespace: Option<String>,
    pub workload_kind: Option<String>,
    pub workload: Option<String>,
    pub pod: Option<String>,
    pub pods: Option<String>,
    pub container: Option<String>,
    pub pvc: Option<String>,
    pub storage_class: Option<String>,
    pub application: Option<String>,
    pub applications: Option<String>,
    pub components: Option<String>,
    pub service: Option<String>,
    pub services: Option<String>,
    pub component_type: Option<String>,
    pub ingress: Option<String>,
    pub job: Option<String>,
    pub duration: Option<String>,
}

/// All request parameters as they arrive in a query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestParams {
    pub time: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub step: Option<String>,
    pub target: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
    pub metrics_filter: Option<String>,
    pub resources_filter: Option<String>,
    #[serde(rename = "type")]
    pub query_type: Option<String>,
}

impl RequestParams {
    /// Split into scope, time and page parameters
    pub fn split(self) -> (ScopeParams, TimeParams, PageParams) {
        let scope = ScopeParams {
            metrics_filter: self.metrics_filter,
            resources_filter: self.resources_filter,
            query_type: self.query_type,
            ..Default::default()
        };
        let time = TimeParams {
            time: self.time,
            start: self.start,
            end: self.end,
            step: self.step,
        };
        let page = PageParams {
            target: self.target,
            order: self.order,
            page: self.page,
            size: self.size,
        };
        (scope, time, page)
    }
}

/// Empty strings count as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: &Option<String>) -> String {
    present(value).unwrap_or_default().to_string()
}

fn list(value: &Option<String>) -> Vec<String> {
    present(value)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a `[0-9]+[smhdwy]` duration. Zero durations are rejected.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let unit = value.chars().last()?;
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let count: u64 = digits.parse().ok()?;
    let unit_secs: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        'y' => 365 * 24 * 60 * 60,
        _ => return None,
    };
    let secs = count.checked_mul(unit_secs)?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_timestamp(param: &'static str, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp {
        param,
        value: value.to_string(),
    };
    let secs: i64 = value.parse().map_err(|_| invalid())?;
    Utc.timestamp_opt(secs, 0).single().ok_or_else(invalid)
}

/// Point in time or time span of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSelector {
    Instant(DateTime<Utc>),
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    },
}

impl TimeSelector {
    /// Resolve raw time parameters, defaulting to an instant at `now`
    pub fn resolve(params: &TimeParams, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let time = present(&params.time);
        match (present(&params.start), present(&params.end)) {
            (Some(start), Some(end)) => {
                if time.is_some() {
                    return Err(ValidationError::MutuallyExclusiveParameters);
                }
                let start = parse_timestamp("start", start)?;
                let end = parse_timestamp("end", end)?;
                if start >= end {
                    return Err(ValidationError::InvalidTimeRange);
                }
                let step = match present(&params.step) {
                    None => DEFAULT_STEP,
                    Some(step) => {
                        parse_duration(step).ok_or_else(|| ValidationError::InvalidDuration {
                            param: "step",
                            value: step.to_string(),
                        })?
                    }
                };
                Ok(TimeSelector::Range { start, end, step })
            }
            (None, None) => match time {
                None => Ok(TimeSelector::Instant(now)),
                Some(time) => Ok(TimeSelector::Instant(parse_timestamp("time", time)?)),
            },
            _ => Err(ValidationError::MutuallyExclusiveParameters),
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, TimeSelector::Instant(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Sort-by-metric and page slicing for multi-entity instant results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingDirective {
    pub target: String,
    pub order: SortOrder,
    pub page: usize,
    pub size: usize,
}

impl PagingDirective {
    /// `None` unless a ranking `target` is given
    pub fn resolve(params: &PageParams) -> Result<Option<Self>, ValidationError> {
        let Some(target) = present(&params.target) else {
            return Ok(None);
        };

        let order = if present(&params.order) == Some("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        };

        let page = match present(&params.page) {
            None => DEFAULT_PAGE,
            Some(raw) => positive(raw).ok_or_else(|| ValidationError::InvalidPage(raw.to_string()))?,
        };
        let size = match present(&params.size) {
            None => DEFAULT_SIZE,
            Some(raw) => {
                positive(raw).ok_or_else(|| ValidationError::InvalidLimit(raw.to_string()))?
            }
        };

        Ok(Some(Self {
            target: target.to_string(),
            order,
            page,
            size,
        }))
    }
}

fn positive(raw: &str) -> Option<usize> {
    raw.parse::<i64>()
        .ok()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
}

impl ScopeParams {
    /// Compiled metric-name filter, `.*` when absent
    pub fn metric_filter(&self) -> Result<Regex, ValidationError> {
        let filter = present(&self.metrics_filter).unwrap_or(DEFAULT_FILTER);
        Regex::new(filter).map_err(|e| ValidationError::InvalidMetricFilter(e.to_string()))
    }

    /// Build the option for `level` from these parameters
    pub fn into_option(&self, level: MonitorLevel) -> Result<QueryOption, ValidationError> {
        let option = match level {
            MonitorLevel::Cluster => QueryOption::Cluster(ClusterOption),
            MonitorLevel::Node => {
                let resource_filter = owned(&self.resources_filter);
                if !resource_filter.is_empty() {
                    Regex::new(&resource_filter)
                        .map_err(|e| ValidationError::InvalidResourceFilter(e.to_string()))?;
                }
                QueryOption::Node(NodeOption {
                    resource_filter,
                    node_name: owned(&self.node),
                    storage_class_name: owned(&self.storage_class),
                    query_type: owned(&self.query_type),
                })
            }
            MonitorLevel::Namespace => QueryOption::Namespace(NamespaceOption {
                resource_filter: owned(&self.resources_filter),
                workspace_name: owned(&self.workspace),
                namespace_name: owned(&self.namespace),
                storage_class_name: owned(&self.storage_class),
            }),
            MonitorLevel::Application => match present(&self.application) {
                Some(application) => QueryOption::Application(ApplicationOption {
                    namespace_name: owned(&self.namespace),
                    application: application.to_string(),
                    application_components: list(&self.components),
                    storage_class_name: owned(&self.storage_class),
                }),
                None => QueryOption::Applications(ApplicationsOption {
                    namespace_name: owned(&self.namespace),
                    applications: list(&self.applications),
                    storage_class_name: owned(&self.storage_class),
                }),
            },
            MonitorLevel::Workload => QueryOption::Workload(WorkloadOption {
                resource_filter: owned(&self.resources_filter),
                namespace_name: owned(&self.namespace),
                workload_kind: owned(&self.workload_kind),
            }),
            MonitorLevel::Service => match present(&self.service) {
                Some(service) => QueryOption::Service(ServiceOption {
                    namespace_name: owned(&self.namespace),
                    service_name: service.to_string(),
                    pod_names: list(&self.pods),
                }),
                None => QueryOption::Services(ServicesOption {
                    namespace_name: owned(&self.namespace),
                    services: list(&self.services),
                }),
            },
            MonitorLevel::Pod => QueryOption::Pod(PodOption {
                namespaced_resources_filter: owned(&self.namespaced_resources_filter),
                resource_filter: owned(&self.resources_filter),
                node_name: owned(&self.node),
                namespace_name: owned(&self.namespace),
                workload_kind: owned(&self.workload_kind),
                workload_name: owned(&self.workload),
                pod_name: owned(&self.pod),
            }),
            MonitorLevel::Container => QueryOption::Container(ContainerOption {
                resource_filter: owned(&self.resources_filter),
                namespace_name: owned(&self.namespace),
                pod_name: owned(&self.pod),
                container_name: owned(&self.container),
            }),
            MonitorLevel::PersistentVolumeClaim => QueryOption::Pvc(PvcOption {
                resource_filter: owned(&self.resources_filter),
                namespace_name: owned(&self.namespace),
                storage_class_name: owned(&self.storage_class),
                pvc_name: owned(&self.pvc),
            }),
            MonitorLevel::Component => QueryOption::Component(ComponentOption {
                component_type: owned(&self.component_type),
            }),
            MonitorLevel::Ingress => {
                let duration = match present(&self.duration) {
                    None => None,
                    Some(raw) => Some(parse_duration(raw).ok_or_else(|| {
                        ValidationError::InvalidDuration {
                            param: "duration",
                            value: raw.to_string(),
                        }
                    })?),
                };
                QueryOption::Ingress(IngressOption {
                    resource_filter: owned(&self.resources_filter),
                    namespace_name: owned(&self.namespace),
                    ingress: owned(&self.ingress),
                    job: owned(&self.job),
                    pod_name: owned(&self.pod),
                    duration,
                })
            }
        };
        Ok(option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileQuery;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn time_params(time: &str, start: &str, end: &str, step: &str) -> TimeParams {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        TimeParams {
            time: opt(time),
            start: opt(start),
            end: opt(end),
            step: opt(step),
        }
    }

    fn page_params(target: &str, order: &str, page: &str, size: &str) -> PageParams {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        PageParams {
            target: opt(target),
            order: opt(order),
            page: opt(page),
            size: opt(size),
        }
    }

    #[test]
    fn test_range_with_default_step() {
        let selector =
            TimeSelector::resolve(&time_params("", "1559347200", "1561939200", ""), now()).unwrap();
        assert_eq!(
            selector,
            TimeSelector::Range {
                start: Utc.timestamp_opt(1559347200, 0).unwrap(),
                end: Utc.timestamp_opt(1561939200, 0).unwrap(),
                step: DEFAULT_STEP,
            }
        );
        assert_eq!(DEFAULT_STEP, Duration::from_secs(600));
    }

    #[test]
    fn test_range_with_explicit_step() {
        let selector =
            TimeSelector::resolve(&time_params("", "100", "200", "30s"), now()).unwrap();
        match selector {
            TimeSelector::Range { step, .. } => assert_eq!(step, Duration::from_secs(30)),
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_range_start_not_before_end() {
        for (start, end) in [("200", "100"), ("100", "100")] {
            let err = TimeSelector::resolve(&time_params("", start, end, ""), now()).unwrap_err();
            assert_eq!(err, ValidationError::InvalidTimeRange);
            assert_eq!(err.to_string(), "'start' must be before 'end'.");
        }
    }

    #[test]
    fn test_range_malformed_bounds() {
        let err = TimeSelector::resolve(&time_params("", "yesterday", "200", ""), now()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidTimestamp {
                param: "start",
                value: "yesterday".to_string()
            }
        );
    }

    #[test]
    fn test_range_malformed_step() {
        for step in ["10", "m", "10x", "-5m", "0s", "1.5h"] {
            let err = TimeSelector::resolve(&time_params("", "100", "200", step), now()).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidDuration { param: "step", .. }),
                "step {step} should be rejected"
            );
        }
    }

    #[test]
    fn test_lone_start_or_end_rejected() {
        let err = TimeSelector::resolve(&time_params("", "100", "", ""), now()).unwrap_err();
        assert_eq!(err, ValidationError::MutuallyExclusiveParameters);

        let err = TimeSelector::resolve(&time_params("", "", "200", ""), now()).unwrap_err();
        assert_eq!(err, ValidationError::MutuallyExclusiveParameters);
    }

    #[test]
    fn test_time_with_range_rejected() {
        let err = TimeSelector::resolve(&time_params("150", "100", "200", ""), now()).unwrap_err();
        assert_eq!(err, ValidationError::MutuallyExclusiveParameters);
        assert_eq!(
            err.to_string(),
            "'time' and the combination of 'start' and 'end' are mutually exclusive."
        );
    }

    #[test]
    fn test_instant_defaults_to_now() {
        let selector = TimeSelector::resolve(&TimeParams::default(), now()).unwrap();
        assert_eq!(selector, TimeSelector::Instant(now()));
        assert!(selector.is_instant());
    }

    #[test]
    fn test_instant_from_time() {
        let selector = TimeSelector::resolve(&time_params("1559347200", "", "", ""), now()).unwrap();
        assert_eq!(
            selector,
            TimeSelector::Instant(Utc.timestamp_opt(1559347200, 0).unwrap())
        );
    }

    #[test]
    fn test_instant_malformed_time() {
        let err = TimeSelector::resolve(&time_params("now", "", "", ""), now()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'time': 'now' is not a Unix timestamp."
        );
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let params = TimeParams {
            time: Some(String::new()),
            start: Some(String::new()),
            end: Some(String::new()),
            step: Some(String::new()),
        };
        assert_eq!(
            TimeSelector::resolve(&params, now()).unwrap(),
            TimeSelector::Instant(now())
        );
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86400)));
        assert_eq!(parse_duration("1w"), Some(Duration::from_secs(604800)));
        assert_eq!(parse_duration("1y"), Some(Duration::from_secs(31_536_000)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("5µ"), None);
    }

    #[test]
    fn test_no_paging_without_target() {
        let paging = PagingDirective::resolve(&page_params("", "asc", "3", "10")).unwrap();
        assert_eq!(paging, None);
    }

    #[test]
    fn test_paging_defaults() {
        let paging = PagingDirective::resolve(&page_params("node_cpu_usage", "", "", ""))
            .unwrap()
            .unwrap();
        assert_eq!(paging.target, "node_cpu_usage");
        assert_eq!(paging.order, SortOrder::Desc);
        assert_eq!(paging.page, DEFAULT_PAGE);
        assert_eq!(paging.size, DEFAULT_SIZE);
    }

    #[test]
    fn test_paging_order_only_exact_asc() {
        let asc = PagingDirective::resolve(&page_params("m", "asc", "", "")).unwrap().unwrap();
        assert_eq!(asc.order, SortOrder::Asc);

        let other = PagingDirective::resolve(&page_params("m", "ASC", "", "")).unwrap().unwrap();
        assert_eq!(other.order, SortOrder::Desc);
    }

    #[test]
    fn test_paging_invalid_page_and_size() {
        for raw in ["0", "-1", "two"] {
            let err = PagingDirective::resolve(&page_params("m", "", raw, "")).unwrap_err();
            assert_eq!(err, ValidationError::InvalidPage(raw.to_string()));
        }
        for raw in ["0", "-3", "ten"] {
            let err = PagingDirective::resolve(&page_params("m", "", "", raw)).unwrap_err();
            assert_eq!(err, ValidationError::InvalidLimit(raw.to_string()));
        }
        assert_eq!(
            ValidationError::InvalidPage("0".to_string()).to_string(),
            "Invalid parameter 'page': '0'."
        );
    }

    #[test]
    fn test_metric_filter_defaults_to_match_all() {
        let filter = ScopeParams::default().metric_filter().unwrap();
        assert!(filter.is_match("node_cpu_usage"));
    }

    #[test]
    fn test_invalid_metric_filter() {
        let scope = ScopeParams {
            metrics_filter: Some("node_(cpu".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            scope.metric_filter(),
            Err(ValidationError::InvalidMetricFilter(_))
        ));
    }

    #[test]
    fn test_node_option_from_params() {
        let scope = ScopeParams {
            node: Some("node-a".to_string()),
            query_type: Some("rank".to_string()),
            ..Default::default()
        };
        let spec = scope.into_option(MonitorLevel::Node).unwrap().compile();
        assert_eq!(spec.level, Some(MonitorLevel::Node));
        assert_eq!(spec.node_name, "node-a");
        assert_eq!(spec.query_type, "rank");
    }

    #[test]
    fn test_node_option_invalid_resource_filter() {
        let scope = ScopeParams {
            resources_filter: Some("[a-".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            scope.into_option(MonitorLevel::Node),
            Err(ValidationError::InvalidResourceFilter(_))
        ));
    }

    #[test]
    fn test_application_params_select_list_or_detail() {
        let list_scope = ScopeParams {
            namespace: Some("shop".to_string()),
            applications: Some("a, b".to_string()),
            ..Default::default()
        };
        match list_scope.into_option(MonitorLevel::Application).unwrap() {
            QueryOption::Applications(o) => assert_eq!(o.applications, vec!["a", "b"]),
            other => panic!("expected list option, got {other:?}"),
        }

        let detail_scope = ScopeParams {
            namespace: Some("shop".to_string()),
            application: Some("a".to_string()),
            components: Some("web,db".to_string()),
            ..Default::default()
        };
        let spec = detail_scope
            .into_option(MonitorLevel::Application)
            .unwrap()
            .compile();
        assert_eq!(spec.resource_filter, r#"namespace="shop", workload=~"web|db""#);
    }

    #[test]
    fn test_ingress_duration() {
        let scope = ScopeParams {
            duration: Some("5m".to_string()),
            ..Default::default()
        };
        let spec = scope.into_option(MonitorLevel::Ingress).unwrap().compile();
        assert_eq!(spec.duration, Some(Duration::from_secs(300)));

        let bad = ScopeParams {
            duration: Some("five".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad.into_option(MonitorLevel::Ingress),
            Err(ValidationError::InvalidDuration { param: "duration", .. })
        ));
    }

    #[test]
    fn test_request_params_split() {
        let params = RequestParams {
            time: Some("100".to_string()),
            target: Some("node_cpu_usage".to_string()),
            metrics_filter: Some("node_cpu_.*".to_string()),
            ..Default::default()
        };
        let (scope, time, page) = params.split();
        assert_eq!(scope.metrics_filter.as_deref(), Some("node_cpu_.*"));
        assert_eq!(time.time.as_deref(), Some("100"));
        assert_eq!(page.target.as_deref(), Some("node_cpu_usage"));
    }
}
