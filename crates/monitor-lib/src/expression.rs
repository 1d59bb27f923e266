//! PromQL templates for named metrics
//!
//! Renders a catalog metric plus a [`QuerySpec`] into an expression for the
//! time-series backend. Label expressions produced by the option compiler are
//! spliced in verbatim.

use crate::level::MonitorLevel;
use crate::options::{QuerySpec, MATCH_ALL};
use std::time::Duration;

const CONTAINER_FILTER: &str = r#"container!="", container!="POD""#;
const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(300);

/// Escape a value for use inside a PromQL string literal
fn quote(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', "\\\"")
}

/// Builds a comma separated label matcher list
#[derive(Default)]
struct Matchers(Vec<String>);

impl Matchers {
    fn raw(mut self, expr: &str) -> Self {
        if !expr.is_empty() {
            self.0.push(expr.to_string());
        }
        self
    }

    fn eq(mut self, label: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.0.push(format!(r#"{}="{}""#, label, quote(value)));
        }
        self
    }

    fn re(mut self, label: &str, pattern: &str) -> Self {
        if !pattern.is_empty() && pattern != MATCH_ALL {
            self.0.push(format!(r#"{}=~"{}""#, label, quote(pattern)));
        }
        self
    }

    /// Exact match when `value` is set, otherwise the regex filter
    fn eq_or_re(self, label: &str, value: &str, pattern: &str) -> Self {
        if value.is_empty() {
            self.re(label, pattern)
        } else {
            self.eq(label, value)
        }
    }

    fn render(&self) -> String {
        self.0.join(", ")
    }
}

fn window(spec: &QuerySpec) -> String {
    format!("{}s", spec.duration.unwrap_or(DEFAULT_RATE_WINDOW).as_secs())
}

/// Expression for `metric` at the level of `spec`, or `None` when the
/// metric has no template
pub fn render(metric: &str, spec: &QuerySpec) -> Option<String> {
    match spec.level? {
        MonitorLevel::Cluster => cluster(metric),
        MonitorLevel::Node => node(metric, spec),
        MonitorLevel::Namespace => namespace(metric, spec),
        MonitorLevel::Application => application(metric, spec),
        MonitorLevel::Workload => workload(metric, spec),
        MonitorLevel::Service => service(metric, spec),
        MonitorLevel::Pod => pod(metric, spec),
        MonitorLevel::Container => container(metric, spec),
        MonitorLevel::PersistentVolumeClaim => pvc(metric, spec),
        MonitorLevel::Component => component(metric),
        MonitorLevel::Ingress => ingress(metric, spec),
    }
}

fn cluster(metric: &str) -> Option<String> {
    let expr = match metric {
        "cluster_cpu_usage" => r#"sum(rate(node_cpu_seconds_total{mode!="idle"}[5m]))"#,
        "cluster_cpu_total" => r#"count(node_cpu_seconds_total{mode="idle"})"#,
        "cluster_cpu_utilisation" => r#"1 - avg(rate(node_cpu_seconds_total{mode="idle"}[5m]))"#,
        "cluster_memory_usage_wo_cache" => {
            "sum(node_memory_MemTotal_bytes - node_memory_MemAvailable_bytes)"
        }
        "cluster_memory_total" => "sum(node_memory_MemTotal_bytes)",
        "cluster_memory_utilisation" => {
            "1 - sum(node_memory_MemAvailable_bytes) / sum(node_memory_MemTotal_bytes)"
        }
        "cluster_pod_running_count" => r#"count(kube_pod_status_phase{phase="Running"} == 1)"#,
        "cluster_node_total" => "count(kube_node_info)",
        _ => return None,
    };
    Some(expr.to_string())
}

fn node(metric: &str, spec: &QuerySpec) -> Option<String> {
    let sel = Matchers::default()
        .eq_or_re("node", &spec.node_name, &spec.resource_filter)
        .render();
    let with = |extra: &str| {
        if sel.is_empty() {
            extra.to_string()
        } else {
            format!("{}, {}", extra, sel)
        }
    };

    let expr = match metric {
        "node_cpu_usage" => format!(
            "sum by (node) (rate(node_cpu_seconds_total{{{}}}[5m]))",
            with(r#"mode!="idle""#)
        ),
        "node_cpu_total" => format!(
            "count by (node) (node_cpu_seconds_total{{{}}})",
            with(r#"mode="idle""#)
        ),
        "node_cpu_utilisation" => format!(
            "1 - avg by (node) (rate(node_cpu_seconds_total{{{}}}[5m]))",
            with(r#"mode="idle""#)
        ),
        "node_memory_usage_wo_cache" => format!(
            "sum by (node) (node_memory_MemTotal_bytes{{{0}}} - node_memory_MemAvailable_bytes{{{0}}})",
            sel
        ),
        "node_memory_total" => format!("sum by (node) (node_memory_MemTotal_bytes{{{}}})", sel),
        "node_memory_utilisation" => format!(
            "1 - sum by (node) (node_memory_MemAvailable_bytes{{{0}}}) / sum by (node) (node_memory_MemTotal_bytes{{{0}}})",
            sel
        ),
        _ => return None,
    };
    Some(expr)
}

fn namespace(metric: &str, spec: &QuerySpec) -> Option<String> {
    let sel = Matchers::default()
        .eq_or_re("namespace", &spec.namespace_name, &spec.resource_filter)
        .render();
    let containers = Matchers::default().raw(CONTAINER_FILTER).raw(&sel).render();

    let expr = match metric {
        "namespace_cpu_usage" => format!(
            "sum by (namespace) (rate(container_cpu_usage_seconds_total{{{}}}[5m]))",
            containers
        ),
        "namespace_memory_usage_wo_cache" => format!(
            "sum by (namespace) (container_memory_working_set_bytes{{{}}})",
            containers
        ),
        "namespace_pod_count" => format!("count by (namespace) (kube_pod_info{{{}}})", sel),
        _ => return None,
    };
    Some(expr)
}

/// Container `resource` joined onto workload owners selected by `owner`
fn by_workload(resource: &str, owner: &str, namespace: &str) -> Option<String> {
    let containers = Matchers::default()
        .raw(CONTAINER_FILTER)
        .eq("namespace", namespace)
        .render();
    let source = match resource {
        "cpu" => format!(
            "rate(container_cpu_usage_seconds_total{{{}}}[5m])",
            containers
        ),
        "memory" => format!("container_memory_working_set_bytes{{{}}}", containers),
        _ => return None,
    };
    Some(format!(
        "sum by (namespace, workload) ({} * on (namespace, pod) group_left(workload) namespace_workload_pod:kube_pod_owner:relabel{{{}}})",
        source, owner
    ))
}

fn application(metric: &str, spec: &QuerySpec) -> Option<String> {
    let resource = match metric {
        "application_cpu_usage" => "cpu",
        "application_memory_usage_wo_cache" => "memory",
        _ => return None,
    };
    by_workload(resource, &spec.resource_filter, &spec.namespace_name)
}

fn workload(metric: &str, spec: &QuerySpec) -> Option<String> {
    let resource = match metric {
        "workload_cpu_usage" => "cpu",
        "workload_memory_usage_wo_cache" => "memory",
        _ => return None,
    };
    let owner = Matchers::default()
        .eq("namespace", &spec.namespace_name)
        .eq("workload_type", &spec.workload_kind.to_lowercase())
        .re("workload", &spec.resource_filter)
        .render();
    by_workload(resource, &owner, &spec.namespace_name)
}

fn service(metric: &str, spec: &QuerySpec) -> Option<String> {
    let sel = Matchers::default()
        .raw(CONTAINER_FILTER)
        .raw(&spec.resource_filter)
        .render();
    let expr = match metric {
        "service_cpu_usage" => format!(
            "sum(rate(container_cpu_usage_seconds_total{{{}}}[5m]))",
            sel
        ),
        "service_memory_usage_wo_cache" => {
            format!("sum(container_memory_working_set_bytes{{{}}})", sel)
        }
        _ => return None,
    };
    Some(expr)
}

fn pod(metric: &str, spec: &QuerySpec) -> Option<String> {
    let pod_pattern = if spec.pod_name.is_empty() && !spec.workload_name.is_empty() {
        format!("{}-.*", spec.workload_name)
    } else {
        spec.resource_filter.clone()
    };
    let sel = Matchers::default()
        .raw(CONTAINER_FILTER)
        .raw(&spec.namespaced_resources_filter)
        .eq("namespace", &spec.namespace_name)
        .eq("node", &spec.node_name)
        .eq_or_re("pod", &spec.pod_name, &pod_pattern)
        .render();

    let expr = match metric {
        "pod_cpu_usage" => format!(
            "sum by (namespace, pod) (rate(container_cpu_usage_seconds_total{{{}}}[5m]))",
            sel
        ),
        "pod_memory_usage_wo_cache" => format!(
            "sum by (namespace, pod) (container_memory_working_set_bytes{{{}}})",
            sel
        ),
        _ => return None,
    };
    Some(expr)
}

fn container(metric: &str, spec: &QuerySpec) -> Option<String> {
    let sel = Matchers::default()
        .raw(CONTAINER_FILTER)
        .eq("namespace", &spec.namespace_name)
        .eq("pod", &spec.pod_name)
        .eq_or_re("container", &spec.container_name, &spec.resource_filter)
        .render();

    let expr = match metric {
        "container_cpu_usage" => format!(
            "sum by (namespace, pod, container) (rate(container_cpu_usage_seconds_total{{{}}}[5m]))",
            sel
        ),
        "container_memory_usage_wo_cache" => format!(
            "sum by (namespace, pod, container) (container_memory_working_set_bytes{{{}}})",
            sel
        ),
        _ => return None,
    };
    Some(expr)
}

fn pvc(metric: &str, spec: &QuerySpec) -> Option<String> {
    let sel = Matchers::default()
        .eq("namespace", &spec.namespace_name)
        .eq_or_re("persistentvolumeclaim", &spec.pvc_name, &spec.resource_filter)
        .render();

    let expr = match metric {
        "pvc_bytes_available" => format!(
            "max by (namespace, persistentvolumeclaim) (kubelet_volume_stats_available_bytes{{{}}})",
            sel
        ),
        "pvc_bytes_total" => format!(
            "max by (namespace, persistentvolumeclaim) (kubelet_volume_stats_capacity_bytes{{{}}})",
            sel
        ),
        "pvc_bytes_utilisation" => format!(
            "1 - max by (namespace, persistentvolumeclaim) (kubelet_volume_stats_available_bytes{{{0}}}) / max by (namespace, persistentvolumeclaim) (kubelet_volume_stats_capacity_bytes{{{0}}})",
            sel
        ),
        _ => return None,
    };
    Some(expr)
}

fn component(metric: &str) -> Option<String> {
    let expr = match metric {
        "etcd_server_list" => r#"count(up{job="etcd"} == 1)"#,
        "apiserver_request_rate" => "sum(irate(apiserver_request_total[5m]))",
        "scheduler_schedule_attempts" => "sum by (result) (scheduler_schedule_attempts_total)",
        _ => return None,
    };
    Some(expr.to_string())
}

fn ingress(metric: &str, spec: &QuerySpec) -> Option<String> {
    let sel = Matchers::default()
        .eq("exported_namespace", &spec.namespace_name)
        .eq_or_re("ingress", &spec.ingress, &spec.resource_filter)
        .eq("job", &spec.job)
        .eq("controller_pod", &spec.pod_name)
        .render();
    let window = window(spec);

    let expr = match metric {
        "ingress_request_count" => format!(
            "round(sum by (ingress) (increase(nginx_ingress_controller_requests{{{}}}[{}])))",
            sel, window
        ),
        "ingress_request_duration_average" => format!(
            "sum by (ingress) (rate(nginx_ingress_controller_request_duration_seconds_sum{{{0}}}[{1}])) / sum by (ingress) (rate(nginx_ingress_controller_request_duration_seconds_count{{{0}}}[{1}]))",
            sel, window
        ),
        _ => return None,
    };
    Some(expr)
}
