//! Query options
//!
//! Every monitoring level has its own option type that compiles the
//! level-specific parameters into a [`QuerySpec`]. The [`QueryOption`] sum type
//! dispatches over all of them; adding a level means adding a variant.

use crate::level::MonitorLevel;
use serde::Serialize;
use std::time::Duration;

/// Filter that matches every resource
pub const MATCH_ALL: &str = ".*";

/// Canonical, level-tagged description of what to query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuerySpec {
    /// `None` for options that do not target a level by themselves
    pub level: Option<MonitorLevel>,
    pub resource_filter: String,
    pub namespaced_resources_filter: String,
    pub query_type: String,
    pub node_name: String,
    pub workspace_name: String,
    pub namespace_name: String,
    pub workload_kind: String,
    pub workload_name: String,
    pub pod_name: String,
    pub container_name: String,
    pub storage_class_name: String,
    pub pvc_name: String,
    pub pvc_filter: String,
    pub application_name: String,
    pub service_name: String,
    pub ingress: String,
    pub job: String,
    pub component_type: String,
    pub duration: Option<Duration>,
}

impl QuerySpec {
    fn at(level: MonitorLevel) -> Self {
        Self {
            level: Some(level),
            ..Default::default()
        }
    }
}

/// Compiles a level option into a query spec. Compilation never fails.
pub trait CompileQuery {
    fn compile(&self) -> QuerySpec;
}

fn or_match_all(filter: &str) -> String {
    if filter.is_empty() {
        MATCH_ALL.to_string()
    } else {
        filter.to_string()
    }
}

fn alternation(items: &[String]) -> String {
    or_match_all(&items.join("|"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterOption;

impl CompileQuery for ClusterOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec::at(MonitorLevel::Cluster)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOption {
    /// Regex over node names
    pub resource_filter: String,
    pub node_name: String,
    pub storage_class_name: String,
    /// `rank` for node ranking queries
    pub query_type: String,
}

impl CompileQuery for NodeOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            resource_filter: or_match_all(&self.resource_filter),
            node_name: self.node_name.clone(),
            storage_class_name: self.storage_class_name.clone(),
            query_type: self.query_type.clone(),
            ..QuerySpec::at(MonitorLevel::Node)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceOption {
    pub resource_filter: String,
    pub workspace_name: String,
    pub namespace_name: String,
    pub storage_class_name: String,
}

impl CompileQuery for NamespaceOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            resource_filter: or_match_all(&self.resource_filter),
            workspace_name: self.workspace_name.clone(),
            namespace_name: self.namespace_name.clone(),
            storage_class_name: self.storage_class_name.clone(),
            ..QuerySpec::at(MonitorLevel::Namespace)
        }
    }
}

/// List of applications in a namespace.
///
/// Compiles to nothing: callers issue one [`ApplicationOption`] per item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationsOption {
    pub namespace_name: String,
    pub applications: Vec<String>,
    pub storage_class_name: String,
}

impl ApplicationsOption {
    /// One detail option per listed application, without component breakdown
    pub fn into_detail_options(self) -> Vec<ApplicationOption> {
        self.applications
            .into_iter()
            .map(|application| ApplicationOption {
                namespace_name: self.namespace_name.clone(),
                application,
                application_components: Vec::new(),
                storage_class_name: self.storage_class_name.clone(),
            })
            .collect()
    }
}

impl CompileQuery for ApplicationsOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec::default()
    }
}

/// A single application with its component workloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationOption {
    pub namespace_name: String,
    pub application: String,
    pub application_components: Vec<String>,
    pub storage_class_name: String,
}

impl CompileQuery for ApplicationOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            namespace_name: self.namespace_name.clone(),
            application_name: self.application.clone(),
            storage_class_name: self.storage_class_name.clone(),
            resource_filter: format!(
                r#"namespace="{}", workload=~"{}""#,
                self.namespace_name,
                alternation(&self.application_components)
            ),
            ..QuerySpec::at(MonitorLevel::Application)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadOption {
    pub resource_filter: String,
    pub namespace_name: String,
    pub workload_kind: String,
}

impl CompileQuery for WorkloadOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            resource_filter: or_match_all(&self.resource_filter),
            namespace_name: self.namespace_name.clone(),
            workload_kind: self.workload_kind.clone(),
            ..QuerySpec::at(MonitorLevel::Workload)
        }
    }
}

/// List of services in a namespace.
///
/// Compiles to nothing: callers issue one [`ServiceOption`] per item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicesOption {
    pub namespace_name: String,
    pub services: Vec<String>,
}

impl ServicesOption {
    /// One detail option per listed service; pods are resolved by the caller
    pub fn into_detail_options(self) -> Vec<ServiceOption> {
        self.services
            .into_iter()
            .map(|service_name| ServiceOption {
                namespace_name: self.namespace_name.clone(),
                service_name,
                ..Default::default()
            })
            .collect()
    }
}

impl CompileQuery for ServicesOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec::default()
    }
}

/// A single service with the pods that back it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOption {
    pub namespace_name: String,
    pub service_name: String,
    pub pod_names: Vec<String>,
}

impl CompileQuery for ServiceOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            namespace_name: self.namespace_name.clone(),
            service_name: self.service_name.clone(),
            resource_filter: format!(
                r#"pod=~"{}", namespace="{}""#,
                alternation(&self.pod_names),
                self.namespace_name
            ),
            ..QuerySpec::at(MonitorLevel::Service)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodOption {
    pub namespaced_resources_filter: String,
    pub resource_filter: String,
    pub node_name: String,
    pub namespace_name: String,
    pub workload_kind: String,
    pub workload_name: String,
    pub pod_name: String,
}

impl CompileQuery for PodOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            namespaced_resources_filter: self.namespaced_resources_filter.clone(),
            resource_filter: or_match_all(&self.resource_filter),
            node_name: self.node_name.clone(),
            namespace_name: self.namespace_name.clone(),
            workload_kind: self.workload_kind.clone(),
            workload_name: self.workload_name.clone(),
            pod_name: self.pod_name.clone(),
            ..QuerySpec::at(MonitorLevel::Pod)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOption {
    pub resource_filter: String,
    pub namespace_name: String,
    pub pod_name: String,
    pub container_name: String,
}

impl CompileQuery for ContainerOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            resource_filter: or_match_all(&self.resource_filter),
            namespace_name: self.namespace_name.clone(),
            pod_name: self.pod_name.clone(),
            container_name: self.container_name.clone(),
            ..QuerySpec::at(MonitorLevel::Container)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PvcOption {
    pub resource_filter: String,
    pub namespace_name: String,
    pub storage_class_name: String,
    pub pvc_name: String,
}

impl CompileQuery for PvcOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            resource_filter: or_match_all(&self.resource_filter),
            namespace_name: self.namespace_name.clone(),
            storage_class_name: self.storage_class_name.clone(),
            pvc_name: self.pvc_name.clone(),
            // metering selects claims by name
            pvc_filter: self.pvc_name.clone(),
            ..QuerySpec::at(MonitorLevel::PersistentVolumeClaim)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressOption {
    pub resource_filter: String,
    pub namespace_name: String,
    pub ingress: String,
    pub job: String,
    pub pod_name: String,
    /// Window for rate expressions
    pub duration: Option<Duration>,
}

impl CompileQuery for IngressOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            resource_filter: or_match_all(&self.resource_filter),
            namespace_name: self.namespace_name.clone(),
            ingress: self.ingress.clone(),
            job: self.job.clone(),
            pod_name: self.pod_name.clone(),
            duration: self.duration,
            ..QuerySpec::at(MonitorLevel::Ingress)
        }
    }
}

/// Control-plane components that can be monitored
pub mod components {
    pub const ETCD: &str = "etcd";
    pub const API_SERVER: &str = "apiserver";
    pub const SCHEDULER: &str = "scheduler";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentOption {
    /// One of [`components`]
    pub component_type: String,
}

impl CompileQuery for ComponentOption {
    fn compile(&self) -> QuerySpec {
        QuerySpec {
            component_type: self.component_type.clone(),
            ..QuerySpec::at(MonitorLevel::Component)
        }
    }
}

/// Any level option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOption {
    Cluster(ClusterOption),
    Node(NodeOption),
    Namespace(NamespaceOption),
    Applications(ApplicationsOption),
    Application(ApplicationOption),
    Workload(WorkloadOption),
    Services(ServicesOption),
    Service(ServiceOption),
    Pod(PodOption),
    Container(ContainerOption),
    Pvc(PvcOption),
    Ingress(IngressOption),
    Component(ComponentOption),
}

impl CompileQuery for QueryOption {
    fn compile(&self) -> QuerySpec {
        match self {
            QueryOption::Cluster(o) => o.compile(),
            QueryOption::Node(o) => o.compile(),
            QueryOption::Namespace(o) => o.compile(),
            QueryOption::Applications(o) => o.compile(),
            QueryOption::Application(o) => o.compile(),
            QueryOption::Workload(o) => o.compile(),
            QueryOption::Services(o) => o.compile(),
            QueryOption::Service(o) => o.compile(),
            QueryOption::Pod(o) => o.compile(),
            QueryOption::Container(o) => o.compile(),
            QueryOption::Pvc(o) => o.compile(),
            QueryOption::Ingress(o) => o.compile(),
            QueryOption::Component(o) => o.compile(),
        }
    }
}
