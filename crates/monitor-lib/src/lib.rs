//! Cluster monitoring query layer
//!
//! This crate provides the core functionality for:
//! - Validating metric queries and compiling level options into query specs
//! - Deriving node metrics from cluster inventory and the metrics API
//! - Range and raw-expression queries against a time-series backend
//! - Ranking and paging multi-entity results
//! - Health checks and observability

pub mod assembler;
pub mod backend;
pub mod catalog;
pub mod expression;
pub mod facade;
pub mod health;
pub mod level;
pub mod models;
pub mod observability;
pub mod options;
pub mod params;
pub mod quantity;
pub mod resolver;
pub mod snapshot;

pub use catalog::MetricCatalog;
pub use facade::{Capability, FacadeOutcome, MetricsFacade};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use level::{LevelSet, MonitorLevel};
pub use models::*;
pub use observability::{QueryLogger, QueryMetrics};
pub use params::{PageParams, RequestParams, ScopeParams, TimeParams, ValidationError};
pub use resolver::QueryResolver;
pub use snapshot::SnapshotBackend;
