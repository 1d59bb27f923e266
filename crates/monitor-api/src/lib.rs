//! Monitoring query server
//!
//! HTTP transport over the `monitor-lib` query layer.

pub mod api;
pub mod config;
