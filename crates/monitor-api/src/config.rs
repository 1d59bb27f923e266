//! Server configuration

use anyhow::Result;
use monitor_lib::backend::PrometheusAuth;
use serde::Deserialize;
use std::time::Duration;

/// Query server configuration, read from `MONITOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port for the query, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Time-series backend; range queries fail per metric when unset
    #[serde(default)]
    pub prometheus_url: Option<String>,

    /// Basic auth for Prometheus; takes precedence over the bearer token
    #[serde(default)]
    pub prometheus_username: Option<String>,

    #[serde(default)]
    pub prometheus_password: Option<String>,

    #[serde(default)]
    pub prometheus_bearer_token: Option<String>,

    /// Upper bound on a single query, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Kubeconfig context; in-cluster or default context when unset
    #[serde(default)]
    pub kube_context: Option<String>,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "monitor-api".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            api_port: default_api_port(),
            prometheus_url: None,
            prometheus_username: None,
            prometheus_password: None,
            prometheus_bearer_token: None,
            request_timeout_secs: default_request_timeout(),
            kube_context: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MONITOR"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn prometheus_auth(&self) -> PrometheusAuth {
        match (&self.prometheus_username, &self.prometheus_bearer_token) {
            (Some(username), _) => PrometheusAuth::Basic {
                username: username.clone(),
                password: self.prometheus_password.clone().unwrap_or_default(),
            },
            (None, Some(token)) => PrometheusAuth::Bearer(token.clone()),
            (None, None) => PrometheusAuth::None,
        }
    }
}
