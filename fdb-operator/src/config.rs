//! Runtime configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The port used for metrics scraping and healthchecks.
    #[serde(default = "Config::default_http_port")]
    pub http_port: u16,

    /// The Kubernetes namespace watched by this operator.
    pub namespace: String,
    /// The name of the pod on which this instance is running.
    pub pod_name: String,

    /// The path to the `fdbcli` binary used to query cluster status.
    #[serde(default = "Config::default_fdbcli_path")]
    pub fdbcli_path: String,
    /// The timeout in seconds passed to `fdbcli` for admin commands.
    #[serde(default = "Config::default_admin_timeout_seconds")]
    pub admin_timeout_seconds: u64,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routing just parses the runtime environment and builds the application
    /// config from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// The admin command timeout as a duration.
    pub fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_timeout_seconds)
    }

    fn default_http_port() -> u16 {
        8080
    }

    fn default_fdbcli_path() -> String {
        "fdbcli".into()
    }

    fn default_admin_timeout_seconds() -> u64 {
        10
    }
}
