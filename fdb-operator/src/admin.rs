//! Access to the database's administrative interface.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;

use fdb_core::crd::{FoundationDBCluster, RequiredMetadata};
use fdb_core::status::FoundationDBStatus;
use fdb_core::AppError;

/// Grace period on top of the fdbcli timeout before the child process is killed.
const PROCESS_GRACE: Duration = Duration::from_secs(5);

/// A client of a single cluster's administrative interface.
///
/// Every acquired client must be closed exactly once.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Fetch the cluster's current status document.
    async fn get_status(&self) -> Result<FoundationDBStatus, AppError>;

    /// Release any resources held by this client.
    async fn close(self: Box<Self>) -> Result<(), AppError>;
}

/// A factory of admin clients.
#[async_trait]
pub trait AdminClientProvider: Send + Sync {
    /// Acquire an admin client for the given cluster.
    async fn admin_client(&self, cluster: &FoundationDBCluster) -> Result<Box<dyn AdminClient>, AppError>;
}

/// Provides admin clients which shell out to `fdbcli`.
pub struct CliAdminClientProvider {
    fdbcli_path: String,
    timeout: Duration,
}

impl CliAdminClientProvider {
    /// Create a new instance.
    pub fn new(fdbcli_path: String, timeout: Duration) -> Self {
        Self { fdbcli_path, timeout }
    }
}

#[async_trait]
impl AdminClientProvider for CliAdminClientProvider {
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.name()))]
    async fn admin_client(&self, cluster: &FoundationDBCluster) -> Result<Box<dyn AdminClient>, AppError> {
        let connection_string = cluster
            .status
            .as_ref()
            .and_then(|status| status.connection_string.as_deref())
            .filter(|val| !val.is_empty())
            .ok_or_else(|| AppError::Transient(anyhow!("cluster {} has no connection string yet", cluster.name())))?;

        let mut cluster_file = NamedTempFile::new()
            .context("error creating cluster file")
            .map_err(AppError::Transient)?;
        cluster_file
            .write_all(connection_string.as_bytes())
            .and_then(|_| cluster_file.flush())
            .context("error writing cluster file")
            .map_err(AppError::Transient)?;

        Ok(Box::new(CliAdminClient {
            fdbcli_path: self.fdbcli_path.clone(),
            timeout: self.timeout,
            cluster_file,
        }))
    }
}

/// An admin client which runs `fdbcli` against a temporary cluster file.
pub struct CliAdminClient {
    fdbcli_path: String,
    timeout: Duration,
    cluster_file: NamedTempFile,
}

#[async_trait]
impl AdminClient for CliAdminClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_status(&self) -> Result<FoundationDBStatus, AppError> {
        let output_fut = Command::new(&self.fdbcli_path)
            .arg("-C")
            .arg(self.cluster_file.path())
            .arg("--timeout")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg("--exec")
            .arg("status json")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout + PROCESS_GRACE, output_fut)
            .await
            .context("timeout while running fdbcli")
            .map_err(AppError::Transient)?
            .context("error running fdbcli")
            .map_err(AppError::Transient)?;
        if !output.status.success() {
            return Err(AppError::Transient(anyhow!(
                "fdbcli exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .context("error decoding status json")
            .map_err(AppError::Transient)
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.cluster_file
            .close()
            .context("error removing cluster file")
            .map_err(AppError::Transient)
    }
}
