//! Force a reconciliation pass.

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::Fdb;
use fdb_core::store::ClusterStore;

/// Ask the operator to run another reconciliation pass over a cluster.
#[derive(StructOpt)]
#[structopt(name = "reconcile")]
pub struct Reconcile {
    /// The name of the cluster to reconcile.
    name: String,
}

impl Reconcile {
    pub async fn run(&self, base: &Fdb) -> Result<()> {
        let store = base.get_store().await?;
        store
            .force_reconcile(&self.name)
            .await
            .with_context(|| format!("error requesting reconciliation of cluster {}", self.name))?;
        tracing::info!(cluster = %self.name, "reconciliation requested");
        Ok(())
    }
}
