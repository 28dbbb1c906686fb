//! List clusters.

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::Fdb;
use fdb_core::convergence::{evaluate, Strictness};
use fdb_core::crd::RequiredMetadata;
use fdb_core::store::ClusterStore;

/// List clusters along with their convergence state.
#[derive(StructOpt)]
#[structopt(name = "list")]
pub struct List {
    /// Only list clusters matching the given label selector, e.g. `app=foundationdb`.
    #[structopt(short = "l", long)]
    selector: Option<String>,
    /// Evaluate convergence in soft mode, ignoring pending phases other than reconciliation.
    #[structopt(long)]
    soft: bool,
}

impl List {
    pub async fn run(&self, base: &Fdb) -> Result<()> {
        let store = base.get_store().await?;
        let clusters = store.list(self.selector.as_deref()).await.context("error listing clusters")?;
        let strictness = if self.soft { Strictness::Soft } else { Strictness::Strict };

        println!("{:<30}{:>12}{:>12}{:>12}", "NAME", "GENERATION", "RECONCILED", "STATE");
        for cluster in clusters.iter() {
            let reconciled = cluster.status.as_ref().map(|status| status.generations.reconciled).unwrap_or_default();
            println!(
                "{:<30}{:>12}{:>12}{:>12}",
                cluster.name(),
                cluster.generation(),
                reconciled,
                evaluate(cluster, strictness, 0).to_string()
            );
        }
        Ok(())
    }
}
