//! Wait for a cluster to reconcile.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::Fdb;
use fdb_core::convergence::{ConvergenceTracker, ReconciliationOptions, Strictness};

/// Wait until a cluster has reconciled its latest generation.
///
/// While waiting, the operator is periodically asked to run another reconciliation pass, which
/// helps clusters whose change notifications were lost.
#[derive(StructOpt)]
#[structopt(name = "wait")]
pub struct Wait {
    /// The name of the cluster to wait on.
    name: String,
    /// Only require the reconciled generation to match, ignoring other pending phases.
    #[structopt(long)]
    soft: bool,
    /// The lowest reconciled generation to accept, `0` for none.
    #[structopt(long, default_value = "0")]
    minimum_generation: i64,
    /// Seconds to wait before giving up.
    #[structopt(long, default_value = "1800")]
    timeout: u64,
    /// Seconds between checks of the cluster's status.
    #[structopt(long, default_value = "10")]
    poll: u64,
    /// Seconds between requests for another reconciliation pass.
    #[structopt(long, default_value = "240")]
    staleness: u64,
}

impl Wait {
    pub async fn run(&self, base: &Fdb) -> Result<()> {
        let options = self.options();
        let store = base.get_store().await?;
        let tracker = ConvergenceTracker::new(store);

        let start = Instant::now();
        tracker
            .wait_for_generation(&self.name, &options)
            .await
            .with_context(|| format!("error waiting for cluster {} to reconcile", self.name))?;
        tracing::info!(cluster = %self.name, elapsed = ?start.elapsed(), "cluster reconciled");
        Ok(())
    }

    fn options(&self) -> ReconciliationOptions {
        let strictness = if self.soft { Strictness::Soft } else { Strictness::Strict };
        ReconciliationOptions::default()
            .with_strictness(strictness)
            .with_minimum_generation(self.minimum_generation)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_poll_interval(Duration::from_secs(self.poll))
            .with_staleness_window(Duration::from_secs(self.staleness))
    }
}
