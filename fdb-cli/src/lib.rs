//! Operational tooling for FoundationDB clusters managed by the operator.

mod cmd;

use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use fdb_core::store::KubeClusterStore;

/// FoundationDB cluster tooling.
#[derive(StructOpt)]
#[structopt(name = "fdb")]
pub struct Fdb {
    #[structopt(subcommand)]
    action: FdbSubcommands,
    /// Enable debug logging.
    #[structopt(short)]
    verbose: bool,
    /// The namespace of the clusters to interact with, defaults to the kubeconfig namespace.
    #[structopt(short, long)]
    namespace: Option<String>,
}

impl Fdb {
    pub async fn run(self) -> Result<()> {
        // Initialize logging based on CLI config.
        let fmt_layer = fmt::layer().with_target(true);
        let filter_layer;
        let level_filter;
        if self.verbose {
            filter_layer = EnvFilter::new("debug");
            level_filter = LevelFilter::DEBUG;
        } else {
            filter_layer = EnvFilter::new("info");
            level_filter = LevelFilter::INFO;
        }
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(level_filter)
            .init();

        match &self.action {
            FdbSubcommands::Wait(inner) => inner.run(&self).await,
            FdbSubcommands::Reconcile(inner) => inner.run(&self).await,
            FdbSubcommands::Counts(inner) => inner.run(&self).await,
            FdbSubcommands::List(inner) => inner.run(&self).await,
        }
    }

    /// Get a new cluster store based on runtime config.
    pub async fn get_store(&self) -> Result<Arc<KubeClusterStore>> {
        let config = kube::Config::infer().await.context("error inferring K8s client config")?;
        let namespace = self.namespace.clone().unwrap_or_else(|| config.default_namespace.clone());
        let client = kube::Client::try_from(config).context("error initializing K8s client")?;
        Ok(Arc::new(KubeClusterStore::new(client, &namespace)))
    }
}

#[derive(StructOpt)]
pub enum FdbSubcommands {
    /// Wait until a cluster has reconciled its latest generation.
    #[structopt(name = "wait")]
    Wait(cmd::wait::Wait),
    /// Ask the operator to run another reconciliation pass over a cluster.
    #[structopt(name = "reconcile")]
    Reconcile(cmd::reconcile::Reconcile),
    /// Show desired and current process counts of a cluster.
    #[structopt(name = "counts")]
    Counts(cmd::counts::Counts),
    /// List clusters along with their convergence state.
    #[structopt(name = "list")]
    List(cmd::list::List),
}
