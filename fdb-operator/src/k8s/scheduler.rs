//! Scheduling of reconciliation passes.
//!
//! Every change observed on a cluster emits a task for that cluster. Tasks only carry the
//! cluster's name: the pass always runs against the latest cached state, so a burst of changes
//! collapses into passes over the newest object.

use std::sync::Arc;

use crate::k8s::Controller;
use fdb_core::prom::METRIC_RECONCILE_REQUEUES;

/// A scheduling task to be performed.
#[derive(Debug)]
pub enum SchedulerTask {
    ClusterUpdated(Arc<String>),
}

impl Controller {
    /// Handle scheduler tasks.
    pub(super) async fn handle_scheduler_task(&mut self, task: SchedulerTask) {
        match task {
            SchedulerTask::ClusterUpdated(name) => self.scheduler_cluster_updated(name).await,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn scheduler_cluster_updated(&mut self, name: Arc<String>) {
        let cluster = match self.clusters.get(&name) {
            Some(cluster) => cluster.clone(),
            None => {
                tracing::debug!("FoundationDBCluster no longer exists, skipping reconciliation");
                return;
            }
        };

        match self.reconciler.reconcile(&cluster).await {
            None => tracing::debug!("FoundationDBCluster reconciled"),
            Some(requeue) => {
                metrics::increment_counter!(METRIC_RECONCILE_REQUEUES);
                tracing::error!(error = ?requeue.error, delayed = requeue.delayed, "error reconciling FoundationDBCluster, requeueing");
                self.spawn_scheduler_task(SchedulerTask::ClusterUpdated(name), requeue.delayed);
            }
        }
    }
}
