//! Cluster reconciliation.
//!
//! A reconciliation pass runs the shrink step against the latest known state of a cluster and
//! then records the outcome of the pass in the cluster's status generations, which is what
//! external callers observe to decide that a change has converged.

pub mod commit;
pub mod generations;
pub mod shrink;

use std::sync::Arc;

use fdb_core::crd::{FoundationDBCluster, RequiredMetadata};
use fdb_core::store::ClusterStore;
use fdb_core::AppError;

use crate::admin::AdminClientProvider;
use crate::k8s::events::EventRecorder;
use crate::reconcile::generations::{record_generations, PassOutcome};
use crate::reconcile::shrink::ChooseRemovals;

/// A request to run reconciliation again.
#[derive(Debug)]
pub struct Requeue {
    /// The error which interrupted reconciliation.
    pub error: AppError,
    /// Whether the retry should wait before running.
    pub delayed: bool,
}

impl From<AppError> for Requeue {
    fn from(error: AppError) -> Self {
        // Write conflicts only need a fresh read, everything else gets backoff.
        let delayed = !matches!(error, AppError::Conflict(_));
        Self { error, delayed }
    }
}

/// Runs reconciliation passes over clusters.
pub struct ClusterReconciler {
    store: Arc<dyn ClusterStore>,
    choose_removals: ChooseRemovals,
}

impl ClusterReconciler {
    /// Create a new instance.
    pub fn new(store: Arc<dyn ClusterStore>, admin: Arc<dyn AdminClientProvider>, events: Arc<dyn EventRecorder>) -> Self {
        Self {
            choose_removals: ChooseRemovals::new(store.clone(), admin, events),
            store,
        }
    }

    /// Run a reconciliation pass over the given cluster.
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.name(), generation = cluster.generation()))]
    pub async fn reconcile(&self, cluster: &FoundationDBCluster) -> Option<Requeue> {
        let requeue = self.choose_removals.reconcile(cluster, None).await;
        let outcome = match requeue {
            Some(_) => PassOutcome::ShrinkPending,
            None => PassOutcome::Completed,
        };

        if let Err(err) = record_generations(self.store.as_ref(), cluster.name(), cluster.generation(), outcome).await {
            tracing::error!(error = ?err, "error recording reconciled generations");
            return Some(requeue.unwrap_or_else(|| Requeue::from(err)));
        }
        requeue
    }
}
