//! Recording the outcome of a reconciliation pass in `status.generations`.

use fdb_core::crd::ClusterGenerationStatus;
use fdb_core::store::ClusterStore;
use fdb_core::AppError;

/// The outcome of a reconciliation pass over one generation of a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every step completed.
    Completed,
    /// The shrink step asked for a requeue.
    ShrinkPending,
}

/// Compute the generations to record for the given pass outcome.
pub fn next_generations(current: &ClusterGenerationStatus, generation: i64, outcome: PassOutcome, has_pending_removal: bool) -> ClusterGenerationStatus {
    let mut next = current.clone();
    match outcome {
        PassOutcome::Completed => {
            next.reconciled = generation;
            next.needs_shrink = 0;
            next.has_pending_removal = if has_pending_removal { generation } else { 0 };
        }
        PassOutcome::ShrinkPending => next.needs_shrink = generation,
    }
    next
}

/// Record the outcome of a pass over `generation` on the named cluster.
///
/// Nothing is written when the cluster moved on to a newer generation in the meantime, or when
/// the recorded generations are already up to date.
#[tracing::instrument(level = "debug", skip(store))]
pub async fn record_generations(store: &dyn ClusterStore, name: &str, generation: i64, outcome: PassOutcome) -> Result<(), AppError> {
    let mut cluster = store.get(name).await?;
    if cluster.generation() != generation {
        tracing::debug!(latest = cluster.generation(), "cluster changed during reconciliation, skipping generation update");
        return Ok(());
    }

    let status = cluster.status.get_or_insert_with(Default::default);
    let has_pending_removal = status.process_groups.iter().any(|group| group.is_marked_for_removal());
    let next = next_generations(&status.generations, generation, outcome, has_pending_removal);
    if next == status.generations {
        return Ok(());
    }
    status.generations = next;
    store.update_status(&cluster).await.map(|_| ())
}
