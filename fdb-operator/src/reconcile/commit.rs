//! Durably recording removal flags on a cluster's process groups.

use std::collections::{BTreeMap, BTreeSet};

use fdb_core::crd::{FoundationDBCluster, ProcessClass, ProcessGroupId, RequiredMetadata};
use fdb_core::prom::METRIC_REMOVAL_COMMIT_CONFLICTS;
use fdb_core::store::ClusterStore;
use fdb_core::AppError;

/// Mark the given process groups for removal, as planned from `planned_from`.
///
/// The latest record is fetched and checked against the record the removals were planned from:
/// when its spec or process groups changed in any other way than flagging some of the given
/// groups, the plan is stale and `AppError::Conflict` is returned without writing. Otherwise the
/// record is only written back when at least one group was not yet flagged. A write conflict is
/// retried once against a fresh read; a second conflict is returned to the caller. Flags are
/// never cleared. Returns the number of newly flagged groups.
#[tracing::instrument(level = "debug", skip(store, planned_from, removals), fields(cluster = %planned_from.name()))]
pub async fn commit_removals(
    store: &dyn ClusterStore, planned_from: &FoundationDBCluster, removals: &BTreeSet<ProcessGroupId>, now: i64,
) -> Result<usize, AppError> {
    let name = planned_from.name();
    let mut retried = false;
    loop {
        let mut cluster = store.get(name).await?;
        if !plan_still_valid(planned_from, &cluster, removals) {
            metrics::increment_counter!(METRIC_REMOVAL_COMMIT_CONFLICTS);
            return Err(AppError::Conflict(format!(
                "process groups of FoundationDBCluster {} changed since removals were planned",
                name
            )));
        }
        let status = cluster.status.get_or_insert_with(Default::default);

        let mut flagged = 0;
        let mut seen = BTreeSet::new();
        for group in status.process_groups.iter_mut() {
            if !removals.contains(&group.process_group_id) {
                continue;
            }
            seen.insert(group.process_group_id.clone());
            if group.mark_for_removal(now) {
                flagged += 1;
            }
        }
        for unknown in removals.iter().filter(|id| !seen.contains(*id)) {
            tracing::debug!(process_group = %unknown, "process group chosen for removal is not part of the cluster anymore");
        }
        if flagged == 0 {
            return Ok(0);
        }

        match store.update_status(&cluster).await {
            Ok(_) => return Ok(flagged),
            Err(AppError::Conflict(reason)) if !retried => {
                metrics::increment_counter!(METRIC_REMOVAL_COMMIT_CONFLICTS);
                tracing::debug!(%reason, "conflict while committing removals, retrying with a fresh read");
                retried = true;
            }
            Err(err) => {
                if matches!(err, AppError::Conflict(_)) {
                    metrics::increment_counter!(METRIC_REMOVAL_COMMIT_CONFLICTS);
                }
                return Err(err);
            }
        }
    }
}

/// Check that `latest` would still be planned the same way as `planned_from`.
///
/// The spec must be unchanged, and every process group must have the same class and removal
/// flag, except for groups in `removals` which may already be flagged.
fn plan_still_valid(planned_from: &FoundationDBCluster, latest: &FoundationDBCluster, removals: &BTreeSet<ProcessGroupId>) -> bool {
    if planned_from.spec != latest.spec {
        return false;
    }
    let groups = |cluster: &FoundationDBCluster| -> BTreeMap<ProcessGroupId, (ProcessClass, bool)> {
        cluster
            .status
            .iter()
            .flat_map(|status| status.process_groups.iter())
            .map(|group| (group.process_group_id.clone(), (group.process_class, group.is_marked_for_removal())))
            .collect()
    };
    let (planned, current) = (groups(planned_from), groups(latest));
    if planned.len() != current.len() {
        return false;
    }
    planned.iter().all(|(id, (class, removed))| match current.get(id) {
        Some((current_class, current_removed)) => {
            current_class == class && (current_removed == removed || (*current_removed && removals.contains(id)))
        }
        None => false,
    })
}
