//! Choosing which process groups to remove when a process class shrinks.

use std::collections::BTreeSet;
use std::sync::Arc;

use fdb_core::crd::{FoundationDBCluster, ProcessClass, ProcessCounts, ProcessGroupId, ProcessGroupStatus, RequiredMetadata};
use fdb_core::locality::{choose_distributed_processes, LocalityCatalog, LocalityInfo, ProcessSelectionConstraint};
use fdb_core::prom::METRIC_SHRINK_REMOVALS;
use fdb_core::status::FoundationDBStatus;
use fdb_core::AppError;
use fdb_core::store::ClusterStore;

use crate::admin::AdminClientProvider;
use crate::k8s::events::EventRecorder;
use crate::reconcile::commit::commit_removals;
use crate::reconcile::Requeue;

/// The event reason used when process groups are chosen for removal.
pub const EVENT_REASON_SHRINKING: &str = "ShrinkingProcesses";

/// The shrink of a single process class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShrinkDecision {
    pub class: ProcessClass,
    /// The number of process groups the class should be left with.
    pub desired: usize,
    /// The number of process groups above the desired count.
    pub excess: usize,
    /// The IDs of the process groups chosen to stay, in pick order.
    pub retained: Vec<String>,
}

/// The result of planning removals across all process classes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShrinkPlan {
    /// Every process group which should be marked for removal, already marked ones included.
    pub removals: BTreeSet<ProcessGroupId>,
    /// The process groups which are not yet marked for removal.
    pub new_removals: BTreeSet<ProcessGroupId>,
    /// The process classes which are shrinking.
    pub shrinking: Vec<ShrinkDecision>,
    /// Whether any new removal was planned.
    pub changed: bool,
}

/// Plan the removals needed to bring every process class down to its desired count.
///
/// Groups in `existing` or already flagged for removal do not count towards a class. When a class
/// has excess groups, the groups to keep are chosen by fault-domain spread and every other group
/// of the class is removed, including groups which have no live process in the catalog. A class
/// which can not be satisfied fails the whole plan.
pub fn plan_removals(
    process_groups: &[ProcessGroupStatus], catalog: &LocalityCatalog, desired: &ProcessCounts, existing: &BTreeSet<ProcessGroupId>,
    constraint: &ProcessSelectionConstraint,
) -> Result<ShrinkPlan, AppError> {
    let is_removed = |group: &ProcessGroupStatus| group.is_marked_for_removal() || existing.contains(&group.process_group_id);
    let mut plan = ShrinkPlan {
        removals: existing.clone(),
        ..Default::default()
    };
    plan.removals.extend(process_groups.iter().filter(|group| group.is_marked_for_removal()).map(|group| group.process_group_id.clone()));

    for class in ProcessClass::ALL {
        let active: Vec<&ProcessGroupStatus> = process_groups
            .iter()
            .filter(|group| group.process_class == class && !is_removed(*group))
            .collect();
        let desired_count = desired.get(class).max(0) as usize;
        if active.len() <= desired_count {
            continue;
        }

        let candidates: Vec<LocalityInfo> = active
            .iter()
            .filter_map(|group| catalog.get(group.process_group_id.as_str()))
            .cloned()
            .collect();
        let retained: Vec<String> = choose_distributed_processes(&candidates, desired_count, constraint)?
            .into_iter()
            .map(|info| info.id)
            .collect();
        let kept: BTreeSet<&str> = retained.iter().map(String::as_str).collect();

        plan.new_removals.extend(
            active
                .iter()
                .filter(|group| !kept.contains(group.process_group_id.as_str()))
                .map(|group| group.process_group_id.clone()),
        );
        plan.shrinking.push(ShrinkDecision {
            class,
            desired: desired_count,
            excess: active.len() - desired_count,
            retained,
        });
    }

    plan.removals.extend(plan.new_removals.iter().cloned());
    plan.changed = !plan.new_removals.is_empty();
    Ok(plan)
}

/// The reconciliation step which chooses process groups for removal during a shrink.
pub struct ChooseRemovals {
    store: Arc<dyn ClusterStore>,
    admin: Arc<dyn AdminClientProvider>,
    events: Arc<dyn EventRecorder>,
    constraint: ProcessSelectionConstraint,
}

impl ChooseRemovals {
    /// Create a new instance.
    pub fn new(store: Arc<dyn ClusterStore>, admin: Arc<dyn AdminClientProvider>, events: Arc<dyn EventRecorder>) -> Self {
        Self {
            store,
            admin,
            events,
            constraint: ProcessSelectionConstraint::default(),
        }
    }

    /// Run this step against the given cluster.
    ///
    /// The status snapshot is fetched through an admin client when not given. Returns `None`
    /// when reconciliation may proceed.
    #[tracing::instrument(level = "debug", skip(self, cluster, status), fields(cluster = %cluster.name()))]
    pub async fn reconcile(&self, cluster: &FoundationDBCluster, status: Option<FoundationDBStatus>) -> Option<Requeue> {
        match self.try_reconcile(cluster, status).await {
            Ok(()) => None,
            Err(err) => Some(Requeue::from(err)),
        }
    }

    async fn try_reconcile(&self, cluster: &FoundationDBCluster, status: Option<FoundationDBStatus>) -> Result<(), AppError> {
        let desired = cluster.desired_process_counts()?;
        let status = match status {
            Some(status) => status,
            None => self.fetch_status(cluster).await?,
        };

        let catalog = LocalityCatalog::build(status.cluster.processes.values(), cluster.spec.data_center.as_deref());
        let cluster_status = cluster.status.clone().unwrap_or_default();
        let existing = cluster_status.removals();
        let plan = plan_removals(&cluster_status.process_groups, &catalog, &desired, &existing, &self.constraint)?;
        if !plan.changed {
            return Ok(());
        }

        let health = status.class_health();
        for decision in plan.shrinking.iter() {
            let class_health = health.get(&decision.class).copied().unwrap_or_default();
            tracing::info!(
                class = %decision.class,
                desired_count = decision.desired,
                selected = ?decision.retained,
                reporting = class_health.reporting,
                degraded = class_health.degraded,
                "chose remaining processes after shrink"
            );
            for info in decision.retained.iter().filter_map(|id| catalog.get(id)) {
                tracing::debug!(
                    process_group = %info.id,
                    zone = info.locality.zone_id().unwrap_or_default(),
                    machine = info.locality.machine_id().unwrap_or_default(),
                    "retained process"
                );
            }
            let message = format!("Removing {} {} processes", decision.excess, decision.class);
            self.events.publish(cluster, EVENT_REASON_SHRINKING, &message).await;
        }

        let now = chrono::Utc::now().timestamp();
        let flagged = commit_removals(self.store.as_ref(), cluster, &plan.new_removals, now).await?;
        metrics::counter!(METRIC_SHRINK_REMOVALS, flagged as u64);
        Ok(())
    }

    /// Fetch the cluster's status through a fresh admin client, closing it on every path.
    async fn fetch_status(&self, cluster: &FoundationDBCluster) -> Result<FoundationDBStatus, AppError> {
        let client = self.admin.admin_client(cluster).await?;
        let res = client.get_status().await;
        if let Err(err) = client.close().await {
            tracing::warn!(error = ?err, "error closing admin client");
        }
        res
    }
}
