use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::watcher::Event;
use kube::Resource;

use crate::k8s::scheduler::SchedulerTask;
use crate::k8s::{Controller, EventResult};
use fdb_core::crd::FoundationDBCluster;
use fdb_core::prom::{ClusterSample, METRIC_CLUSTERS_WATCHER_ERRORS};

//////////////////////////////////////////////////////////////////////////////
// FoundationDBCluster Events ////////////////////////////////////////////////
impl Controller {
    /// Handle `FoundationDBCluster` watcher event.
    #[tracing::instrument(level = "debug", skip(self, res))]
    pub(super) async fn handle_cluster_event(&mut self, res: EventResult<FoundationDBCluster>) {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(error = ?err, "error from FoundationDBCluster k8s watcher");
                metrics::increment_counter!(METRIC_CLUSTERS_WATCHER_ERRORS);
                let _ = tokio::time::sleep(Duration::from_secs(10)).await;
                return;
            }
        };
        match event {
            Event::Applied(obj) => self.cluster_applied(obj).await,
            Event::Deleted(obj) => self.cluster_deleted(obj).await,
            Event::Restarted(objs) => self.cluster_restarted(objs).await,
        }
        ClusterSample::collect(self.clusters.values()).record();
    }

    #[tracing::instrument(level = "debug", skip(self, cluster))]
    async fn cluster_applied(&mut self, cluster: FoundationDBCluster) {
        let name_str = match cluster.meta().name.as_ref() {
            Some(name_str) => name_str,
            None => return, // Not actually possible as K8s requires name.
        };
        let name = match self.clusters.get_key_value(name_str) {
            Some((key, old)) => {
                if old == &cluster {
                    return;
                }
                Arc::clone(key) // No additional alloc.
            }
            None => Arc::new(name_str.clone()),
        };
        self.clusters.insert(name.clone(), cluster);
        self.spawn_scheduler_task(SchedulerTask::ClusterUpdated(name), false);
    }

    #[tracing::instrument(level = "debug", skip(self, cluster))]
    async fn cluster_deleted(&mut self, cluster: FoundationDBCluster) {
        let name_str = match cluster.meta().name.as_ref() {
            Some(name_str) => name_str,
            None => return, // Not actually possible as K8s requires name.
        };
        if self.clusters.remove(name_str).is_some() {
            tracing::debug!(name = %name_str, "FoundationDBCluster deleted, dropped from cache");
        }
    }

    #[tracing::instrument(level = "debug", skip(self, clusters))]
    async fn cluster_restarted(&mut self, clusters: Vec<FoundationDBCluster>) {
        let live: HashSet<String> = clusters.iter().filter_map(|cluster| cluster.meta().name.clone()).collect();
        self.clusters.retain(|name, _| live.contains(name.as_str()));
        for cluster in clusters {
            self.cluster_applied(cluster).await;
        }
    }
}
