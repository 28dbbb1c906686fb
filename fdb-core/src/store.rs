//! The object store holding `FoundationDBCluster` records.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::client::Client;
use kube::Resource;
use tokio::time::timeout;

use crate::crd::{FoundationDBCluster, RequiredMetadata, ANNOTATION_FORCE_RECONCILE};
use crate::error::AppError;

/// The default timeout to use for API calls.
const API_TIMEOUT: Duration = Duration::from_secs(5);

/// Access to the stored cluster records.
///
/// Writes use optimistic concurrency: a status update carrying a stale resource version is
/// rejected with `AppError::Conflict`.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch the latest record of the named cluster.
    async fn get(&self, name: &str) -> Result<FoundationDBCluster, AppError>;

    /// Replace the status of the given cluster, returning the updated record.
    async fn update_status(&self, cluster: &FoundationDBCluster) -> Result<FoundationDBCluster, AppError>;

    /// List all clusters, optionally filtered by a label selector.
    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<FoundationDBCluster>, AppError>;

    /// Touch the force-reconcile annotation of the named cluster, causing the operator to pick it
    /// up again.
    async fn force_reconcile(&self, name: &str) -> Result<(), AppError>;
}

/// The value used for the force-reconcile annotation.
fn force_reconcile_stamp() -> String {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
}

//////////////////////////////////////////////////////////////////////////////
// Kubernetes ////////////////////////////////////////////////////////////////

/// A cluster store backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterStore {
    api: Api<FoundationDBCluster>,
}

impl KubeClusterStore {
    /// Create a new instance scoped to the given namespace.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, name: &str) -> Result<FoundationDBCluster, AppError> {
        timeout(API_TIMEOUT, self.api.get(name))
            .await
            .context("timeout while fetching FoundationDBCluster")
            .map_err(AppError::Transient)?
            .map_err(AppError::from)
    }

    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.name()))]
    async fn update_status(&self, cluster: &FoundationDBCluster) -> Result<FoundationDBCluster, AppError> {
        let data = serde_json::to_vec(cluster)
            .context("error serializing FoundationDBCluster")
            .map_err(AppError::Transient)?;
        timeout(API_TIMEOUT, self.api.replace_status(cluster.name(), &PostParams::default(), data))
            .await
            .context("timeout while updating FoundationDBCluster status")
            .map_err(AppError::Transient)?
            .map_err(AppError::from)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<FoundationDBCluster>, AppError> {
        let params = ListParams {
            label_selector: label_selector.map(String::from),
            ..Default::default()
        };
        timeout(API_TIMEOUT, self.api.list(&params))
            .await
            .context("timeout while listing FoundationDBClusters")
            .map_err(AppError::Transient)?
            .map(|list| list.items)
            .map_err(AppError::from)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn force_reconcile(&self, name: &str) -> Result<(), AppError> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    ANNOTATION_FORCE_RECONCILE: force_reconcile_stamp(),
                },
            },
        });
        timeout(API_TIMEOUT, self.api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)))
            .await
            .context("timeout while patching FoundationDBCluster annotations")
            .map_err(AppError::Transient)?
            .map(|_| ())
            .map_err(AppError::from)
    }
}

//////////////////////////////////////////////////////////////////////////////
// In Memory /////////////////////////////////////////////////////////////////

/// A hook run against the stored record whenever a force-reconcile nudge lands.
pub type NudgeHook = Box<dyn FnMut(&mut FoundationDBCluster) + Send>;

/// An in-memory cluster store with resource version checks and failure injection.
#[derive(Default)]
pub struct MemoryClusterStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    clusters: BTreeMap<String, FoundationDBCluster>,
    version: u64,
    reads: usize,
    status_writes: usize,
    nudges: usize,
    failing_reads: usize,
    conflicting_writes: usize,
    failing_nudges: usize,
    on_nudge: Option<NudgeHook>,
}

impl MemoryState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert or overwrite a cluster record, assigning it a new resource version.
    pub fn insert(&self, mut cluster: FoundationDBCluster) -> FoundationDBCluster {
        let mut state = self.lock();
        cluster.meta_mut().resource_version = Some(state.next_version());
        state.clusters.insert(cluster.name().to_string(), cluster.clone());
        cluster
    }

    /// Mutate the stored record as an external writer would, bumping its resource version.
    pub fn modify(&self, name: &str, f: impl FnOnce(&mut FoundationDBCluster)) -> Option<FoundationDBCluster> {
        let mut state = self.lock();
        let version = state.next_version();
        let cluster = state.clusters.get_mut(name)?;
        f(cluster);
        cluster.meta_mut().resource_version = Some(version);
        Some(cluster.clone())
    }

    /// A copy of the stored record of the named cluster.
    pub fn cluster(&self, name: &str) -> Option<FoundationDBCluster> {
        self.lock().clusters.get(name).cloned()
    }

    /// Fail the next `count` reads with a transient error.
    pub fn fail_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    /// Reject the next `count` status writes with a conflict.
    pub fn conflict_writes(&self, count: usize) {
        self.lock().conflicting_writes = count;
    }

    /// Fail the next `count` force-reconcile nudges with a transient error.
    pub fn fail_nudges(&self, count: usize) {
        self.lock().failing_nudges = count;
    }

    /// Run the given hook against the stored record on every successful nudge.
    pub fn on_nudge(&self, hook: impl FnMut(&mut FoundationDBCluster) + Send + 'static) {
        self.lock().on_nudge = Some(Box::new(hook));
    }

    /// Number of reads issued, failed ones included.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Number of status writes issued, rejected ones included.
    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    /// Number of force-reconcile nudges issued, failed ones included.
    pub fn nudges(&self) -> usize {
        self.lock().nudges
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn get(&self, name: &str) -> Result<FoundationDBCluster, AppError> {
        let mut state = self.lock();
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(AppError::Transient(anyhow::anyhow!("injected read failure")));
        }
        state
            .clusters
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::ResourceNotFound(format!("FoundationDBCluster {} not found", name)))
    }

    async fn update_status(&self, cluster: &FoundationDBCluster) -> Result<FoundationDBCluster, AppError> {
        let mut state = self.lock();
        state.status_writes += 1;
        if state.conflicting_writes > 0 {
            state.conflicting_writes -= 1;
            return Err(AppError::Conflict("injected write conflict".into()));
        }
        let stored_version = match state.clusters.get(cluster.name()) {
            Some(stored) => stored.meta().resource_version.clone(),
            None => return Err(AppError::ResourceNotFound(format!("FoundationDBCluster {} not found", cluster.name()))),
        };
        if stored_version != cluster.meta().resource_version {
            return Err(AppError::Conflict(format!(
                "resource version {:?} is stale, current is {:?}",
                cluster.meta().resource_version,
                stored_version
            )));
        }

        let version = state.next_version();
        let stored = match state.clusters.get_mut(cluster.name()) {
            Some(stored) => stored,
            None => return Err(AppError::ResourceNotFound(format!("FoundationDBCluster {} not found", cluster.name()))),
        };
        stored.status = cluster.status.clone();
        stored.meta_mut().resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<FoundationDBCluster>, AppError> {
        let state = self.lock();
        let selector: Vec<(&str, &str)> = label_selector
            .unwrap_or_default()
            .split(',')
            .filter(|term| !term.is_empty())
            .filter_map(|term| term.split_once('='))
            .collect();
        Ok(state
            .clusters
            .values()
            .filter(|cluster| {
                let labels = cluster.meta().labels.as_ref();
                selector
                    .iter()
                    .all(|(key, val)| labels.and_then(|labels| labels.get(*key)).map(|found| found.as_str() == *val).unwrap_or(false))
            })
            .cloned()
            .collect())
    }

    async fn force_reconcile(&self, name: &str) -> Result<(), AppError> {
        let mut state = self.lock();
        state.nudges += 1;
        if state.failing_nudges > 0 {
            state.failing_nudges -= 1;
            return Err(AppError::Transient(anyhow::anyhow!("injected nudge failure")));
        }

        let version = state.next_version();
        let state = &mut *state;
        let cluster = state
            .clusters
            .get_mut(name)
            .ok_or_else(|| AppError::ResourceNotFound(format!("FoundationDBCluster {} not found", name)))?;
        cluster
            .meta_mut()
            .annotations
            .get_or_insert_with(Default::default)
            .insert(ANNOTATION_FORCE_RECONCILE.into(), force_reconcile_stamp());
        cluster.meta_mut().resource_version = Some(version);
        if let Some(hook) = state.on_nudge.as_mut() {
            hook(cluster);
        }
        Ok(())
    }
}
