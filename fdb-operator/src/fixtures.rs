//! Test fixtures shared by the operator's reconciliation tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::Resource;

use crate::admin::{AdminClient, AdminClientProvider};
use crate::k8s::events::EventRecorder;
use fdb_core::crd::{
    FoundationDBCluster, FoundationDBClusterSpec, FoundationDBClusterStatus, ProcessClass, ProcessCounts, ProcessGroupStatus,
};
use fdb_core::status::{FoundationDBStatus, ProcessInfo};
use fdb_core::store::{ClusterStore, MemoryClusterStore};
use fdb_core::AppError;

pub const NAME: &str = "sample";

/// An ordered record of the externally visible side effects of a reconciliation pass.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

//////////////////////////////////////////////////////////////////////////////
// Builders //////////////////////////////////////////////////////////////////

/// Build a cluster at generation 1 with the given process groups and spec counts.
pub fn cluster(groups: Vec<ProcessGroupStatus>, counts: ProcessCounts) -> FoundationDBCluster {
    let mut cluster = FoundationDBCluster::new(
        NAME,
        FoundationDBClusterSpec {
            version: "7.1.25".into(),
            process_counts: counts,
            ..Default::default()
        },
    );
    cluster.meta_mut().namespace = Some("default".into());
    cluster.meta_mut().generation = Some(1);
    cluster.status = Some(FoundationDBClusterStatus {
        process_groups: groups,
        connection_string: Some("sample:abcdef@10.0.0.1:4501".into()),
        ..Default::default()
    });
    cluster
}

/// Spec counts which only keep `storage` storage processes, every other class disabled.
pub fn storage_only(storage: i32) -> ProcessCounts {
    ProcessCounts {
        storage,
        log: -1,
        transaction: -1,
        stateless: -1,
        cluster_controller: -1,
    }
}

/// Build `count` storage process groups named `storage-1` and up.
pub fn storage_groups(count: u32) -> Vec<ProcessGroupStatus> {
    (1..=count)
        .map(|idx| ProcessGroupStatus::new(format!("storage-{}", idx), ProcessClass::Storage))
        .collect()
}

/// Build a status document with one storage process per `(instance_id, zone_id)` pair.
pub fn status(processes: &[(&str, &str)]) -> FoundationDBStatus {
    let mut status = FoundationDBStatus::default();
    for (idx, (id, zone)) in processes.iter().enumerate() {
        status.cluster.processes.insert(
            format!("process-{}", idx),
            ProcessInfo {
                address: format!("10.0.0.{}:4501", idx + 1),
                locality: vec![("instance_id", *id), ("zoneid", *zone), ("dcid", "dc1")].into_iter().collect(),
                class_type: "storage".into(),
                ..Default::default()
            },
        );
    }
    status
}

//////////////////////////////////////////////////////////////////////////////
// Admin Clients /////////////////////////////////////////////////////////////

/// An admin client provider serving a fixed status document.
#[derive(Default)]
pub struct FakeAdminProvider {
    state: Arc<FakeAdminState>,
}

#[derive(Default)]
struct FakeAdminState {
    status: Mutex<Option<FoundationDBStatus>>,
    acquired: AtomicUsize,
    closed: AtomicUsize,
}

impl FakeAdminProvider {
    /// A provider whose clients return the given status, or fail when `None`.
    pub fn new(status: Option<FoundationDBStatus>) -> Self {
        let provider = Self::default();
        *provider.state.status.lock().unwrap() = status;
        provider
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminClientProvider for FakeAdminProvider {
    async fn admin_client(&self, _: &FoundationDBCluster) -> Result<Box<dyn AdminClient>, AppError> {
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeAdminClient { state: self.state.clone() }))
    }
}

struct FakeAdminClient {
    state: Arc<FakeAdminState>,
}

#[async_trait]
impl AdminClient for FakeAdminClient {
    async fn get_status(&self) -> Result<FoundationDBStatus, AppError> {
        self.state
            .status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Transient(anyhow::anyhow!("injected status failure")))
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//////////////////////////////////////////////////////////////////////////////
// Events & Store ////////////////////////////////////////////////////////////

/// An event recorder which writes every event to a journal.
pub struct RecordingEventRecorder {
    pub journal: Journal,
}

#[async_trait]
impl EventRecorder for RecordingEventRecorder {
    async fn publish(&self, _: &FoundationDBCluster, reason: &str, message: &str) {
        self.journal.push(format!("event {}: {}", reason, message));
    }
}

/// A cluster store which writes every successful status update to a journal.
pub struct JournalStore {
    pub inner: Arc<MemoryClusterStore>,
    pub journal: Journal,
}

#[async_trait]
impl ClusterStore for JournalStore {
    async fn get(&self, name: &str) -> Result<FoundationDBCluster, AppError> {
        self.inner.get(name).await
    }

    async fn update_status(&self, cluster: &FoundationDBCluster) -> Result<FoundationDBCluster, AppError> {
        let updated = self.inner.update_status(cluster).await?;
        self.journal.push("status write");
        Ok(updated)
    }

    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<FoundationDBCluster>, AppError> {
        self.inner.list(label_selector).await
    }

    async fn force_reconcile(&self, name: &str) -> Result<(), AppError> {
        self.inner.force_reconcile(name).await
    }
}

/// The wiring of a reconciliation step under test.
pub struct Harness {
    pub store: Arc<MemoryClusterStore>,
    pub admin: Arc<FakeAdminProvider>,
    pub journal: Journal,
    pub journal_store: Arc<JournalStore>,
    pub events: Arc<RecordingEventRecorder>,
}

impl Harness {
    /// Store the given cluster, with clients serving the given status document.
    pub fn new(cluster: FoundationDBCluster, status: Option<FoundationDBStatus>) -> Self {
        let store = Arc::new(MemoryClusterStore::new());
        store.insert(cluster);
        let journal = Journal::default();
        Self {
            journal_store: Arc::new(JournalStore {
                inner: store.clone(),
                journal: journal.clone(),
            }),
            events: Arc::new(RecordingEventRecorder { journal: journal.clone() }),
            admin: Arc::new(FakeAdminProvider::new(status)),
            store,
            journal,
        }
    }

    /// The latest stored record of the cluster.
    pub fn stored(&self) -> FoundationDBCluster {
        self.store.cluster(NAME).unwrap()
    }

    /// The IDs of the stored process groups marked for removal.
    pub fn removals(&self) -> Vec<String> {
        self.stored()
            .status
            .unwrap_or_default()
            .removals()
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }
}
