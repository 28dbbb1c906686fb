//! Kubernetes controller.
//!
//! This controller observes `FoundationDBCluster` objects in its namespace, caches the latest
//! known state of each cluster, and runs a reconciliation pass whenever a cluster changes. Passes
//! which end in a requeue are scheduled again, after a delay unless the failure only needs a
//! fresh read.

mod data;
pub mod events;
mod scheduler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::prelude::*;
use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::watcher::{watcher, Error as WatcherError, Event};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};

use crate::admin::CliAdminClientProvider;
use crate::config::Config;
use crate::k8s::events::KubeEventRecorder;
use crate::k8s::scheduler::SchedulerTask;
use crate::reconcile::ClusterReconciler;
use fdb_core::crd::FoundationDBCluster;
use fdb_core::store::KubeClusterStore;

/// The app name used by the operator.
pub(crate) const APP_NAME: &str = "fdb-operator";
/// The timeout duration used before rescheduling a scheduler task.
const RESCHEDULE_TIMEOUT: Duration = Duration::from_secs(5);

type EventResult<T> = std::result::Result<Event<T>, WatcherError>;

/// Kubernetes controller for watching FoundationDBCluster CRs.
pub struct Controller {
    /// K8s client.
    client: Client,
    /// Runtime config.
    config: Arc<Config>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// A channel of scheduler tasks.
    scheduler_tasks_tx: mpsc::Sender<SchedulerTask>,
    /// A channel of scheduler tasks.
    scheduler_tasks_rx: ReceiverStream<SchedulerTask>,

    /// All known cluster objects in this operator's namespace.
    clusters: HashMap<Arc<String>, FoundationDBCluster>,
    /// The reconciler driving clusters towards their desired state.
    reconciler: ClusterReconciler,
}

impl Controller {
    /// Create a new instance.
    pub fn new(client: Client, config: Arc<Config>, shutdown_tx: broadcast::Sender<()>) -> Self {
        let store = Arc::new(KubeClusterStore::new(client.clone(), &config.namespace));
        let admin = Arc::new(CliAdminClientProvider::new(config.fdbcli_path.clone(), config.admin_timeout()));
        let events = Arc::new(KubeEventRecorder::new(client.clone(), config.pod_name.clone()));
        let (scheduler_tasks_tx, scheduler_tasks_rx) = mpsc::channel(1000);
        Self {
            client,
            config,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            scheduler_tasks_tx,
            scheduler_tasks_rx: ReceiverStream::new(scheduler_tasks_rx),
            clusters: Default::default(),
            reconciler: ClusterReconciler::new(store, admin, events),
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let clusters: Api<FoundationDBCluster> = Api::namespaced(self.client.clone(), &self.config.namespace);
        let clusters_watcher = watcher(clusters, ListParams::default());
        tokio::pin!(clusters_watcher);

        tracing::info!("k8s controller initialized");
        loop {
            tokio::select! {
                Some(k8s_event_res) = clusters_watcher.next() => self.handle_cluster_event(k8s_event_res).await,
                Some(scheduler_task) = self.scheduler_tasks_rx.next() => self.handle_scheduler_task(scheduler_task).await,
                _ = self.shutdown_rx.next() => break,
            }
        }

        tracing::debug!("k8s controller shutdown");
        Ok(())
    }

    /// Spawn a task which emits a new scheduler task.
    ///
    /// This indirection keeps the scheduler queue bounded without blocking the controller on its
    /// own queue when the queue is full. Retries wait for `RESCHEDULE_TIMEOUT` before they are
    /// emitted.
    fn spawn_scheduler_task(&self, task: SchedulerTask, is_retry: bool) {
        let tx = self.scheduler_tasks_tx.clone();
        tokio::spawn(async move {
            if is_retry {
                tokio::time::sleep(RESCHEDULE_TIMEOUT).await;
            }
            let _res = tx.send(task).await;
        });
    }
}
