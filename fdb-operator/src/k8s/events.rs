//! Kubernetes events published against clusters.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, PostParams};
use kube::client::Client;
use kube::Resource;
use tokio::time::timeout;

use crate::k8s::APP_NAME;
use fdb_core::crd::{FoundationDBCluster, RequiredMetadata};

/// The default timeout to use for API calls.
const API_TIMEOUT: Duration = Duration::from_secs(5);
/// The event type used for routine reconciliation events.
const EVENT_TYPE_NORMAL: &str = "Normal";

/// A sink of audit events about a cluster.
///
/// Publishing is best effort: failures are logged and never surface to the caller.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn publish(&self, cluster: &FoundationDBCluster, reason: &str, message: &str);
}

/// Publishes `core/v1` events through the K8s API.
pub struct KubeEventRecorder {
    client: Client,
    /// The name of the pod on which this instance is running.
    pod_name: String,
}

impl KubeEventRecorder {
    /// Create a new instance.
    pub fn new(client: Client, pod_name: String) -> Self {
        Self { client, pod_name }
    }

    fn build_event(&self, cluster: &FoundationDBCluster, reason: &str, message: &str) -> Event {
        let now = Time(chrono::Utc::now());
        Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}.", cluster.name())),
                namespace: Some(cluster.namespace().into()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: Some(FoundationDBCluster::api_version(&()).to_string()),
                kind: Some(FoundationDBCluster::kind(&()).to_string()),
                name: Some(cluster.name().into()),
                namespace: Some(cluster.namespace().into()),
                uid: cluster.meta().uid.clone(),
                resource_version: cluster.meta().resource_version.clone(),
                ..Default::default()
            },
            reason: Some(reason.into()),
            message: Some(message.into()),
            type_: Some(EVENT_TYPE_NORMAL.into()),
            count: Some(1),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            source: Some(EventSource {
                component: Some(APP_NAME.into()),
                host: None,
            }),
            reporting_component: Some(APP_NAME.into()),
            reporting_instance: Some(self.pod_name.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.name()))]
    async fn publish(&self, cluster: &FoundationDBCluster, reason: &str, message: &str) {
        let event = self.build_event(cluster, reason, message);
        let api: Api<Event> = Api::namespaced(self.client.clone(), cluster.namespace());
        match timeout(API_TIMEOUT, api.create(&PostParams::default(), &event)).await {
            Ok(Ok(_)) => (),
            Ok(Err(err)) => tracing::error!(error = ?err, "error publishing k8s event"),
            Err(err) => tracing::error!(error = ?err, "timeout while publishing k8s event"),
        }
    }
}
