//! FoundationDBCluster CRD.
//!
//! The code here is used to generate the actual CRD used in K8s. See examples/crd.rs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::process_group::{ProcessGroupId, ProcessGroupStatus};
use crate::crd::{ProcessClass, ProcessCounts};
use crate::error::AppError;

pub type FoundationDBCluster = FoundationDBClusterCRD; // Mostly to resolve a Rust Analyzer issue.

/// The annotation updated to force the operator to run another reconciliation pass.
pub const ANNOTATION_FORCE_RECONCILE: &str = "foundationdb.org/reconcile";

/// CRD spec for the FoundationDBCluster resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    struct = "FoundationDBClusterCRD",
    status = "FoundationDBClusterStatus",
    group = "apps.foundationdb.org",
    version = "v1beta2",
    kind = "FoundationDBCluster",
    namespaced,
    derive = "PartialEq",
    apiextensions = "v1",
    shortname = "fdb",
    printcolumn = r#"{"name":"Generation","type":"integer","jsonPath":".metadata.generation"}"#,
    printcolumn = r#"{"name":"Reconciled","type":"integer","jsonPath":".status.generations.reconciled"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBClusterSpec {
    /// The version of FoundationDB the cluster should run.
    pub version: String,
    /// The number of processes to run for each process class.
    ///
    /// A value of `0` means the default derived from the database configuration is used, and a
    /// value of `-1` disables the process class.
    #[serde(default)]
    pub process_counts: ProcessCounts,
    /// The database configuration, used to derive default process counts.
    #[serde(default)]
    pub database_configuration: DatabaseConfiguration,
    /// The data center this cluster's processes run in, if any.
    ///
    /// Only processes reporting this `dcid` locality are considered part of this cluster when
    /// choosing which processes to keep.
    #[serde(default)]
    pub data_center: Option<String>,
}

/// CRD status object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBClusterStatus {
    /// The process groups of this cluster.
    #[serde(default)]
    pub process_groups: Vec<ProcessGroupStatus>,
    /// The generations the operator has reached in its reconciliation phases.
    #[serde(default)]
    pub generations: ClusterGenerationStatus,
    /// The cluster's connection string, once the database has been created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl FoundationDBClusterStatus {
    /// Iterate over the process groups of the given class.
    pub fn process_groups_by_class(&self, class: ProcessClass) -> impl Iterator<Item = &ProcessGroupStatus> {
        self.process_groups.iter().filter(move |group| group.process_class == class)
    }

    /// The IDs of all process groups currently marked for removal.
    pub fn removals(&self) -> std::collections::BTreeSet<ProcessGroupId> {
        self.process_groups
            .iter()
            .filter(|group| group.is_marked_for_removal())
            .map(|group| group.process_group_id.clone())
            .collect()
    }
}

/// The generations reached by each reconciliation phase of the operator.
///
/// A non-zero value means the phase still has work pending for that generation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGenerationStatus {
    /// The last generation the operator fully reconciled.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reconciled: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_configuration_change: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_coordinator_change: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_bounce: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_pod_deletion: i64,
    /// Set while processes still need to be chosen for removal.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_shrink: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_grow: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_monitor_conf_update: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub missing_database_status: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub has_extra_listeners: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_service_update: i64,
    /// Set while process groups are marked for removal but not yet removed.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub has_pending_removal: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub has_unhealthy_process: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub needs_lock_configuration_changes: i64,
}

fn is_zero(val: &i64) -> bool {
    *val == 0
}

/// The database configuration, as far as process counts are concerned.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfiguration {
    /// The replication mode of the database.
    #[serde(default)]
    pub redundancy_mode: RedundancyMode,
    /// The number of regions the database replicates data across.
    #[serde(default = "DatabaseConfiguration::usable_regions_default")]
    pub usable_regions: i32,
    #[serde(default)]
    pub logs: Option<i32>,
    #[serde(default)]
    pub commit_proxies: Option<i32>,
    #[serde(default)]
    pub grv_proxies: Option<i32>,
    #[serde(default)]
    pub resolvers: Option<i32>,
    #[serde(default)]
    pub log_routers: Option<i32>,
    #[serde(default)]
    pub remote_logs: Option<i32>,
}

impl DatabaseConfiguration {
    /// The default number of usable regions.
    pub fn usable_regions_default() -> i32 {
        1
    }

    /// Compute the role counts with defaults applied.
    pub fn role_counts(&self) -> Result<RoleCounts, AppError> {
        if !(1..=2).contains(&self.usable_regions) {
            return Err(AppError::InvalidSpec(format!("usableRegions must be 1 or 2, got {}", self.usable_regions)));
        }
        let role = |name: &str, val: Option<i32>, default: u32| -> Result<u32, AppError> {
            match val {
                None | Some(0) => Ok(default),
                Some(val) if val > 0 => Ok(val as u32),
                Some(val) => Err(AppError::InvalidSpec(format!("{} must not be negative, got {}", name, val))),
            }
        };
        let logs = role("logs", self.logs, self.redundancy_mode.default_logs())?;
        let multi_region = self.usable_regions > 1;
        Ok(RoleCounts {
            logs,
            commit_proxies: role("commitProxies", self.commit_proxies, 2)?,
            grv_proxies: role("grvProxies", self.grv_proxies, 1)?,
            resolvers: role("resolvers", self.resolvers, 1)?,
            log_routers: role("logRouters", self.log_routers, if multi_region { logs } else { 0 })?,
            remote_logs: role("remoteLogs", self.remote_logs, if multi_region { logs } else { 0 })?,
        })
    }
}

impl Default for DatabaseConfiguration {
    fn default() -> Self {
        Self {
            redundancy_mode: RedundancyMode::default(),
            usable_regions: Self::usable_regions_default(),
            logs: None,
            commit_proxies: None,
            grv_proxies: None,
            resolvers: None,
            log_routers: None,
            remote_logs: None,
        }
    }
}

/// The replication mode of the database.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RedundancyMode {
    Single,
    Double,
    Triple,
}

impl RedundancyMode {
    /// The number of fault domains which can fail without losing data.
    pub fn fault_tolerance(&self) -> u32 {
        match self {
            Self::Single => 0,
            Self::Double => 1,
            Self::Triple => 2,
        }
    }

    /// The minimum number of fault domains needed to replicate data in this mode.
    pub fn minimum_fault_domains(&self) -> u32 {
        self.fault_tolerance() + 1
    }

    fn default_logs(&self) -> u32 {
        match self {
            Self::Single | Self::Double => 3,
            Self::Triple => 4,
        }
    }
}

impl Default for RedundancyMode {
    fn default() -> Self {
        Self::Double
    }
}

impl std::fmt::Display for RedundancyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "single",
                Self::Double => "double",
                Self::Triple => "triple",
            }
        )
    }
}

/// The number of database roles to recruit, with defaults applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoleCounts {
    pub logs: u32,
    pub commit_proxies: u32,
    pub grv_proxies: u32,
    pub resolvers: u32,
    pub log_routers: u32,
    pub remote_logs: u32,
}

impl FoundationDBCluster {
    /// Compute the desired process counts for this cluster, applying defaults.
    ///
    /// Role counts whose sum does not fit a process count are an invalid spec.
    pub fn desired_process_counts(&self) -> Result<ProcessCounts, AppError> {
        let config = &self.spec.database_configuration;
        let roles = config.role_counts()?;
        let tolerance = config.redundancy_mode.fault_tolerance();
        let domains = config.redundancy_mode.minimum_fault_domains();
        let defaults = ProcessCounts {
            storage: sum_roles("storage", &[domains, domains, 1])?,
            log: sum_roles("log", &[roles.logs, roles.remote_logs, tolerance])?,
            transaction: 0,
            // Cluster controller, master, ratekeeper and data distributor each take one process.
            stateless: sum_roles(
                "stateless",
                &[4, roles.commit_proxies, roles.grv_proxies, roles.resolvers, roles.log_routers, tolerance],
            )?,
            cluster_controller: 0,
        };
        self.spec.process_counts.with_defaults(&defaults)
    }

    /// The generation of this cluster's spec, as assigned by K8s.
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }
}

/// Add up the role counts backing the default count of a process class.
fn sum_roles(class: &str, counts: &[u32]) -> Result<i32, AppError> {
    counts
        .iter()
        .try_fold(0u32, |acc, count| acc.checked_add(*count))
        .and_then(|total| i32::try_from(total).ok())
        .ok_or_else(|| AppError::InvalidSpec(format!("database configuration needs too many {} processes", class)))
}
