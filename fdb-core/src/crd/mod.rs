//! FoundationDB CRDs.
//!
//! References:
//! - https://kubernetes.io/docs/tasks/extend-kubernetes/custom-resources/custom-resource-definitions/
//! - https://kubernetes.io/docs/tasks/extend-kubernetes/custom-resources/custom-resource-definitions/#additional-printer-columns
//! - https://kubernetes.io/docs/reference/kubectl/jsonpath/

mod cluster;
mod process_class;
mod process_group;

#[cfg(test)]
mod mod_test;

use kube::Resource;

pub use cluster::{
    ClusterGenerationStatus, DatabaseConfiguration, FoundationDBCluster, FoundationDBClusterSpec, FoundationDBClusterStatus,
    RedundancyMode, RoleCounts, ANNOTATION_FORCE_RECONCILE,
};
pub use process_class::{ProcessClass, ProcessCounts};
pub use process_group::{ProcessGroupCondition, ProcessGroupConditionType, ProcessGroupId, ProcessGroupStatus};

/// A convenience trait built around the fact that all implementors
/// must have the following attributes.
pub trait RequiredMetadata {
    /// The namespace of this object.
    fn namespace(&self) -> &str;

    /// The name of this object.
    fn name(&self) -> &str;
}

impl RequiredMetadata for FoundationDBCluster {
    fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }
}
