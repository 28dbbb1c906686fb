//! Process group status records.

use std::borrow::Borrow;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::ProcessClass;

/// The stable identifier of a process group, prefixed by its process class.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(transparent)]
pub struct ProcessGroupId(String);

impl ProcessGroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProcessGroupId {
    fn from(val: String) -> Self {
        Self(val)
    }
}

impl From<&str> for ProcessGroupId {
    fn from(val: &str) -> Self {
        Self(val.into())
    }
}

impl Borrow<str> for ProcessGroupId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The observed and desired state of one process group.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupStatus {
    #[serde(rename = "processGroupID")]
    pub process_group_id: ProcessGroupId,
    pub process_class: ProcessClass,
    /// The addresses the group's processes are reachable at.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// The fault domain the group's pod was scheduled in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_domain: Option<String>,
    /// Unix timestamp of when the group was marked for removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_timestamp: Option<i64>,
    /// Unix timestamp of when the group's processes were excluded from the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_group_conditions: Vec<ProcessGroupCondition>,
}

impl ProcessGroupStatus {
    /// Create a new process group status for the given class.
    pub fn new(process_group_id: impl Into<ProcessGroupId>, process_class: ProcessClass) -> Self {
        Self {
            process_group_id: process_group_id.into(),
            process_class,
            addresses: vec![],
            fault_domain: None,
            removal_timestamp: None,
            exclusion_timestamp: None,
            process_group_conditions: vec![],
        }
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.removal_timestamp.is_some()
    }

    /// Mark this process group for removal, returning `true` if it was not already marked.
    ///
    /// The first removal timestamp is kept; a group is never unmarked.
    pub fn mark_for_removal(&mut self, now: i64) -> bool {
        if self.removal_timestamp.is_some() {
            return false;
        }
        self.removal_timestamp = Some(now);
        true
    }
}

/// A timestamped status flag of a process group.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupCondition {
    #[serde(rename = "type")]
    pub process_group_condition_type: ProcessGroupConditionType,
    /// Unix timestamp of when the condition was first observed.
    pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub enum ProcessGroupConditionType {
    MissingProcesses,
    MissingPod,
    MissingPVC,
    MissingService,
    PodPending,
    PodFailing,
    IncorrectCommandLine,
    ProcessIsMarkedAsExcluded,
    ResourcesTerminating,
}
