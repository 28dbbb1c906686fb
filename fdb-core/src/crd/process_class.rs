//! Process classes and per-class process counts.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::process_group::ProcessGroupStatus;
use crate::error::AppError;

/// The role of a FoundationDB process.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessClass {
    Storage,
    Log,
    Transaction,
    Stateless,
    ClusterController,
}

impl ProcessClass {
    /// All process classes managed by the operator, in reconciliation order.
    pub const ALL: [ProcessClass; 5] = [Self::Storage, Self::Log, Self::Transaction, Self::Stateless, Self::ClusterController];

    /// The string form of this class, as used in process group IDs and status documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Log => "log",
            Self::Transaction => "transaction",
            Self::Stateless => "stateless",
            Self::ClusterController => "cluster_controller",
        }
    }
}

impl std::fmt::Display for ProcessClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessClass {
    type Err = AppError;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == val)
            .ok_or_else(|| AppError::InvalidSpec(format!("unknown process class {:?}", val)))
    }
}

/// Process counts per process class.
///
/// In a cluster spec, `0` means "use the default" and `-1` disables the class. Computed counts
/// are always non-negative.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCounts {
    #[serde(default)]
    pub storage: i32,
    #[serde(default)]
    pub log: i32,
    #[serde(default)]
    pub transaction: i32,
    #[serde(default)]
    pub stateless: i32,
    #[serde(default)]
    pub cluster_controller: i32,
}

impl ProcessCounts {
    /// Get the count for the given process class.
    pub fn get(&self, class: ProcessClass) -> i32 {
        match class {
            ProcessClass::Storage => self.storage,
            ProcessClass::Log => self.log,
            ProcessClass::Transaction => self.transaction,
            ProcessClass::Stateless => self.stateless,
            ProcessClass::ClusterController => self.cluster_controller,
        }
    }

    /// Get a mutable reference to the count for the given process class.
    pub fn get_mut(&mut self, class: ProcessClass) -> &mut i32 {
        match class {
            ProcessClass::Storage => &mut self.storage,
            ProcessClass::Log => &mut self.log,
            ProcessClass::Transaction => &mut self.transaction,
            ProcessClass::Stateless => &mut self.stateless,
            ProcessClass::ClusterController => &mut self.cluster_controller,
        }
    }

    /// Apply the given defaults to unset (`0`) classes, and resolve disabled (`-1`) classes to `0`.
    pub fn with_defaults(&self, defaults: &ProcessCounts) -> Result<ProcessCounts, AppError> {
        let mut out = ProcessCounts::default();
        for class in ProcessClass::ALL {
            *out.get_mut(class) = match self.get(class) {
                0 => defaults.get(class),
                -1 => 0,
                val if val > 0 => val,
                val => return Err(AppError::InvalidSpec(format!("process count for {} must be -1 or larger, got {}", class, val))),
            };
        }
        Ok(out)
    }

    /// Count the given process groups per class.
    ///
    /// Groups marked for removal are only counted when `include_removals` is true.
    pub fn from_process_groups<'a>(groups: impl IntoIterator<Item = &'a ProcessGroupStatus>, include_removals: bool) -> ProcessCounts {
        groups
            .into_iter()
            .filter(|group| include_removals || !group.is_marked_for_removal())
            .fold(ProcessCounts::default(), |mut acc, group| {
                *acc.get_mut(group.process_class) += 1;
                acc
            })
    }
}
