//! The database's machine-readable status document, as returned by `status json`.
//!
//! Only the parts of the document used by the operator are modeled; everything else is ignored
//! during deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crd::ProcessClass;

/// The well-known locality key holding a process's instance ID.
pub const LOCALITY_INSTANCE_ID: &str = "instance_id";
/// The well-known locality key holding a process's zone ID.
pub const LOCALITY_ZONE_ID: &str = "zoneid";
/// The well-known locality key holding a process's data center ID.
pub const LOCALITY_DC_ID: &str = "dcid";
/// The well-known locality key holding a process's machine ID.
pub const LOCALITY_MACHINE_ID: &str = "machineid";

/// The status document of a FoundationDB cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct FoundationDBStatus {
    #[serde(default)]
    pub cluster: ClusterInfo,
}

/// Cluster-scoped section of the status document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ClusterInfo {
    /// All processes currently reporting to the cluster controller, keyed by process ID.
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessInfo>,
    /// The current recovery generation of the cluster.
    #[serde(default)]
    pub generation: i64,
}

/// A live process as reported in the status document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ProcessInfo {
    pub address: String,
    #[serde(default)]
    pub locality: ProcessLocality,
    /// The class the process was started with, e.g. `storage` or `unset`.
    #[serde(default)]
    pub class_type: String,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub degraded: bool,
}

impl ProcessInfo {
    /// The process class of this process, if it is one managed by the operator.
    pub fn process_class(&self) -> Option<ProcessClass> {
        self.class_type.parse().ok()
    }
}

/// The locality attributes reported by a process.
///
/// The map is kept opaque; the well-known keys have typed accessors.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProcessLocality(BTreeMap<String, String>);

impl ProcessLocality {
    pub fn instance_id(&self) -> Option<&str> {
        self.get(LOCALITY_INSTANCE_ID)
    }

    pub fn zone_id(&self) -> Option<&str> {
        self.get(LOCALITY_ZONE_ID)
    }

    pub fn dc_id(&self) -> Option<&str> {
        self.get(LOCALITY_DC_ID)
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.get(LOCALITY_MACHINE_ID)
    }

    /// Get the value of an arbitrary locality field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|val| !val.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProcessLocality {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(key, val)| (key.into(), val.into())).collect())
    }
}

/// Aggregate health of the live processes of one class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessClassHealth {
    /// Processes currently reporting.
    pub reporting: usize,
    /// Reporting processes which are excluded from the database.
    pub excluded: usize,
    /// Reporting processes flagged as degraded.
    pub degraded: usize,
}

impl FoundationDBStatus {
    /// Aggregate process health per process class.
    ///
    /// Processes of classes not managed by the operator are skipped.
    pub fn class_health(&self) -> BTreeMap<ProcessClass, ProcessClassHealth> {
        self.cluster
            .processes
            .values()
            .filter_map(|process| process.process_class().map(|class| (class, process)))
            .fold(BTreeMap::new(), |mut acc, (class, process)| {
                let health: &mut ProcessClassHealth = acc.entry(class).or_default();
                health.reporting += 1;
                health.excluded += process.excluded as usize;
                health.degraded += process.degraded as usize;
                acc
            })
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;

    use super::*;

    #[test]
    fn status_json_decodes_and_aggregates_health() -> Result<()> {
        let raw = r#"{
            "client": {"database_status": {"available": true}},
            "cluster": {
                "generation": 7,
                "processes": {
                    "a1": {"address": "10.1.0.1:4501", "class_type": "storage", "excluded": true,
                           "locality": {"instance_id": "storage-1", "zoneid": "z1", "dcid": "dc1", "machineid": "m1"}},
                    "a2": {"address": "10.1.0.2:4501", "class_type": "storage", "degraded": true,
                           "locality": {"instance_id": "storage-2", "zoneid": "z2", "dcid": "dc1"}},
                    "a3": {"address": "10.1.0.3:4501", "class_type": "unset",
                           "locality": {"instance_id": "", "zoneid": "z3"}}
                }
            }
        }"#;

        let status: FoundationDBStatus = serde_json::from_str(raw)?;
        let health = status.class_health();

        assert_eq!(status.cluster.generation, 7);
        assert_eq!(health.len(), 1, "expected only the storage class to be aggregated, got {:?}", health);
        assert_eq!(
            health.get(&ProcessClass::Storage).copied(),
            Some(ProcessClassHealth { reporting: 2, excluded: 1, degraded: 1 })
        );
        let storage = &status.cluster.processes["a1"];
        assert!(storage.excluded);
        assert_eq!(storage.locality.instance_id(), Some("storage-1"));
        assert_eq!(storage.locality.dc_id(), Some("dc1"));
        assert_eq!(storage.locality.machine_id(), Some("m1"));
        let unset = &status.cluster.processes["a3"];
        assert_eq!(unset.locality.instance_id(), None, "expected an empty instance_id to read as absent");
        assert_eq!(unset.locality.zone_id(), Some("z3"));
        Ok(())
    }
}
