//! Process locality catalog and fault-domain aware process selection.
//!
//! The catalog is built from the live process inventory of a status snapshot. The selection
//! algorithm then chooses which processes to keep when a process class must shrink, spreading
//! the retained processes across as many fault domains as possible.

#[cfg(test)]
mod mod_test;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::AppError;
use crate::status::{ProcessInfo, ProcessLocality, LOCALITY_DC_ID, LOCALITY_ZONE_ID};

/// The locality of a live process, keyed by its instance ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalityInfo {
    /// The instance ID of the process, equal to the ID of its process group.
    pub id: String,
    /// The address the process is reachable at.
    pub address: String,
    pub locality: ProcessLocality,
}

impl LocalityInfo {
    /// Build the locality info of the given process, if it reports an instance ID.
    pub fn from_process(process: &ProcessInfo) -> Option<Self> {
        let id = process.locality.instance_id()?;
        Some(Self {
            id: id.into(),
            address: process.address.clone(),
            locality: process.locality.clone(),
        })
    }
}

/// An index of live process localities by instance ID.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalityCatalog {
    entries: BTreeMap<String, LocalityInfo>,
}

impl LocalityCatalog {
    /// Build a catalog from the given processes.
    ///
    /// Only processes in the given data center are indexed; all processes are indexed when no
    /// data center is given. Processes without an instance ID can not be mapped to a process
    /// group and are left out.
    pub fn build<'a>(processes: impl IntoIterator<Item = &'a ProcessInfo>, data_center: Option<&str>) -> Self {
        let data_center = data_center.filter(|dc| !dc.is_empty());
        let entries = processes
            .into_iter()
            .filter(|process| data_center.is_none() || process.locality.dc_id() == data_center)
            .filter_map(|process| match LocalityInfo::from_process(process) {
                Some(info) => Some((info.id.clone(), info)),
                None => {
                    tracing::debug!(address = %process.address, "skipping process without an instance_id locality");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&LocalityInfo> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all indexed localities in instance ID order.
    pub fn iter(&self) -> impl Iterator<Item = &LocalityInfo> {
        self.entries.values()
    }
}

/// Constraints applied when choosing which processes to keep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSelectionConstraint {
    /// Locality fields to spread the selection across, most significant first.
    pub fields: Vec<String>,
    /// The maximum number of selected processes sharing a value of the given field.
    pub hard_limits: BTreeMap<String, usize>,
    /// IDs of processes which must never be selected.
    pub excluded: BTreeSet<String>,
    /// The minimum number of distinct values of the first field which the selection must cover.
    pub min_distinct_domains: usize,
}

impl Default for ProcessSelectionConstraint {
    fn default() -> Self {
        Self {
            fields: vec![LOCALITY_ZONE_ID.into(), LOCALITY_DC_ID.into()],
            hard_limits: Default::default(),
            excluded: Default::default(),
            min_distinct_domains: 0,
        }
    }
}

impl ProcessSelectionConstraint {
    /// Number of already selected processes per value, one map per spread field.
    fn new_tally<'a>(&self) -> Vec<BTreeMap<&'a str, usize>> {
        vec![BTreeMap::new(); self.fields.len()]
    }

    /// The values of the spread fields for the given process; a missing value is its own domain.
    fn domains<'a>(&self, info: &'a LocalityInfo) -> Vec<&'a str> {
        self.fields.iter().map(|field| info.locality.get(field).unwrap_or_default()).collect()
    }
}

/// Choose `target_count` processes out of `candidates`, maximizing fault-domain diversity.
///
/// At every step the eligible candidate whose domains have the fewest selected processes so far
/// is picked, comparing fields in order and falling back to the candidate ID. The result is in
/// pick order and does not depend on the order of the input.
pub fn choose_distributed_processes(
    candidates: &[LocalityInfo], target_count: usize, constraint: &ProcessSelectionConstraint,
) -> Result<Vec<LocalityInfo>, AppError> {
    if target_count == 0 {
        return Ok(vec![]);
    }

    // Duplicate IDs are considered once, keeping the first occurrence.
    let mut remaining: BTreeMap<&str, &LocalityInfo> = BTreeMap::new();
    for info in candidates.iter().filter(|info| !constraint.excluded.contains(&info.id)) {
        remaining.entry(info.id.as_str()).or_insert(info);
    }

    let mut tally = constraint.new_tally();
    let mut selected: Vec<LocalityInfo> = Vec::with_capacity(target_count);
    while selected.len() < target_count {
        let next = remaining
            .values()
            .copied()
            .filter_map(|info| {
                let domains = constraint.domains(info);
                let counts: Vec<usize> = domains
                    .iter()
                    .zip(tally.iter())
                    .map(|(domain, field_tally)| field_tally.get(domain).copied().unwrap_or_default())
                    .collect();
                let within_limits = constraint.fields.iter().zip(counts.iter()).all(|(field, count)| {
                    constraint.hard_limits.get(field).map(|limit| count < limit).unwrap_or(true)
                });
                within_limits.then(|| (counts, info))
            })
            .min_by(|(a_counts, a), (b_counts, b)| a_counts.cmp(b_counts).then_with(|| a.id.cmp(&b.id)));

        let info = match next {
            Some((_, info)) => info,
            None => break,
        };
        for (domain, field_tally) in constraint.domains(info).into_iter().zip(tally.iter_mut()) {
            *field_tally.entry(domain).or_default() += 1;
        }
        remaining.remove(info.id.as_str());
        selected.push(info.clone());
    }

    if selected.len() < target_count {
        return Err(AppError::ConstraintUnsatisfiable {
            desired: target_count,
            chosen: selected.len(),
        });
    }

    if constraint.min_distinct_domains > 0 {
        let distinct = tally
            .first()
            .map(|field_tally| field_tally.keys().filter(|domain| !domain.is_empty()).count())
            .unwrap_or_default();
        if distinct < constraint.min_distinct_domains {
            tracing::debug!(
                distinct,
                required = constraint.min_distinct_domains,
                "selection does not cover enough distinct fault domains"
            );
            return Err(AppError::ConstraintUnsatisfiable {
                desired: target_count,
                chosen: selected.len(),
            });
        }
    }

    Ok(selected)
}
