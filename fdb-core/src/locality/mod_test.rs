use std::collections::BTreeSet;

use anyhow::Result;
use maplit::btreemap;

use super::*;
use crate::status::ProcessInfo;

fn info(id: &str, zone: &str, dc: &str) -> LocalityInfo {
    LocalityInfo {
        id: id.into(),
        address: format!("10.0.0.{}:4501", id.len()),
        locality: vec![("instance_id", id), ("zoneid", zone), ("dcid", dc)].into_iter().collect(),
    }
}

fn process(id: &str, zone: &str, dc: &str) -> ProcessInfo {
    ProcessInfo {
        address: format!("{}.fdb:4501", id),
        locality: vec![("instance_id", id), ("zoneid", zone), ("dcid", dc)].into_iter().collect(),
        class_type: "storage".into(),
        ..Default::default()
    }
}

/// Six storage processes spread evenly over three zones of one data center.
fn three_zones() -> Vec<LocalityInfo> {
    vec![
        info("storage-1", "z1", "dc1"),
        info("storage-2", "z1", "dc1"),
        info("storage-3", "z2", "dc1"),
        info("storage-4", "z2", "dc1"),
        info("storage-5", "z3", "dc1"),
        info("storage-6", "z3", "dc1"),
    ]
}

fn ids(selected: &[LocalityInfo]) -> Vec<&str> {
    selected.iter().map(|info| info.id.as_str()).collect()
}

#[test]
fn catalog_filters_data_center_and_skips_unidentified_processes() {
    let processes = vec![
        process("storage-1", "z1", "dc1"),
        process("storage-2", "z2", "dc2"),
        process("", "z3", "dc1"),
    ];

    let scoped = LocalityCatalog::build(&processes, Some("dc1"));
    let global = LocalityCatalog::build(&processes, None);

    assert_eq!(scoped.len(), 1, "expected only the identified dc1 process to be indexed, got {:?}", scoped);
    assert!(scoped.contains("storage-1"));
    assert!(!scoped.contains("storage-2"), "expected processes of other data centers to be skipped");
    assert_eq!(global.len(), 2, "expected every identified process without a data center filter, got {:?}", global);
    assert_eq!(
        global.get("storage-2").map(|info| info.address.as_str()),
        Some("storage-2.fdb:4501")
    );
}

#[test]
fn selection_covers_every_domain_before_doubling_up() -> Result<()> {
    let selected = choose_distributed_processes(&three_zones(), 4, &ProcessSelectionConstraint::default())?;

    let zones: BTreeSet<_> = selected.iter().filter_map(|info| info.locality.zone_id()).collect();
    assert_eq!(selected.len(), 4, "expected exactly 4 selected processes, got {:?}", ids(&selected));
    assert_eq!(zones.len(), 3, "expected every zone to keep at least one process, got {:?}", ids(&selected));
    assert_eq!(ids(&selected), vec!["storage-1", "storage-3", "storage-5", "storage-2"]);
    Ok(())
}

#[test]
fn selection_is_independent_of_input_order() -> Result<()> {
    let forward = three_zones();
    let mut reversed = three_zones();
    reversed.reverse();
    let constraint = ProcessSelectionConstraint::default();

    let first = choose_distributed_processes(&forward, 3, &constraint)?;
    let second = choose_distributed_processes(&reversed, 3, &constraint)?;
    let again = choose_distributed_processes(&forward, 3, &constraint)?;

    assert_eq!(first, second, "expected identical selections regardless of input order");
    assert_eq!(first, again, "expected repeated calls to be identical");
    Ok(())
}

#[test]
fn selection_never_picks_excluded_processes() -> Result<()> {
    let constraint = ProcessSelectionConstraint {
        excluded: vec!["storage-1".to_string(), "storage-3".to_string()].into_iter().collect(),
        ..Default::default()
    };

    let selected = choose_distributed_processes(&three_zones(), 4, &constraint)?;

    assert_eq!(selected.len(), 4);
    assert!(
        selected.iter().all(|info| !constraint.excluded.contains(&info.id)),
        "expected excluded processes to be skipped, got {:?}",
        ids(&selected)
    );
    Ok(())
}

#[test]
fn selection_fails_with_too_few_candidates() {
    let mut candidates = three_zones();
    candidates.truncate(3);
    candidates.push(info("storage-1", "z1", "dc1"));

    let res = choose_distributed_processes(&candidates, 5, &ProcessSelectionConstraint::default());

    assert!(
        matches!(res, Err(AppError::ConstraintUnsatisfiable { desired: 5, chosen: 3 })),
        "expected duplicates to count once and the selection to fail, got {:?}",
        res
    );
}

#[test]
fn selection_honors_hard_limits() -> Result<()> {
    let constraint = ProcessSelectionConstraint {
        hard_limits: btreemap! {"zoneid".to_string() => 1},
        ..Default::default()
    };

    let res = choose_distributed_processes(&three_zones(), 4, &constraint);
    let selected = choose_distributed_processes(&three_zones(), 3, &constraint)?;

    assert!(
        matches!(res, Err(AppError::ConstraintUnsatisfiable { desired: 4, chosen: 3 })),
        "expected a one-per-zone limit to cap the selection at 3, got {:?}",
        res
    );
    assert_eq!(ids(&selected), vec!["storage-1", "storage-3", "storage-5"]);
    Ok(())
}

#[test]
fn selection_requires_minimum_distinct_domains() -> Result<()> {
    let single_zone = vec![info("log-1", "z1", "dc1"), info("log-2", "z1", "dc1"), info("log-3", "z1", "dc1")];
    let constraint = ProcessSelectionConstraint {
        min_distinct_domains: 2,
        ..Default::default()
    };

    let res = choose_distributed_processes(&single_zone, 2, &constraint);
    let spread = choose_distributed_processes(&three_zones(), 2, &constraint)?;

    assert!(matches!(res, Err(AppError::ConstraintUnsatisfiable { .. })), "expected a single zone to be rejected, got {:?}", res);
    assert_eq!(ids(&spread), vec!["storage-1", "storage-3"]);
    Ok(())
}

#[test]
fn selection_spreads_processes_missing_a_field_as_their_own_domain() -> Result<()> {
    let candidates = vec![
        info("stateless-1", "z1", "dc1"),
        info("stateless-2", "z1", "dc1"),
        LocalityInfo {
            id: "stateless-3".into(),
            address: "10.0.0.3:4501".into(),
            locality: vec![("instance_id", "stateless-3")].into_iter().collect(),
        },
    ];

    let selected = choose_distributed_processes(&candidates, 2, &ProcessSelectionConstraint::default())?;

    assert_eq!(ids(&selected), vec!["stateless-1", "stateless-3"]);
    Ok(())
}

#[test]
fn zero_target_selects_nothing() -> Result<()> {
    let selected = choose_distributed_processes(&three_zones(), 0, &ProcessSelectionConstraint::default())?;
    assert!(selected.is_empty(), "expected an empty selection, got {:?}", ids(&selected));
    Ok(())
}
