use anyhow::{Context, Result};

use super::*;
use crate::error::AppError;

fn cluster_with(spec: FoundationDBClusterSpec) -> FoundationDBCluster {
    FoundationDBCluster::new("sample", spec)
}

#[test]
fn desired_counts_use_defaults_for_double_redundancy() -> Result<()> {
    let cluster = cluster_with(FoundationDBClusterSpec {
        version: "7.1.26".into(),
        ..Default::default()
    });

    let counts = cluster.desired_process_counts()?;

    assert_eq!(counts.storage, 5, "expected storage default of 2 * min fault domains + 1, got {}", counts.storage);
    assert_eq!(counts.log, 4, "expected log default of logs + fault tolerance, got {}", counts.log);
    assert_eq!(counts.stateless, 9, "expected stateless default of 9, got {}", counts.stateless);
    assert_eq!(counts.transaction, 0, "expected transaction class to be opt-in, got {}", counts.transaction);
    assert_eq!(counts.cluster_controller, 0, "expected cluster_controller class to be opt-in, got {}", counts.cluster_controller);
    Ok(())
}

#[test]
fn desired_counts_for_triple_multi_region() -> Result<()> {
    let cluster = cluster_with(FoundationDBClusterSpec {
        version: "7.1.26".into(),
        database_configuration: DatabaseConfiguration {
            redundancy_mode: RedundancyMode::Triple,
            usable_regions: 2,
            ..Default::default()
        },
        ..Default::default()
    });

    let counts = cluster.desired_process_counts()?;

    // 4 logs + 4 remote logs + 2 spares.
    assert_eq!(counts.log, 10, "unexpected log count {}", counts.log);
    // 4 singletons + 2 commit + 1 grv + 1 resolver + 4 log routers + 2 spares.
    assert_eq!(counts.stateless, 14, "unexpected stateless count {}", counts.stateless);
    assert_eq!(counts.storage, 7, "unexpected storage count {}", counts.storage);
    Ok(())
}

#[test]
fn explicit_counts_override_defaults_and_minus_one_disables() -> Result<()> {
    let cluster = cluster_with(FoundationDBClusterSpec {
        version: "7.1.26".into(),
        process_counts: ProcessCounts {
            storage: 3,
            stateless: -1,
            transaction: 2,
            ..Default::default()
        },
        ..Default::default()
    });

    let counts = cluster.desired_process_counts()?;

    assert_eq!(counts.storage, 3);
    assert_eq!(counts.stateless, 0, "expected -1 to disable the stateless class");
    assert_eq!(counts.transaction, 2);
    assert_eq!(counts.log, 4);
    Ok(())
}

#[test]
fn negative_counts_are_invalid_spec() {
    let cluster = cluster_with(FoundationDBClusterSpec {
        version: "7.1.26".into(),
        process_counts: ProcessCounts { log: -2, ..Default::default() },
        ..Default::default()
    });

    let res = cluster.desired_process_counts();

    assert!(matches!(res, Err(AppError::InvalidSpec(_))), "expected InvalidSpec, got {:?}", res);
}

#[test]
fn invalid_database_configuration_is_invalid_spec() {
    let bad_regions = cluster_with(FoundationDBClusterSpec {
        database_configuration: DatabaseConfiguration { usable_regions: 3, ..Default::default() },
        ..Default::default()
    });
    let bad_logs = cluster_with(FoundationDBClusterSpec {
        database_configuration: DatabaseConfiguration { logs: Some(-3), ..Default::default() },
        ..Default::default()
    });

    assert!(matches!(bad_regions.desired_process_counts(), Err(AppError::InvalidSpec(_))));
    assert!(matches!(bad_logs.desired_process_counts(), Err(AppError::InvalidSpec(_))));
}

#[test]
fn oversized_role_counts_are_invalid_spec() {
    let cluster = cluster_with(FoundationDBClusterSpec {
        version: "7.1.26".into(),
        database_configuration: DatabaseConfiguration {
            commit_proxies: Some(i32::MAX),
            grv_proxies: Some(i32::MAX),
            resolvers: Some(i32::MAX),
            ..Default::default()
        },
        ..Default::default()
    });
    let oversized_logs = cluster_with(FoundationDBClusterSpec {
        version: "7.1.26".into(),
        database_configuration: DatabaseConfiguration { logs: Some(i32::MAX), ..Default::default() },
        ..Default::default()
    });

    let res = cluster.desired_process_counts();

    assert!(matches!(res, Err(AppError::InvalidSpec(_))), "expected InvalidSpec, got {:?}", res);
    let res = oversized_logs.desired_process_counts();
    assert!(matches!(res, Err(AppError::InvalidSpec(_))), "expected InvalidSpec, got {:?}", res);
}

#[test]
fn process_counts_from_groups_skip_removals() {
    let mut groups = vec![
        ProcessGroupStatus::new("storage-1", ProcessClass::Storage),
        ProcessGroupStatus::new("storage-2", ProcessClass::Storage),
        ProcessGroupStatus::new("log-1", ProcessClass::Log),
    ];
    groups[1].mark_for_removal(100);

    let current = ProcessCounts::from_process_groups(&groups, false);
    let total = ProcessCounts::from_process_groups(&groups, true);

    assert_eq!(current.storage, 1);
    assert_eq!(current.log, 1);
    assert_eq!(total.storage, 2);
}

#[test]
fn mark_for_removal_is_monotonic() {
    let mut group = ProcessGroupStatus::new("storage-1", ProcessClass::Storage);

    assert!(group.mark_for_removal(10), "expected first mark to report a change");
    assert!(!group.mark_for_removal(20), "expected second mark to be a no-op");
    assert_eq!(group.removal_timestamp, Some(10), "expected the first removal timestamp to be kept");
}

#[test]
fn process_class_parses_status_names() {
    assert_eq!("cluster_controller".parse::<ProcessClass>().ok(), Some(ProcessClass::ClusterController));
    assert_eq!("storage".parse::<ProcessClass>().ok(), Some(ProcessClass::Storage));
    assert!("unset".parse::<ProcessClass>().is_err());
}

#[test]
fn cluster_status_deserializes_from_k8s_json() -> Result<()> {
    let raw = r#"{
        "apiVersion": "apps.foundationdb.org/v1beta2",
        "kind": "FoundationDBCluster",
        "metadata": {"name": "sample", "namespace": "default", "generation": 4},
        "spec": {"version": "7.1.26", "processCounts": {"storage": 3}, "dataCenter": "dc1"},
        "status": {
            "processGroups": [
                {"processGroupID": "storage-1", "processClass": "storage", "addresses": ["10.0.0.1"]},
                {"processGroupID": "storage-2", "processClass": "storage", "removalTimestamp": 1700000000,
                 "processGroupConditions": [{"type": "MissingProcesses", "timestamp": 1699999000}]}
            ],
            "generations": {"reconciled": 3, "hasPendingRemoval": 3}
        }
    }"#;

    let cluster: FoundationDBCluster = serde_json::from_str(raw).context("error decoding cluster")?;
    let status = cluster.status.clone().unwrap_or_default();

    assert_eq!(cluster.generation(), 4);
    assert_eq!(cluster.name(), "sample");
    assert_eq!(cluster.spec.data_center.as_deref(), Some("dc1"));
    assert_eq!(status.process_groups_by_class(ProcessClass::Storage).count(), 2);
    assert_eq!(status.removals().into_iter().collect::<Vec<_>>(), vec![ProcessGroupId::from("storage-2")]);
    assert_eq!(
        status.generations,
        ClusterGenerationStatus {
            reconciled: 3,
            has_pending_removal: 3,
            ..Default::default()
        }
    );

    let encoded = serde_json::to_value(&status.generations).context("error encoding generations")?;
    assert_eq!(encoded, serde_json::json!({"reconciled": 3, "hasPendingRemoval": 3}), "expected zero generations to be omitted");
    Ok(())
}
