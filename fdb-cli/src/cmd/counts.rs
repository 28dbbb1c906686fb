//! Show process counts of a cluster.

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::Fdb;
use fdb_core::crd::{FoundationDBCluster, ProcessClass, ProcessCounts};
use fdb_core::store::ClusterStore;

/// Show desired and current process counts of a cluster.
#[derive(StructOpt)]
#[structopt(name = "counts")]
pub struct Counts {
    /// The name of the cluster to inspect.
    name: String,
}

impl Counts {
    pub async fn run(&self, base: &Fdb) -> Result<()> {
        let store = base.get_store().await?;
        let cluster = store
            .get(&self.name)
            .await
            .with_context(|| format!("error fetching cluster {}", self.name))?;
        for line in render(&cluster)? {
            println!("{}", line);
        }
        Ok(())
    }
}

/// Render one line per process class, plus a header.
fn render(cluster: &FoundationDBCluster) -> Result<Vec<String>> {
    let desired = cluster.desired_process_counts().context("error computing desired process counts")?;
    let groups = cluster.status.as_ref().map(|status| status.process_groups.as_slice()).unwrap_or_default();
    let active = ProcessCounts::from_process_groups(groups, false);
    let total = ProcessCounts::from_process_groups(groups, true);

    let mut lines = vec![format!("{:<20}{:>10}{:>10}{:>10}", "CLASS", "DESIRED", "CURRENT", "REMOVING")];
    for class in ProcessClass::ALL {
        lines.push(format!(
            "{:<20}{:>10}{:>10}{:>10}",
            class.as_str(),
            desired.get(class),
            active.get(class),
            total.get(class) - active.get(class)
        ));
    }
    Ok(lines)
}

#[cfg(test)]
mod test {
    use super::*;
    use fdb_core::crd::{FoundationDBClusterSpec, FoundationDBClusterStatus, ProcessGroupStatus};

    #[test]
    fn render_splits_active_and_removing_groups() {
        let mut groups: Vec<_> = (1..=4)
            .map(|idx| ProcessGroupStatus::new(format!("storage-{}", idx), ProcessClass::Storage))
            .collect();
        groups[3].mark_for_removal(100);
        let mut cluster = FoundationDBCluster::new(
            "sample",
            FoundationDBClusterSpec {
                process_counts: ProcessCounts {
                    storage: 3,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        cluster.status = Some(FoundationDBClusterStatus {
            process_groups: groups,
            ..Default::default()
        });

        let lines = render(&cluster).expect("error rendering counts");

        assert_eq!(lines.len(), 1 + ProcessClass::ALL.len());
        let storage: Vec<&str> = lines[1].split_whitespace().collect();
        assert_eq!(storage, vec!["storage", "3", "3", "1"]);
    }
}
