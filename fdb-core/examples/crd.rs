//! A script used to generate the CRDs used by this project.
//!
//! Any time a CRD spec changes, this script can be run to ensure that the CRDs are up-to-date and
//! ready to be synced with the cluster. Pass an output directory to write the CRD to a file,
//! otherwise it is printed to stdout.

use anyhow::{Context, Result};
use fdb_core::crd::FoundationDBCluster;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let cluster = FoundationDBCluster::crd();
    let cluster_yaml = serde_yaml::to_string(&cluster).context("error serializing FoundationDBCluster CRD to yaml")?;

    match std::env::args().nth(1) {
        Some(dir) => {
            let crds_path = std::fs::canonicalize(&dir).with_context(|| format!("error getting canonical path of {}", dir))?;
            let target = crds_path.join("foundationdbcluster.yaml");
            std::fs::write(&target, &cluster_yaml).with_context(|| format!("error writing FoundationDBCluster CRD to {:?}", &target))?;
            println!("FoundationDBCluster CRD written to {:?}", &target);
        }
        None => println!("{}", cluster_yaml),
    }

    Ok(())
}
