//! Metric names, registration and sampling.
//!
//! Counters are incremented where their events happen. Gauges are set from samples: the cluster
//! sample is taken by the controller from its cache, the process sample by a periodic sampler.

use anyhow::Result;

use crate::crd::FoundationDBCluster;

pub const METRIC_SHRINK_REMOVALS: &str = "fdb_operator_shrink_removals_total";
pub const METRIC_REMOVAL_COMMIT_CONFLICTS: &str = "fdb_operator_removal_commit_conflicts_total";
pub const METRIC_RECONCILE_REQUEUES: &str = "fdb_operator_reconcile_requeues_total";
pub const METRIC_CLUSTERS_WATCHER_ERRORS: &str = "fdb_operator_clusters_watcher_errors_total";
pub const METRIC_FORCE_RECONCILES: &str = "fdb_operator_force_reconciles_total";
pub const METRIC_CLUSTERS: &str = "fdb_operator_clusters";
pub const METRIC_CLUSTERS_UNRECONCILED: &str = "fdb_operator_clusters_unreconciled";
pub const METRIC_PROCESS_GROUPS_PENDING_REMOVAL: &str = "fdb_operator_process_groups_pending_removal";

pub const METRIC_OPEN_FDS: &str = "process_open_fds";
pub const METRIC_MAX_FDS: &str = "process_max_fds";
pub const METRIC_VIRTUAL_MEMORY_BYTES: &str = "process_virtual_memory_bytes";
pub const METRIC_VIRTUAL_MEMORY_MAX_BYTES: &str = "process_virtual_memory_max_bytes";
pub const METRIC_RESIDENT_MEMORY_BYTES: &str = "process_resident_memory_bytes";
pub const METRIC_HEAP_BYTES: &str = "process_heap_bytes";
pub const METRIC_THREADS: &str = "process_threads";

/// How often the process sampler collects a sample.
const PROC_SAMPLE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Register the operator's reconciliation metrics.
pub fn register_operator_metrics() {
    metrics::register_counter!(METRIC_SHRINK_REMOVALS, metrics::Unit::Count, "Process groups newly marked for removal by a shrink.");
    metrics::register_counter!(
        METRIC_REMOVAL_COMMIT_CONFLICTS,
        metrics::Unit::Count,
        "Write conflicts and stale plans hit while committing removal flags."
    );
    metrics::register_counter!(METRIC_RECONCILE_REQUEUES, metrics::Unit::Count, "Reconciliation passes which ended in a requeue.");
    metrics::register_counter!(METRIC_CLUSTERS_WATCHER_ERRORS, metrics::Unit::Count, "k8s watcher errors from the clusters watcher.");
    metrics::register_counter!(METRIC_FORCE_RECONCILES, metrics::Unit::Count, "Force-reconcile nudges issued while waiting for convergence.");
    metrics::register_gauge!(METRIC_CLUSTERS, metrics::Unit::Count, "FoundationDBCluster objects known to the operator.");
    metrics::register_gauge!(
        METRIC_CLUSTERS_UNRECONCILED,
        metrics::Unit::Count,
        "Clusters whose reconciled generation is behind their spec generation."
    );
    metrics::register_gauge!(
        METRIC_PROCESS_GROUPS_PENDING_REMOVAL,
        metrics::Unit::Count,
        "Process groups marked for removal across all known clusters."
    );
}

/// Register the Prometheus recommended process metrics.
///
/// This function should be called only once, early in the lifetime of the process.
pub fn register_proc_metrics() {
    metrics::register_gauge!(METRIC_OPEN_FDS, metrics::Unit::Count, "Number of open file descriptors.");
    metrics::register_gauge!(METRIC_MAX_FDS, metrics::Unit::Count, "Maximum number of open file descriptors.");
    metrics::register_gauge!(METRIC_VIRTUAL_MEMORY_BYTES, metrics::Unit::Bytes, "Virtual memory size in bytes.");
    metrics::register_gauge!(METRIC_VIRTUAL_MEMORY_MAX_BYTES, metrics::Unit::Bytes, "Maximum amount of virtual memory available in bytes.");
    metrics::register_gauge!(METRIC_RESIDENT_MEMORY_BYTES, metrics::Unit::Bytes, "Resident memory size in bytes.");
    metrics::register_gauge!(METRIC_HEAP_BYTES, metrics::Unit::Bytes, "Process heap size in bytes.");
    metrics::register_gauge!(METRIC_THREADS, metrics::Unit::Count, "Number of OS threads in the process.");
}

//////////////////////////////////////////////////////////////////////////////
// Cluster Sample ////////////////////////////////////////////////////////////

/// Point-in-time totals over the clusters known to the operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterSample {
    pub clusters: usize,
    /// Clusters whose latest spec generation has not been reconciled yet.
    pub unreconciled: usize,
    pub pending_removals: usize,
}

impl ClusterSample {
    /// Take a sample over the given clusters.
    pub fn collect<'a>(clusters: impl IntoIterator<Item = &'a FoundationDBCluster>) -> Self {
        clusters.into_iter().fold(Self::default(), |mut sample, cluster| {
            sample.clusters += 1;
            let status = cluster.status.as_ref();
            let reconciled = status.map(|status| status.generations.reconciled).unwrap_or_default();
            if reconciled < cluster.generation() {
                sample.unreconciled += 1;
            }
            sample.pending_removals += status
                .map(|status| status.process_groups.iter().filter(|group| group.is_marked_for_removal()).count())
                .unwrap_or_default();
            sample
        })
    }

    /// Set the cluster gauges from this sample.
    pub fn record(&self) {
        metrics::gauge!(METRIC_CLUSTERS, self.clusters as f64);
        metrics::gauge!(METRIC_CLUSTERS_UNRECONCILED, self.unreconciled as f64);
        metrics::gauge!(METRIC_PROCESS_GROUPS_PENDING_REMOVAL, self.pending_removals as f64);
    }
}

//////////////////////////////////////////////////////////////////////////////
// Process Sample ////////////////////////////////////////////////////////////

/// A sample of this process's resource usage. Fields which could not be read are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcSample {
    pub open_fds: Option<u64>,
    pub max_fds: Option<u64>,
    pub virtual_memory_bytes: Option<u64>,
    pub virtual_memory_max_bytes: Option<u64>,
    pub resident_memory_bytes: Option<u64>,
    pub heap_bytes: Option<u64>,
    pub threads: Option<u64>,
}

impl ProcSample {
    /// Sample this process from procfs.
    #[cfg(target_os = "linux")]
    pub fn collect() -> Result<Self> {
        use anyhow::Context;
        use procfs::process::LimitValue;

        let soft = |limit: LimitValue| match limit {
            LimitValue::Value(val) => Some(val),
            LimitValue::Unlimited => None,
        };
        let proc = procfs::process::Process::myself().context("error reading /proc/self")?;
        let mut sample = Self {
            virtual_memory_bytes: Some(proc.stat.vsize),
            threads: u64::try_from(proc.stat.num_threads).ok(),
            ..Default::default()
        };
        match proc.fd_count() {
            Ok(count) => sample.open_fds = Some(count as u64),
            Err(err) => tracing::debug!(error = ?err, metric = METRIC_OPEN_FDS, "error sampling process metric"),
        }
        match proc.limits() {
            Ok(limits) => {
                sample.max_fds = soft(limits.max_open_files.soft_limit);
                sample.virtual_memory_max_bytes = soft(limits.max_address_space.soft_limit);
                sample.heap_bytes = soft(limits.max_data_size.soft_limit);
            }
            Err(err) => tracing::debug!(error = ?err, metric = METRIC_MAX_FDS, "error sampling process metric"),
        }
        match proc.stat.rss_bytes() {
            Ok(rss) => sample.resident_memory_bytes = u64::try_from(rss).ok(),
            Err(err) => tracing::debug!(error = ?err, metric = METRIC_RESIDENT_MEMORY_BYTES, "error sampling process metric"),
        }
        Ok(sample)
    }

    /// Sample this process; only procfs is supported.
    #[cfg(not(target_os = "linux"))]
    pub fn collect() -> Result<Self> {
        anyhow::bail!("process metrics are only sampled on Linux")
    }

    /// Set the process gauges from the fields of this sample which were read.
    pub fn record(&self) {
        let gauges = [
            (METRIC_OPEN_FDS, self.open_fds),
            (METRIC_MAX_FDS, self.max_fds),
            (METRIC_VIRTUAL_MEMORY_BYTES, self.virtual_memory_bytes),
            (METRIC_VIRTUAL_MEMORY_MAX_BYTES, self.virtual_memory_max_bytes),
            (METRIC_RESIDENT_MEMORY_BYTES, self.resident_memory_bytes),
            (METRIC_HEAP_BYTES, self.heap_bytes),
            (METRIC_THREADS, self.threads),
        ];
        for (name, val) in gauges {
            if let Some(val) = val {
                metrics::gauge!(name, val as f64);
            }
        }
    }
}

/// Collect and record a sample of process metrics.
pub fn collect_proc_metrics() -> Result<()> {
    ProcSample::collect()?.record();
    Ok(())
}

/// Spawn a process metrics sampler which will shutdown when the given `shutdown` future resolves.
///
/// The sampler stops early when the platform can not be sampled.
pub fn spawn_proc_metrics_sampler(shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sample_interval = tokio::time::interval(PROC_SAMPLE_INTERVAL);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = sample_interval.tick() => {
                    if let Err(err) = collect_proc_metrics() {
                        tracing::debug!(error = ?err, "process metrics sampler stopping");
                        break;
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    })
}
