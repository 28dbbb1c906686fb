//! Generation based convergence tracking.
//!
//! Every change to a cluster's spec bumps `metadata.generation`. Once the operator has fully
//! reconciled a generation it records it as `status.generations.reconciled`, so a caller waiting
//! for a change only needs to compare the two. The operator may be idle when a change lands, so
//! the tracker periodically touches the force-reconcile annotation while it waits.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use crate::crd::{ClusterGenerationStatus, FoundationDBCluster};
use crate::error::AppError;
use crate::prom::METRIC_FORCE_RECONCILES;
use crate::store::ClusterStore;

/// How strictly the recorded generations are compared with the cluster's generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strictness {
    /// The reconciled generation must match and no other phase may be pending.
    Strict,
    /// Only the reconciled generation must match.
    Soft,
}

impl Default for Strictness {
    fn default() -> Self {
        Self::Strict
    }
}

/// The convergence state of a cluster snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceState {
    Pending,
    Reconciled,
}

impl std::fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Reconciled => f.write_str("Reconciled"),
        }
    }
}

/// Evaluate the convergence state of the given cluster snapshot.
///
/// A `minimum_generation` above zero additionally requires the reconciled generation to have
/// reached it.
pub fn evaluate(cluster: &FoundationDBCluster, strictness: Strictness, minimum_generation: i64) -> ConvergenceState {
    let generation = cluster.generation();
    let generations = cluster
        .status
        .as_ref()
        .map(|status| status.generations.clone())
        .unwrap_or_default();

    let matches = match strictness {
        Strictness::Strict => {
            generations
                == ClusterGenerationStatus {
                    reconciled: generation,
                    ..Default::default()
                }
        }
        Strictness::Soft => generations.reconciled == generation,
    };
    if !matches || (minimum_generation > 0 && generations.reconciled < minimum_generation) {
        return ConvergenceState::Pending;
    }
    ConvergenceState::Reconciled
}

/// Options controlling a wait for reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationOptions {
    pub strictness: Strictness,
    /// The generation which must at least be reconciled, `0` for none.
    pub minimum_generation: i64,
    /// The overall deadline of the wait.
    pub timeout: Duration,
    /// The delay between two reads of the cluster.
    pub poll_interval: Duration,
    /// The time without reaching reconciliation after which a force-reconcile nudge is issued.
    pub staleness_window: Duration,
}

impl Default for ReconciliationOptions {
    fn default() -> Self {
        Self {
            strictness: Strictness::Strict,
            minimum_generation: 0,
            timeout: Duration::from_secs(1800),
            poll_interval: Duration::from_secs(10),
            staleness_window: Duration::from_secs(240),
        }
    }
}

impl ReconciliationOptions {
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_minimum_generation(mut self, minimum_generation: i64) -> Self {
        self.minimum_generation = minimum_generation;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_staleness_window(mut self, staleness_window: Duration) -> Self {
        self.staleness_window = staleness_window;
        self
    }

    /// Check that these options describe a wait which can complete.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.timeout.is_zero() || self.poll_interval.is_zero() || self.staleness_window.is_zero() {
            return Err(AppError::Configuration(
                "timeout, poll interval and staleness window must be greater than zero".into(),
            ));
        }
        if self.timeout < self.poll_interval {
            return Err(AppError::Configuration(format!(
                "timeout {:?} must not be shorter than the poll interval {:?}",
                self.timeout, self.poll_interval
            )));
        }
        Ok(())
    }
}

/// Waits for clusters to reach a reconciled generation.
pub struct ConvergenceTracker<S: ClusterStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ClusterStore + ?Sized> ConvergenceTracker<S> {
    /// Create a new instance.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Wait until the named cluster is reconciled according to the given options.
    ///
    /// The cluster is read immediately and then once per poll interval; read failures are logged
    /// and retried on the next tick. Independently of the reads, a force-reconcile nudge is
    /// issued every staleness window. The wait ends either reconciled or timed out.
    #[tracing::instrument(level = "debug", skip(self, options))]
    pub async fn wait_for_generation(&self, name: &str, options: &ReconciliationOptions) -> Result<(), AppError> {
        options.validate()?;
        if options.minimum_generation > 0 {
            tracing::info!(cluster = %name, generation = options.minimum_generation, "waiting for generation");
        }

        match tokio::time::timeout(options.timeout, self.poll_until_reconciled(name, options)).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => Err(AppError::Timeout(options.timeout)),
        }
    }

    async fn poll_until_reconciled(&self, name: &str, options: &ReconciliationOptions) {
        let mut poll = interval(options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut staleness = interval_at(Instant::now() + options.staleness_window, options.staleness_window);
        staleness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen: Option<FoundationDBCluster> = None;

        loop {
            tokio::select! {
                biased;
                _ = poll.tick() => match self.store.get(name).await {
                    Ok(cluster) => {
                        if evaluate(&cluster, options.strictness, options.minimum_generation) == ConvergenceState::Reconciled {
                            tracing::info!(cluster = %name, generation = cluster.generation(), "reconciled");
                            return;
                        }
                        last_seen = Some(cluster);
                    }
                    Err(err) => tracing::warn!(error = ?err, cluster = %name, "error fetching cluster, will retry"),
                },
                _ = staleness.tick() => self.nudge(name, last_seen.as_ref()).await,
            }
        }
    }

    /// Touch the force-reconcile annotation of the named cluster.
    async fn nudge(&self, name: &str, last_seen: Option<&FoundationDBCluster>) {
        let generations = last_seen.and_then(|cluster| cluster.status.as_ref()).map(|status| &status.generations);
        let generation = last_seen.map(|cluster| cluster.generation()).unwrap_or_default();
        tracing::info!(cluster = %name, ?generations, generation, "cluster not yet reconciled, forcing reconciliation");

        metrics::increment_counter!(METRIC_FORCE_RECONCILES);
        if let Err(err) = self.store.force_reconcile(name).await {
            tracing::warn!(error = ?err, cluster = %name, "error forcing reconciliation, will retry");
        }
    }
}
