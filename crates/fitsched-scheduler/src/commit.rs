//! Group commit: binds a placed group to its node.
//!
//! Bindings cannot be undone through the control plane, so a group is
//! committed in two phases. [`reserve`] runs on the fresh snapshot before
//! the decision and sets aside every unit already shown on a node.
//! [`commit`] then binds the remaining units in group order, one result
//! per unit. A failed binding does not stop the others; every failure is
//! handed back in the [`CommitReport`].

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use fitsched_cluster::{ClusterError, ClusterResult, ControlPlane};
use fitsched_core::{Binding, Event, Pod, SchedulerConfig};

use crate::events;

/// Why one unit of a placed group was not bound.
#[derive(Debug, Error)]
pub enum CommitFailure {
    #[error("already bound to node {node}")]
    AlreadyBound { node: String },

    #[error(transparent)]
    Bind(#[from] ClusterError),
}

#[derive(Debug)]
pub struct UnitFailure {
    pub pod: String,
    pub failure: CommitFailure,
}

/// A scheduling event that could not be delivered.
#[derive(Debug)]
pub struct NotifyFailure {
    pub pod: String,
    pub error: ClusterError,
}

/// Per-unit result of committing a placed group.
#[derive(Debug)]
pub struct CommitReport {
    pub node: String,
    /// Pods bound to `node`, in group order.
    pub bound: Vec<String>,
    pub failed: Vec<UnitFailure>,
    pub notify_failures: Vec<NotifyFailure>,
}

impl CommitReport {
    /// True when every unit of the group was bound.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_pods(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|f| f.pod.as_str())
    }
}

/// Units of a group split by current assignment, taken before the
/// placement decision so the decision only covers what is left to bind.
#[derive(Debug)]
pub struct Reservation {
    pending: Vec<Pod>,
    skipped: Vec<UnitFailure>,
}

impl Reservation {
    /// Units still to be placed, in group order.
    pub fn pending(&self) -> &[Pod] {
        &self.pending
    }

    /// True when every unit is already on a node.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Report for a settled group: nothing bound, every unit skipped.
    /// `node` is where the first unit already runs.
    pub fn into_settled_report(self) -> CommitReport {
        let node = self
            .skipped
            .iter()
            .find_map(|unit| match &unit.failure {
                CommitFailure::AlreadyBound { node } => Some(node.clone()),
                CommitFailure::Bind(_) => None,
            })
            .unwrap_or_default();
        CommitReport {
            node,
            bound: Vec::new(),
            failed: self.skipped,
            notify_failures: Vec::new(),
        }
    }
}

/// Set aside units that `snapshot_pods` shows as already assigned.
///
/// The control plane does not treat a second binding as a no-op, and a
/// bound unit already counts against its node's usage, so current
/// assignment is checked before deciding or binding anything.
pub fn reserve(units: &[Pod], snapshot_pods: &[Pod]) -> Reservation {
    let mut pending = Vec::with_capacity(units.len());
    let mut skipped = Vec::new();

    for unit in units {
        let current = snapshot_pods.iter().find(|p| same_pod(p, unit));
        match current.and_then(Pod::node_name) {
            Some(assigned) => {
                debug!(pod = %unit.name(), node = %assigned, "unit already bound, skipping");
                skipped.push(UnitFailure {
                    pod: unit.name().to_string(),
                    failure: CommitFailure::AlreadyBound {
                        node: assigned.to_string(),
                    },
                });
            }
            None => pending.push(unit.clone()),
        }
    }

    Reservation { pending, skipped }
}

/// Bind every reserved unit to `node` and announce each binding.
pub async fn commit(
    client: &dyn ControlPlane,
    config: &SchedulerConfig,
    reservation: Reservation,
    node: &str,
) -> CommitReport {
    let Reservation { pending, skipped } = reservation;
    let mut report = CommitReport {
        node: node.to_string(),
        bound: Vec::with_capacity(pending.len()),
        failed: skipped,
        notify_failures: Vec::new(),
    };

    for pod in &pending {
        let binding = Binding::new(pod.name(), &report.node);
        let what = format!("bind {} to {}", pod.name(), report.node);
        if let Err(error) = with_deadline(config.request_timeout, what, client.bind(&binding)).await {
            warn!(pod = %pod.name(), node = %report.node, %error, "binding failed");
            report.failed.push(UnitFailure {
                pod: pod.name().to_string(),
                failure: CommitFailure::Bind(error),
            });
            continue;
        }

        info!(pod = %pod.name(), node = %report.node, "pod bound");
        report.bound.push(pod.name().to_string());

        let event = events::scheduled(config, pod, &report.node, Utc::now());
        if let Some(failure) = notify(client, config, pod, &event).await {
            report.notify_failures.push(failure);
        }
    }

    report
}

/// Post an event; a failure is logged and returned, never raised.
pub(crate) async fn notify(
    client: &dyn ControlPlane,
    config: &SchedulerConfig,
    pod: &Pod,
    event: &Event,
) -> Option<NotifyFailure> {
    let what = format!("event {} for {}", event.reason, pod.name());
    match with_deadline(config.request_timeout, what, client.post_event(event)).await {
        Ok(()) => None,
        Err(error) => {
            warn!(pod = %pod.name(), reason = %event.reason, %error, "event not delivered");
            Some(NotifyFailure {
                pod: pod.name().to_string(),
                error,
            })
        }
    }
}

/// Bound a control-plane call by `timeout`.
pub(crate) async fn with_deadline<T>(
    timeout: Duration,
    what: String,
    call: impl Future<Output = ClusterResult<T>>,
) -> ClusterResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ClusterError::Timeout { uri: what, timeout })?
}

fn same_pod(a: &Pod, b: &Pod) -> bool {
    if !a.uid().is_empty() && !b.uid().is_empty() {
        return a.uid() == b.uid();
    }
    a.name() == b.name() && a.metadata.namespace == b.metadata.namespace
}
