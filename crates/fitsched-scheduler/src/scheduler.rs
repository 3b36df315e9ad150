//! Scheduler: one snapshot, one decision, then commit.
//!
//! Every call fetches nodes and active pods fresh from the control plane
//! and hands them to the placement engine; nothing is cached between
//! decisions. Two decisions running concurrently can both see the same
//! free capacity, so callers must serialize `place_group` calls (the
//! daemon runs a single decision worker).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use fitsched_cluster::{ControlPlane, PodFilter};
use fitsched_core::{Node, Pod, SchedulerConfig};
use fitsched_placement::{BestNode, GroupDecision, PlacementError, place_group, select_best_node};

use crate::commit::{self, CommitReport, NotifyFailure, reserve, with_deadline};
use crate::error::{SchedulerError, SchedulerResult};
use crate::events;

/// Nodes and active pods fetched together for one decision.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
}

/// Result of admitting a group.
#[derive(Debug)]
pub enum GroupOutcome {
    /// A node was chosen; the report says which units were bound.
    Placed(CommitReport),
    /// No node fits the group. One `FailedScheduling` event was posted
    /// for the first unit.
    Rejected {
        reasons: Vec<String>,
        notify_failure: Option<NotifyFailure>,
    },
}

pub struct Scheduler {
    client: Arc<dyn ControlPlane>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(client: Arc<dyn ControlPlane>, config: SchedulerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Fetch nodes and active pods under `request_timeout`.
    ///
    /// A timeout is returned as a retriable error.
    pub async fn snapshot(&self) -> SchedulerResult<Snapshot> {
        let timeout = self.config.request_timeout;
        let fetch = async {
            let (nodes, pods) = tokio::try_join!(self.client.list_nodes(), self.client.list_pods(PodFilter::Active))?;
            Ok::<_, SchedulerError>(Snapshot { nodes, pods })
        };
        let snapshot = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| SchedulerError::SnapshotTimeout { timeout })??;

        debug!(nodes = snapshot.nodes.len(), pods = snapshot.pods.len(), "snapshot fetched");
        Ok(snapshot)
    }

    /// Unscheduled pods addressed to this scheduler, in listing order.
    pub async fn unscheduled_pods(&self) -> SchedulerResult<Vec<Pod>> {
        let pods = with_deadline(
            self.config.request_timeout,
            "list unscheduled pods".to_string(),
            self.client.list_pods(PodFilter::Unscheduled),
        )
        .await?;

        Ok(pods
            .into_iter()
            .filter(|p| p.is_unscheduled() && p.wants_scheduler(&self.config.scheduler_name))
            .collect())
    }

    /// Advisory ranking: the node with the most free capacity.
    ///
    /// This does not check that any particular pod fits and binds nothing.
    pub async fn best_node(&self) -> SchedulerResult<BestNode> {
        let snapshot = self.snapshot().await?;
        let best = select_best_node(&snapshot.nodes, &snapshot.pods, self.config.scoring)?;
        debug!(node = %best.node.name(), score = best.score, "best node");
        Ok(best)
    }

    /// Admit `units` as one group: place all of them on a single node
    /// and bind them, or bind none and post one failure event.
    ///
    /// Units the snapshot already shows on a node are set aside first;
    /// they neither count toward the group's demand nor get rebound.
    pub async fn place_group(&self, units: &[Pod]) -> SchedulerResult<GroupOutcome> {
        if units.is_empty() {
            return Err(PlacementError::EmptyGroup.into());
        }

        let snapshot = self.snapshot().await?;
        let reservation = reserve(units, &snapshot.pods);
        if reservation.is_settled() {
            let report = reservation.into_settled_report();
            info!(group = units.len(), node = %report.node, "group already bound, nothing to place");
            return Ok(GroupOutcome::Placed(report));
        }

        let pending = reservation.pending();
        let first = &pending[0];
        let decision = place_group(pending, &snapshot.nodes, &snapshot.pods)?;

        match decision {
            GroupDecision::Placed { node, demand, .. } => {
                info!(
                    pod = %first.name(),
                    group = pending.len(),
                    node = %node.name(),
                    cpu = demand.cpu,
                    memory = demand.memory,
                    "group placed"
                );
                let report = commit::commit(self.client.as_ref(), &self.config, reservation, node.name()).await;
                if !report.is_complete() {
                    warn!(
                        node = %report.node,
                        bound = report.bound.len(),
                        failed = report.failed.len(),
                        "group only partially committed"
                    );
                }
                Ok(GroupOutcome::Placed(report))
            }
            GroupDecision::Rejected { rejections, .. } => {
                let reasons: Vec<String> = rejections.iter().map(ToString::to_string).collect();
                info!(pod = %first.name(), group = pending.len(), nodes = reasons.len(), "group fits on no node");

                let event = events::failed_scheduling(&self.config, first, &reasons, Utc::now());
                let notify_failure = commit::notify(self.client.as_ref(), &self.config, first, &event).await;
                Ok(GroupOutcome::Rejected { reasons, notify_failure })
            }
        }
    }
}
