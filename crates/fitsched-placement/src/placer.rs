//! Group placement: all-or-nothing admission for related pods.
//!
//! The whole group must land on a single node, so the scan is first
//! fit over the node list: once one node satisfies the aggregate demand
//! there is nothing to gain from scoring the rest. A group is never
//! split across nodes.

use std::fmt;

use tracing::{debug, info};

use fitsched_core::{Node, Pod};

use crate::capacity::cluster_capacity;
use crate::error::{PlacementError, PlacementResult};
use crate::quantity::{ResourceKind, Resources, pod_requests};

/// Why one node could not take the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub node: String,
    pub insufficient: Vec<ResourceKind>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self
            .insufficient
            .iter()
            .map(|kind| format!("Insufficient {kind}"))
            .collect();
        write!(f, "fit failure on node ({}): {}", self.node, reasons.join(", "))
    }
}

/// Outcome of a group admission scan.
#[derive(Debug, Clone)]
pub enum GroupDecision {
    /// The first node that fits the whole group.
    Placed {
        node: Node,
        demand: Resources,
        free: Resources,
        /// Nodes earlier in the list that were tried and did not fit.
        rejections: Vec<Rejection>,
    },
    /// No node fits; one rejection per node considered.
    Rejected {
        demand: Resources,
        rejections: Vec<Rejection>,
    },
}

impl GroupDecision {
    pub fn node(&self) -> Option<&Node> {
        match self {
            GroupDecision::Placed { node, .. } => Some(node),
            GroupDecision::Rejected { .. } => None,
        }
    }

    pub fn rejections(&self) -> &[Rejection] {
        match self {
            GroupDecision::Placed { rejections, .. } | GroupDecision::Rejected { rejections, .. } => {
                rejections
            }
        }
    }

    /// Rejection reasons as display strings.
    pub fn reasons(&self) -> Vec<String> {
        self.rejections().iter().map(ToString::to_string).collect()
    }
}

/// Aggregate requests over every container of every pod in the group.
pub fn group_demand(units: &[Pod]) -> PlacementResult<Resources> {
    units
        .iter()
        .try_fold(Resources::ZERO, |acc, pod| -> PlacementResult<Resources> {
            acc.checked_add(pod_requests(pod)?)
                .ok_or_else(|| PlacementError::Overflow {
                    object: format!("group of {}", units.len()),
                })
        })
}

/// Find the first node whose free capacity covers the group's demand.
///
/// `nodes` and `pods` must come from one snapshot. No side effects: the
/// caller binds the group when the decision is `Placed`.
pub fn place_group(units: &[Pod], nodes: &[Node], pods: &[Pod]) -> PlacementResult<GroupDecision> {
    if units.is_empty() {
        return Err(PlacementError::EmptyGroup);
    }
    if nodes.is_empty() {
        return Err(PlacementError::NoNodesAvailable);
    }

    let demand = group_demand(units)?;
    let capacities = cluster_capacity(nodes, pods)?;
    debug!(group = units.len(), cpu = demand.cpu, memory = demand.memory, "scanning nodes for group");

    let mut rejections = Vec::new();
    for (node, capacity) in nodes.iter().zip(capacities) {
        // Demand is never negative, so an overcommitted resource always
        // shows up as a shortfall here.
        let insufficient = capacity.shortfalls(demand);
        if insufficient.is_empty() {
            info!(
                node = %node.name(),
                group = units.len(),
                cpu_free = capacity.free.cpu,
                memory_free = capacity.free.memory,
                "group fits"
            );
            return Ok(GroupDecision::Placed {
                node: node.clone(),
                demand,
                free: capacity.free,
                rejections,
            });
        }

        let rejection = Rejection {
            node: capacity.node,
            insufficient,
        };
        debug!(%rejection, "node rejected");
        rejections.push(rejection);
    }

    Ok(GroupDecision::Rejected { demand, rejections })
}
