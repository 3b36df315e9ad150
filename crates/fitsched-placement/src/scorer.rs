//! Advisory best-node ranking.
//!
//! Ranks nodes by how much capacity they have left. It never checks
//! whether a particular pod fits, so its answer is a hint for "where
//! would this go best", not an admission decision. Use
//! [`place_group`](crate::placer::place_group) to admit work.

use serde::Serialize;

use fitsched_core::{Node, Pod, ScoringMode};

use crate::capacity::{NodeCapacity, cluster_capacity};
use crate::error::{PlacementError, PlacementResult};

/// Score of one schedulable node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeScore {
    pub capacity: NodeCapacity,
    /// Higher is better.
    pub score: f64,
}

/// Result of the advisory ranking.
#[derive(Debug, Clone)]
pub struct BestNode {
    pub node: Node,
    pub capacity: NodeCapacity,
    pub score: f64,
}

/// Score a node's free capacity.
///
/// `RawMean` averages millicores with memory units, which is not
/// dimensionally meaningful but is the established ranking.
/// `Fractional` averages the free share of each resource instead.
///
/// The raw mean is taken in `f64` on purpose: the sum cannot overflow,
/// and odd totals keep their half instead of truncating. Two nodes
/// whose integer means would tie can therefore rank apart, with the
/// larger exact mean winning.
pub fn score(capacity: &NodeCapacity, mode: ScoringMode) -> f64 {
    match mode {
        ScoringMode::RawMean => (capacity.free.cpu as f64 + capacity.free.memory as f64) / 2.0,
        ScoringMode::Fractional => {
            let share = |free: i64, total: i64| {
                if total > 0 { free as f64 / total as f64 } else { 0.0 }
            };
            (share(capacity.free.cpu, capacity.allocatable.cpu)
                + share(capacity.free.memory, capacity.allocatable.memory))
                / 2.0
        }
    }
}

/// Score every schedulable node, in node-list order.
///
/// Nodes with negative free capacity are left out.
pub fn rank_nodes(capacities: Vec<NodeCapacity>, mode: ScoringMode) -> Vec<NodeScore> {
    capacities
        .into_iter()
        .filter(NodeCapacity::is_schedulable)
        .map(|capacity| NodeScore {
            score: score(&capacity, mode),
            capacity,
        })
        .collect()
}

/// Pick the node with the strictly greatest score; ties go to the node
/// listed first.
pub fn select_best_node(nodes: &[Node], pods: &[Pod], mode: ScoringMode) -> PlacementResult<BestNode> {
    if nodes.is_empty() {
        return Err(PlacementError::NoNodesAvailable);
    }

    let capacities = cluster_capacity(nodes, pods)?;
    let mut best: Option<NodeScore> = None;
    for candidate in rank_nodes(capacities, mode) {
        if best.as_ref().is_none_or(|current| candidate.score > current.score) {
            best = Some(candidate);
        }
    }

    let best = best.ok_or(PlacementError::NoSchedulableNodes {
        considered: nodes.len(),
    })?;
    let node = nodes
        .iter()
        .find(|n| n.name() == best.capacity.node)
        .cloned()
        .ok_or(PlacementError::NoNodesAvailable)?;

    Ok(BestNode {
        node,
        capacity: best.capacity,
        score: best.score,
    })
}
