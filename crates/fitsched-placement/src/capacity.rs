//! Node capacity resolution.
//!
//! Allocatable capacity is normalized with the same functions as pod
//! requests. Free capacity is `allocatable - used` and may be negative;
//! a node with negative free capacity in either resource cannot host.

use serde::Serialize;
use tracing::debug;

use fitsched_core::{Node, Pod, RESOURCE_CPU, RESOURCE_MEMORY};

use crate::error::{PlacementError, PlacementResult, QuantityError};
use crate::ledger::Ledger;
use crate::quantity::{ResourceKind, Resources, normalize_cpu, normalize_memory};

/// Capacity figures for one node in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeCapacity {
    pub node: String,
    pub allocatable: Resources,
    pub used: Resources,
    pub free: Resources,
}

impl NodeCapacity {
    /// False when either free figure is negative.
    pub fn is_schedulable(&self) -> bool {
        self.free.cpu >= 0 && self.free.memory >= 0
    }

    /// Resources for which free capacity is below `demand`.
    pub fn shortfalls(&self, demand: Resources) -> Vec<ResourceKind> {
        [ResourceKind::Cpu, ResourceKind::Memory]
            .into_iter()
            .filter(|&kind| self.free.get(kind) < demand.get(kind))
            .collect()
    }

    pub fn fits(&self, demand: Resources) -> bool {
        self.shortfalls(demand).is_empty() && self.is_schedulable()
    }
}

/// Allocatable capacity of a node. Unreported resources count as zero.
pub fn allocatable_of(node: &Node) -> PlacementResult<Resources> {
    let quantity_err = |source: QuantityError| PlacementError::Quantity {
        object: format!("node {}", node.name()),
        source,
    };
    let cpu = node
        .allocatable(RESOURCE_CPU)
        .map(normalize_cpu)
        .transpose()
        .map_err(quantity_err)?;
    let memory = node
        .allocatable(RESOURCE_MEMORY)
        .map(normalize_memory)
        .transpose()
        .map_err(quantity_err)?;
    Ok(Resources::new(cpu.unwrap_or(0), memory.unwrap_or(0)))
}

/// Free capacity for every node, in node-list order.
pub fn free_capacity(nodes: &[Node], ledger: &Ledger) -> PlacementResult<Vec<NodeCapacity>> {
    nodes
        .iter()
        .map(|node| -> PlacementResult<NodeCapacity> {
            let allocatable = allocatable_of(node)?;
            let used = ledger.used(node.name()).unwrap_or_default();
            let free = allocatable
                .checked_sub(used)
                .ok_or_else(|| PlacementError::Overflow {
                    object: format!("node {}", node.name()),
                })?;
            debug!(
                node = %node.name(),
                cpu_total = allocatable.cpu,
                cpu_free = free.cpu,
                memory_total = allocatable.memory,
                memory_free = free.memory,
                "node capacity"
            );
            Ok(NodeCapacity {
                node: node.name().to_string(),
                allocatable,
                used,
                free,
            })
        })
        .collect()
}

/// Build the ledger for a snapshot and resolve free capacity in one step.
pub fn cluster_capacity(nodes: &[Node], pods: &[Pod]) -> PlacementResult<Vec<NodeCapacity>> {
    let ledger = Ledger::build(nodes, pods)?;
    free_capacity(nodes, &ledger)
}
