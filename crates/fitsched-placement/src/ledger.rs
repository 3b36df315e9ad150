//! Cluster resource ledger.
//!
//! Folds a pod snapshot into per-node used capacity. A fresh ledger is
//! built for every decision and dropped with it.
//!
//! Policy for pods bound to a node missing from the node snapshot: the
//! pod is skipped, logged at warn, and its name recorded in
//! [`Ledger::orphaned`]. The pod list can be newer than the node list,
//! and such a pod cannot affect capacity on any node we could choose.

use std::collections::HashMap;

use tracing::{debug, warn};

use fitsched_core::{Node, Pod};

use crate::error::{PlacementError, PlacementResult};
use crate::quantity::{Resources, pod_requests};

/// Used capacity per node for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    used: HashMap<String, Resources>,
    orphaned: Vec<String>,
}

impl Ledger {
    /// Build the ledger for `nodes` from every bound, non-terminal pod.
    ///
    /// Any malformed request aborts the build; there is no partial ledger.
    pub fn build(nodes: &[Node], pods: &[Pod]) -> PlacementResult<Self> {
        let mut used: HashMap<String, Resources> = nodes
            .iter()
            .map(|n| (n.name().to_string(), Resources::ZERO))
            .collect();
        let mut orphaned = Vec::new();

        for pod in pods {
            let Some(node_name) = pod.node_name() else {
                continue;
            };
            if pod.is_terminal() {
                continue;
            }
            let Some(slot) = used.get_mut(node_name) else {
                warn!(
                    pod = %pod.name(),
                    node = %node_name,
                    "pod bound to a node missing from the snapshot, ignoring"
                );
                orphaned.push(pod.name().to_string());
                continue;
            };
            *slot = slot
                .checked_add(pod_requests(pod)?)
                .ok_or_else(|| PlacementError::Overflow {
                    object: format!("node {node_name}"),
                })?;
        }

        debug!(nodes = used.len(), pods = pods.len(), orphaned = orphaned.len(), "ledger built");
        Ok(Self { used, orphaned })
    }

    /// Used capacity on `node`, or `None` if the node was not in the snapshot.
    pub fn used(&self, node: &str) -> Option<Resources> {
        self.used.get(node).copied()
    }

    /// Names of pods bound to nodes outside the snapshot.
    pub fn orphaned(&self) -> &[String] {
        &self.orphaned
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
