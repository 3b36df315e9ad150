//! fitsched placement engine: pure scheduling decisions.
//!
//! Every entry point takes an explicit `(nodes, pods)` snapshot and
//! recomputes cluster usage from scratch; nothing is cached between
//! calls. Callers fetch the snapshot and act on the decision.
//!
//! # Components
//!
//! - **`quantity`**: Resource quantity normalization (millicores, memory units)
//! - **`ledger`**: Per-node used capacity derived from bound pods
//! - **`capacity`**: Allocatable and free capacity per node
//! - **`scorer`**: Advisory best-node ranking
//! - **`placer`**: All-or-nothing group admission (first fit)

pub mod capacity;
pub mod error;
pub mod ledger;
pub mod placer;
pub mod quantity;
pub mod scorer;

pub use capacity::{NodeCapacity, allocatable_of, cluster_capacity, free_capacity};
pub use error::{PlacementError, PlacementResult, QuantityError};
pub use ledger::Ledger;
pub use placer::{GroupDecision, Rejection, group_demand, place_group};
pub use quantity::{ResourceKind, Resources, container_requests, normalize_cpu, normalize_memory, pod_requests};
pub use scorer::{BestNode, NodeScore, rank_nodes, score, select_best_node};
