//! Placement error types.

use thiserror::Error;

use crate::quantity::ResourceKind;

/// A resource quantity string that does not normalize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} quantity {raw:?}")]
pub struct QuantityError {
    pub kind: ResourceKind,
    pub raw: String,
}

impl QuantityError {
    pub(crate) fn new(kind: ResourceKind, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
        }
    }
}

/// Errors that abort a placement decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("{object}: {source}")]
    Quantity {
        /// The pod or node carrying the malformed quantity.
        object: String,
        #[source]
        source: QuantityError,
    },

    #[error("{object}: resource total overflows")]
    Overflow {
        /// The pod, node or group whose summed resources overflow.
        object: String,
    },

    #[error("no nodes available")]
    NoNodesAvailable,

    #[error("none of {considered} nodes has non-negative free capacity")]
    NoSchedulableNodes { considered: usize },

    #[error("cannot place an empty group")]
    EmptyGroup,
}

pub type PlacementResult<T> = Result<T, PlacementError>;
