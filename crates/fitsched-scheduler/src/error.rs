//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

use fitsched_cluster::ClusterError;
use fitsched_placement::PlacementError;

/// Errors that abort a scheduling decision.
///
/// A group that fits nowhere is not an error; see
/// [`GroupOutcome::Rejected`](crate::scheduler::GroupOutcome::Rejected).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("control plane error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("snapshot fetch timed out after {timeout:?}")]
    SnapshotTimeout { timeout: Duration },
}

impl SchedulerError {
    /// Whether re-running the decision against a fresh snapshot can succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            SchedulerError::Cluster(e) => e.is_retriable(),
            SchedulerError::SnapshotTimeout { .. } => true,
            SchedulerError::Placement(
                PlacementError::Quantity { .. } | PlacementError::Overflow { .. } | PlacementError::EmptyGroup,
            ) => false,
            SchedulerError::Placement(_) => true,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
