//! fitsched-scheduler: turns placement decisions into cluster changes.
//!
//! Wraps the placement engine with the control-plane side of a decision:
//!
//! - fetch a fresh `(nodes, pods)` snapshot under a deadline
//! - run the advisory ranking or group admission
//! - bind a placed group in two phases and post one event per binding
//! - post a single failure event when a group fits nowhere
//!
//! # Architecture
//!
//! ```text
//! DecisionWorker (single task)
//!   ├── JobGrouper (pod → job group)
//!   └── Scheduler
//!         ├── ControlPlane (snapshot, bind, events)
//!         ├── fitsched-placement (decide)
//!         └── commit (reserve → bind → notify)
//! ```

pub mod commit;
pub mod error;
pub mod events;
pub mod grouping;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use commit::{CommitFailure, CommitReport, NotifyFailure, UnitFailure};
pub use error::{SchedulerError, SchedulerResult};
pub use grouping::JobGrouper;
pub use scheduler::{GroupOutcome, Scheduler, Snapshot};
pub use worker::DecisionWorker;
