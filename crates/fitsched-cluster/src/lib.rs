//! fitsched cluster access: everything that talks to the control plane.
//!
//! # Components
//!
//! - **`client`**: `ControlPlane` trait and its HTTP/JSON implementation
//! - **`watch`**: Long-lived unscheduled pod watcher with reconnect backoff
//!
//! None of this makes scheduling decisions; it only moves API objects.

pub mod client;
pub mod error;
pub mod watch;

pub use client::{ApiClient, ControlPlane, PodFilter, WatchStream};
pub use error::{ClusterError, ClusterResult};
pub use watch::{PodWatcher, WatchHandle};
