//! Cluster access error types.

use std::time::Duration;

use thiserror::Error;

/// Failures reaching or talking to the control plane.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("request to {uri} failed: {message}")]
    Transport { uri: String, message: String },

    #[error("{uri} returned unexpected status {status}")]
    Status { uri: String, status: u16 },

    #[error("request to {uri} timed out after {timeout:?}")]
    Timeout { uri: String, timeout: Duration },

    #[error("invalid response from {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid request: {0}")]
    Request(String),

    #[error("watch stream from {uri} ended")]
    StreamEnded { uri: String },
}

impl ClusterError {
    /// Whether repeating the same call later can succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            ClusterError::Transport { .. }
            | ClusterError::Timeout { .. }
            | ClusterError::StreamEnded { .. } => true,
            ClusterError::Status { status, .. } => *status >= 500 || *status == 429,
            ClusterError::Decode { .. } | ClusterError::Request(_) => false,
        }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
