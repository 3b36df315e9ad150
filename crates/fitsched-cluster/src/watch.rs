//! Unscheduled pod watcher: background task that never stops discovering work.
//!
//! The watcher holds a watch stream open against the control plane and
//! forwards every newly added pod addressed to this scheduler. Errors go
//! out on a separate channel and the stream is reopened after a delay
//! that doubles on each failed connection, up to a cap, and resets once
//! a connection succeeds. Only the shutdown signal ends the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fitsched_core::{Pod, SchedulerConfig};

use crate::client::ApiClient;
use crate::error::ClusterError;

const POD_QUEUE: usize = 64;
const ERROR_QUEUE: usize = 16;

/// Receiving side of a running watcher.
pub struct WatchHandle {
    pub pods: mpsc::Receiver<Pod>,
    pub errors: mpsc::Receiver<ClusterError>,
    pub task: JoinHandle<()>,
}

pub struct PodWatcher {
    client: Arc<ApiClient>,
    scheduler_name: String,
    backoff: Duration,
    max_backoff: Duration,
}

impl PodWatcher {
    pub fn new(client: Arc<ApiClient>, config: &SchedulerConfig) -> Self {
        Self {
            client,
            scheduler_name: config.scheduler_name.clone(),
            backoff: config.watch_backoff,
            max_backoff: config.max_watch_backoff,
        }
    }

    /// Start the watch loop on the runtime.
    ///
    /// The loop ends when `shutdown` flips or the pod receiver is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> WatchHandle {
        let (pods_tx, pods) = mpsc::channel(POD_QUEUE);
        let (errors_tx, errors) = mpsc::channel(ERROR_QUEUE);
        let task = tokio::spawn(async move {
            self.run(pods_tx, errors_tx, shutdown).await;
        });
        WatchHandle { pods, errors, task }
    }

    async fn run(
        self,
        pods_tx: mpsc::Sender<Pod>,
        errors_tx: mpsc::Sender<ClusterError>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(api = %self.client.host(), scheduler = %self.scheduler_name, "pod watcher started");
        let mut delay = self.backoff;

        loop {
            let outcome = tokio::select! {
                outcome = self.stream_once(&pods_tx) => outcome,
                _ = shutdown.changed() => break,
            };

            let (err, wait) = match outcome {
                StreamOutcome::ReceiverGone => break,
                StreamOutcome::ConnectFailed(err) => {
                    let wait = delay;
                    delay = (delay * 2).min(self.max_backoff);
                    (err, wait)
                }
                StreamOutcome::Interrupted(err) => {
                    delay = self.backoff;
                    (err, delay)
                }
            };

            debug!(error = %err, retry_in = ?wait, "pod watch interrupted, reconnecting");
            report(&errors_tx, err);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("pod watcher stopped");
    }

    /// Open one stream and forward its pods until it fails or ends.
    async fn stream_once(&self, pods_tx: &mpsc::Sender<Pod>) -> StreamOutcome {
        let mut stream = match self.client.watch_unscheduled().await {
            Ok(stream) => stream,
            Err(err) => return StreamOutcome::ConnectFailed(err),
        };

        loop {
            let event = match stream.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return StreamOutcome::Interrupted(ClusterError::StreamEnded {
                        uri: stream.uri().to_string(),
                    });
                }
                Err(err) => return StreamOutcome::Interrupted(err),
            };

            if event.event_type != "ADDED" {
                continue;
            }
            let pod = event.object;
            if !pod.is_unscheduled() || !pod.wants_scheduler(&self.scheduler_name) {
                debug!(pod = %pod.name(), "ignoring pod for another scheduler");
                continue;
            }

            debug!(pod = %pod.name(), "unscheduled pod discovered");
            if pods_tx.send(pod).await.is_err() {
                return StreamOutcome::ReceiverGone;
            }
        }
    }
}

enum StreamOutcome {
    /// The stream could not be opened.
    ConnectFailed(ClusterError),
    /// The stream opened and later failed or ended.
    Interrupted(ClusterError),
    ReceiverGone,
}

/// Queue `err` for the consumer. A full or closed queue drops it with a
/// warning; returns whether it was queued.
fn report(errors_tx: &mpsc::Sender<ClusterError>, err: ClusterError) -> bool {
    match errors_tx.try_send(err) {
        Ok(()) => true,
        Err(TrySendError::Full(err)) => {
            warn!(error = %err, "watch error queue full, dropping error");
            false
        }
        Err(TrySendError::Closed(err)) => {
            warn!(error = %err, "watch error receiver gone, dropping error");
            false
        }
    }
}
