//! Decision worker: the one task that makes scheduling decisions.
//!
//! Discovered pods and periodic reconciles both funnel through this
//! worker, so at most one snapshot-decide-commit cycle runs at a time.

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fitsched_core::Pod;

use crate::error::SchedulerResult;
use crate::grouping::JobGrouper;
use crate::scheduler::{GroupOutcome, Scheduler};

pub struct DecisionWorker {
    scheduler: Scheduler,
    grouper: JobGrouper,
}

impl DecisionWorker {
    pub fn new(scheduler: Scheduler) -> Self {
        let grouper = JobGrouper::new(scheduler.config());
        Self { scheduler, grouper }
    }

    /// Decide the group `pod` belongs to.
    ///
    /// Returns `None` when the pod was already decided.
    pub async fn handle_discovered(&mut self, pod: Pod) -> SchedulerResult<Option<GroupOutcome>> {
        if self.grouper.is_decided(&pod) {
            debug!(pod = %pod.name(), "pod already decided, skipping");
            return Ok(None);
        }

        let unscheduled = self.scheduler.unscheduled_pods().await?;
        let group = self.grouper.group(pod, &unscheduled);
        self.decide(group).await.map(Some)
    }

    /// Reconsider every unscheduled pod for this scheduler.
    ///
    /// Returns the number of groups decided. A failed group is logged and
    /// the rest are still attempted.
    pub async fn reconcile(&mut self) -> SchedulerResult<usize> {
        let pending = self.scheduler.unscheduled_pods().await?;
        self.grouper.reset();

        let mut decided = 0;
        for pod in &pending {
            if self.grouper.is_decided(pod) {
                continue;
            }
            let group = self.grouper.group(pod.clone(), &pending);
            match self.decide(group).await {
                Ok(_) => decided += 1,
                Err(e) => warn!(pod = %pod.name(), error = %e, "reconcile decision failed"),
            }
        }

        debug!(pending = pending.len(), groups = decided, "reconcile finished");
        Ok(decided)
    }

    /// Consume discovered pods and reconcile on an interval until shutdown
    /// or until the discovery channel closes.
    pub async fn run(mut self, mut pods: mpsc::Receiver<Pod>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.scheduler.config().reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("decision worker started");

        loop {
            tokio::select! {
                next = pods.recv() => {
                    let Some(pod) = next else {
                        info!("discovery channel closed");
                        break;
                    };
                    if let Err(e) = self.handle_discovered(pod).await {
                        warn!(error = %e, retriable = e.is_retriable(), "scheduling decision failed");
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "reconcile failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("decision worker stopped");
    }

    async fn decide(&mut self, group: Vec<Pod>) -> SchedulerResult<GroupOutcome> {
        match self.scheduler.place_group(&group).await {
            Ok(outcome) => {
                log_outcome(&group, &outcome);
                self.grouper.mark_decided(&group);
                Ok(outcome)
            }
            Err(e) => {
                // Retriable failures stay undecided so the next event retries them.
                if !e.is_retriable() {
                    self.grouper.mark_decided(&group);
                }
                Err(e)
            }
        }
    }
}

fn log_outcome(group: &[Pod], outcome: &GroupOutcome) {
    let pod = group.first().map(Pod::name).unwrap_or_default();
    match outcome {
        GroupOutcome::Placed(report) if report.is_complete() => {
            info!(%pod, node = %report.node, bound = report.bound.len(), "group scheduled");
        }
        GroupOutcome::Placed(report) => {
            let failed: Vec<&str> = report.failed_pods().collect();
            warn!(%pod, node = %report.node, ?failed, "group partially scheduled");
        }
        GroupOutcome::Rejected { reasons, .. } => {
            info!(%pod, nodes = reasons.len(), "group unschedulable");
        }
    }
}
