//! Job grouping: expands a discovered pod into the group it belongs to.
//!
//! Pods sharing a value of the group label (`job-name` by default) are
//! admitted together. A pod without the label is a group of one.

use std::collections::HashSet;

use fitsched_core::{Pod, SchedulerConfig};

pub struct JobGrouper {
    label: String,
    /// Pods already decided since the last reset.
    decided: HashSet<String>,
}

impl JobGrouper {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            label: config.group_label.clone(),
            decided: HashSet::new(),
        }
    }

    /// The group for `trigger`: the trigger first, then every other
    /// undecided pod in `unscheduled` with the same label value, in
    /// listing order.
    pub fn group(&self, trigger: Pod, unscheduled: &[Pod]) -> Vec<Pod> {
        let Some(job) = trigger.label(&self.label).map(str::to_string) else {
            return vec![trigger];
        };
        let trigger_key = pod_key(&trigger);

        let mut group = vec![trigger];
        group.extend(
            unscheduled
                .iter()
                .filter(|p| p.label(&self.label) == Some(job.as_str()))
                .filter(|p| pod_key(p) != trigger_key && !self.is_decided(p))
                .cloned(),
        );
        group
    }

    pub fn is_decided(&self, pod: &Pod) -> bool {
        self.decided.contains(&pod_key(pod))
    }

    pub fn mark_decided(&mut self, units: &[Pod]) {
        self.decided.extend(units.iter().map(pod_key));
    }

    /// Forget every decision, so pods that are still unscheduled are
    /// considered again.
    pub fn reset(&mut self) {
        self.decided.clear();
    }

    pub fn decided(&self) -> usize {
        self.decided.len()
    }
}

fn pod_key(pod: &Pod) -> String {
    if pod.uid().is_empty() {
        format!("{}/{}", pod.metadata.namespace, pod.name())
    } else {
        pod.uid().to_string()
    }
}
