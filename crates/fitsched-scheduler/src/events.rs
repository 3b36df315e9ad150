//! Scheduling event records.

use chrono::{DateTime, SecondsFormat, Utc};

use fitsched_core::{Event, EventSource, EventType, ObjectMeta, ObjectReference, Pod, SchedulerConfig};

pub const REASON_SCHEDULED: &str = "Scheduled";
pub const REASON_FAILED_SCHEDULING: &str = "FailedScheduling";

/// `Scheduled` event for a pod bound to `node`.
pub fn scheduled(config: &SchedulerConfig, pod: &Pod, node: &str, at: DateTime<Utc>) -> Event {
    let message = format!("Successfully assigned {} to {}", pod.name(), node);
    build(config, pod, REASON_SCHEDULED, EventType::Normal, message, at)
}

/// `FailedScheduling` event addressed to `pod`, one line per rejection reason.
pub fn failed_scheduling(config: &SchedulerConfig, pod: &Pod, reasons: &[String], at: DateTime<Utc>) -> Event {
    let mut message = format!("pod ({}) failed to fit in any node", pod.name());
    for reason in reasons {
        message.push('\n');
        message.push_str(reason);
    }
    build(config, pod, REASON_FAILED_SCHEDULING, EventType::Warning, message, at)
}

fn build(
    config: &SchedulerConfig,
    pod: &Pod,
    reason: &str,
    event_type: EventType,
    message: String,
    at: DateTime<Utc>,
) -> Event {
    let namespace = if pod.metadata.namespace.is_empty() {
        config.namespace.clone()
    } else {
        pod.metadata.namespace.clone()
    };
    let timestamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);

    Event {
        count: 1,
        message,
        metadata: ObjectMeta {
            generate_name: format!("{}-", pod.name()),
            ..Default::default()
        },
        reason: reason.to_string(),
        first_timestamp: timestamp.clone(),
        last_timestamp: timestamp,
        event_type,
        source: EventSource {
            component: config.event_component.clone(),
        },
        involved_object: ObjectReference {
            kind: "Pod".to_string(),
            name: pod.name().to_string(),
            namespace,
            uid: pod.uid().to_string(),
            ..Default::default()
        },
    }
}
