//! Control-plane API objects.
//!
//! These mirror the subset of the Kubernetes v1 API the scheduler reads
//! and writes. Everything is (de)serialized as camelCase JSON; fields the
//! API may omit default to empty values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Annotation naming the scheduler responsible for a pod.
pub const SCHEDULER_NAME_ANNOTATION: &str = "scheduler.alpha.kubernetes.io/name";

/// Resource key for CPU requests and allocatable capacity.
pub const RESOURCE_CPU: &str = "cpu";

/// Resource key for memory requests and allocatable capacity.
pub const RESOURCE_MEMORY: &str = "memory";

// ── Metadata ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

/// Reference to another API object (binding target, event subject).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

// ── Node ──────────────────────────────────────────────────────────

/// A machine in the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeStatus {
    /// Allocatable capacity as raw quantity strings, keyed by resource name.
    #[serde(default)]
    pub allocatable: HashMap<String, String>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Raw allocatable quantity for `resource`, if reported.
    pub fn allocatable(&self, resource: &str) -> Option<&str> {
        self.status.allocatable.get(resource).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

// ── Pod ───────────────────────────────────────────────────────────

/// A workload unit: one or more containers scheduled together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Assigned node. Empty while the pod is unscheduled.
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub scheduler_name: String,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub limits: HashMap<String, String>,
}

impl Container {
    /// Raw requested quantity for `resource`, if declared.
    pub fn request(&self, resource: &str) -> Option<&str> {
        self.resources.requests.get(resource).map(String::as_str)
    }
}

impl Pod {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    /// Assigned node, or `None` while unscheduled.
    pub fn node_name(&self) -> Option<&str> {
        if self.spec.node_name.is_empty() {
            None
        } else {
            Some(&self.spec.node_name)
        }
    }

    pub fn is_unscheduled(&self) -> bool {
        self.spec.node_name.is_empty()
    }

    /// Pods that finished (`Succeeded` / `Failed`) no longer hold capacity.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.phase.as_str(), "Succeeded" | "Failed")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Whether this pod asks to be scheduled by `scheduler_name`, either via
    /// the scheduler annotation or `spec.schedulerName`.
    pub fn wants_scheduler(&self, scheduler_name: &str) -> bool {
        self.metadata
            .annotations
            .get(SCHEDULER_NAME_ANNOTATION)
            .is_some_and(|n| n == scheduler_name)
            || self.spec.scheduler_name == scheduler_name
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

/// One record of the pod watch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodWatchEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub object: Pod,
}

// ── Binding ───────────────────────────────────────────────────────

/// Assigns a pod to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub target: ObjectReference,
}

impl Binding {
    pub fn new(pod_name: &str, node_name: &str) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Binding".to_string(),
            metadata: ObjectMeta {
                name: pod_name.to_string(),
                ..Default::default()
            },
            target: ObjectReference {
                api_version: "v1".to_string(),
                kind: "Node".to_string(),
                name: node_name.to_string(),
                ..Default::default()
            },
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────

/// Event severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventSource {
    #[serde(default)]
    pub component: String,
}

/// A scheduling notification. Written once, never read back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub count: u32,
    pub message: String,
    pub metadata: ObjectMeta,
    pub reason: String,
    pub first_timestamp: String,
    pub last_timestamp: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: EventSource,
    pub involved_object: ObjectReference,
}
