//! In-memory control plane for scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use fitsched_cluster::{ClusterError, ClusterResult, ControlPlane, PodFilter};
use fitsched_core::{
    Binding, Container, Event, Node, ObjectMeta, Pod, PodSpec, PodStatus, ResourceRequirements, SCHEDULER_NAME_ANNOTATION,
};

pub(crate) const SCHEDULER: &str = "hightower";

pub(crate) fn node(name: &str, cpu: &str, memory: &str) -> Node {
    let mut node = Node::default();
    node.metadata.name = name.to_string();
    node.status.allocatable = HashMap::from([
        ("cpu".to_string(), cpu.to_string()),
        ("memory".to_string(), memory.to_string()),
    ]);
    node
}

/// A pending or running pod for this scheduler with one container.
pub(crate) fn pod(name: &str, node_name: &str, cpu: &str, memory: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: name.to_string(),
            uid: format!("uid-{name}"),
            annotations: HashMap::from([(SCHEDULER_NAME_ANNOTATION.to_string(), SCHEDULER.to_string())]),
            ..Default::default()
        },
        spec: PodSpec {
            node_name: node_name.to_string(),
            containers: vec![Container {
                name: "main".to_string(),
                resources: ResourceRequirements {
                    requests: HashMap::from([
                        ("cpu".to_string(), cpu.to_string()),
                        ("memory".to_string(), memory.to_string()),
                    ]),
                    ..Default::default()
                },
            }],
            ..Default::default()
        },
        status: PodStatus {
            phase: if node_name.is_empty() { "Pending" } else { "Running" }.to_string(),
        },
    }
}

pub(crate) fn job_pod(name: &str, job: &str, cpu: &str, memory: &str) -> Pod {
    let mut pod = pod(name, "", cpu, memory);
    pod.metadata.labels.insert("job-name".to_string(), job.to_string());
    pod
}

/// Records bindings and events; a successful binding updates the pod so
/// later listings see it assigned.
#[derive(Default)]
pub(crate) struct FakeControlPlane {
    nodes: Mutex<Vec<Node>>,
    pods: Mutex<Vec<Pod>>,
    bindings: Mutex<Vec<Binding>>,
    events: Mutex<Vec<Event>>,
    failing_binds: Mutex<HashSet<String>>,
    events_fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    snapshot_calls: AtomicUsize,
}

impl FakeControlPlane {
    pub(crate) fn new(nodes: Vec<Node>, pods: Vec<Pod>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            pods: Mutex::new(pods),
            ..Default::default()
        }
    }

    pub(crate) fn add_node(&self, node: Node) {
        self.nodes.lock().unwrap().push(node);
    }

    pub(crate) fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    pub(crate) fn fail_bind(&self, pod: &str) {
        self.failing_binds.lock().unwrap().insert(pod.to_string());
    }

    pub(crate) fn fail_events(&self) {
        self.events_fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn node_lists(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        self.pause().await;
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn list_pods(&self, filter: PodFilter) -> ClusterResult<Vec<Pod>> {
        self.pause().await;
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|p| match filter {
                PodFilter::Active => !p.is_terminal(),
                PodFilter::Unscheduled => p.is_unscheduled(),
            })
            .cloned()
            .collect())
    }

    async fn bind(&self, binding: &Binding) -> ClusterResult<()> {
        self.pause().await;
        let name = &binding.metadata.name;
        if self.failing_binds.lock().unwrap().contains(name) {
            return Err(ClusterError::Status {
                uri: format!("/api/v1/namespaces/default/pods/{name}/binding/"),
                status: 409,
            });
        }
        if let Some(pod) = self.pods.lock().unwrap().iter_mut().find(|p| p.name() == name) {
            pod.spec.node_name = binding.target.name.clone();
            pod.status.phase = "Running".to_string();
        }
        self.bindings.lock().unwrap().push(binding.clone());
        Ok(())
    }

    async fn post_event(&self, event: &Event) -> ClusterResult<()> {
        if self.events_fail.load(Ordering::SeqCst) {
            return Err(ClusterError::Status {
                uri: "/api/v1/namespaces/default/events".to_string(),
                status: 500,
            });
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
