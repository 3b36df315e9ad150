//! Control-plane client tests against a mock API server.
//!
//! Each test starts an axum router on an ephemeral port that mimics the
//! endpoints the scheduler uses and records what it receives.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::sync::watch;

use fitsched_cluster::{ApiClient, ClusterError, ControlPlane, PodFilter, PodWatcher};
use fitsched_core::{Binding, Event, EventSource, EventType, ObjectMeta, ObjectReference, SchedulerConfig};

#[derive(Clone, Default)]
struct Recorded {
    selectors: Arc<Mutex<Vec<String>>>,
    bindings: Arc<Mutex<Vec<(String, Value)>>>,
    events: Arc<Mutex<Vec<Value>>>,
    watch_calls: Arc<Mutex<u32>>,
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> SchedulerConfig {
    SchedulerConfig {
        api_host: addr.to_string(),
        request_timeout: Duration::from_secs(2),
        watch_backoff: Duration::from_millis(50),
        max_watch_backoff: Duration::from_millis(200),
        ..Default::default()
    }
}

fn watch_body() -> String {
    let records = [
        json!({"type": "ADDED", "object": {
            "metadata": {"name": "ours", "annotations": {"scheduler.alpha.kubernetes.io/name": "hightower"}},
            "spec": {"containers": []}
        }}),
        json!({"type": "MODIFIED", "object": {
            "metadata": {"name": "ours-modified", "annotations": {"scheduler.alpha.kubernetes.io/name": "hightower"}}
        }}),
        json!({"type": "ADDED", "object": {
            "metadata": {"name": "theirs", "annotations": {"scheduler.alpha.kubernetes.io/name": "default"}}
        }}),
        json!({"type": "ADDED", "object": {
            "metadata": {"name": "already-bound", "annotations": {"scheduler.alpha.kubernetes.io/name": "hightower"}},
            "spec": {"nodeName": "node-a"}
        }}),
    ];
    records.iter().map(|r| format!("{r}\n")).collect()
}

fn added(name: &str) -> String {
    json!({"type": "ADDED", "object": {
        "metadata": {"name": name, "annotations": {"scheduler.alpha.kubernetes.io/name": "hightower"}}
    }})
    .to_string()
}

/// A response body sent as separate frames, with a pause before each.
fn chunked(chunks: Vec<String>) -> Body {
    let frames = futures_util::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, std::io::Error>(chunk)
    });
    Body::from_stream(frames)
}

/// Serves the same chunked watch body on every connection.
fn chunked_watch(chunks: Vec<String>, recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/api/v1/watch/pods",
            get(move |State(rec): State<Recorded>| {
                let chunks = chunks.clone();
                async move {
                    *rec.watch_calls.lock().unwrap() += 1;
                    chunked(chunks)
                }
            }),
        )
        .with_state(recorded)
}

fn mock_api(recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/api/v1/nodes",
            get(|| async {
                Json(json!({"items": [
                    {"metadata": {"name": "node-a"}, "status": {"allocatable": {"cpu": "2", "memory": "4Gi"}}},
                    {"metadata": {"name": "node-b"}, "status": {"allocatable": {"cpu": "1", "memory": "2Gi"}}}
                ]}))
            }),
        )
        .route(
            "/api/v1/pods",
            get(
                |State(rec): State<Recorded>, Query(q): Query<HashMap<String, String>>| async move {
                    rec.selectors
                        .lock()
                        .unwrap()
                        .push(q.get("fieldSelector").cloned().unwrap_or_default());
                    Json(json!({"items": [
                        {"metadata": {"name": "web-0"}, "spec": {"nodeName": "node-a"}, "status": {"phase": "Running"}}
                    ]}))
                },
            ),
        )
        .route(
            "/api/v1/namespaces/{ns}/pods/{name}/binding/",
            post(
                |State(rec): State<Recorded>, Path((_ns, name)): Path<(String, String)>, Json(body): Json<Value>| async move {
                    rec.bindings.lock().unwrap().push((name, body));
                    StatusCode::CREATED
                },
            ),
        )
        .route(
            "/api/v1/namespaces/{ns}/events",
            post(|State(rec): State<Recorded>, Json(body): Json<Value>| async move {
                rec.events.lock().unwrap().push(body);
                StatusCode::CREATED
            }),
        )
        .route(
            "/api/v1/watch/pods",
            get(|State(rec): State<Recorded>| async move {
                *rec.watch_calls.lock().unwrap() += 1;
                watch_body()
            }),
        )
        .with_state(recorded)
}

fn sample_event() -> Event {
    Event {
        count: 1,
        message: "Successfully assigned web-0 to node-a".to_string(),
        metadata: ObjectMeta {
            generate_name: "web-0-".to_string(),
            ..Default::default()
        },
        reason: "Scheduled".to_string(),
        first_timestamp: "2024-01-01T00:00:00Z".to_string(),
        last_timestamp: "2024-01-01T00:00:00Z".to_string(),
        event_type: EventType::Normal,
        source: EventSource {
            component: "hightower-scheduler".to_string(),
        },
        involved_object: ObjectReference {
            kind: "Pod".to_string(),
            name: "web-0".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn lists_nodes() {
    let addr = serve(mock_api(Recorded::default())).await;
    let client = ApiClient::new(&config(addr));

    let nodes = client.list_nodes().await.unwrap();
    let names: Vec<_> = nodes.iter().map(|n| n.name()).collect();
    assert_eq!(names, ["node-a", "node-b"]);
    assert_eq!(nodes[0].allocatable("memory"), Some("4Gi"));
}

#[tokio::test]
async fn lists_pods_with_field_selector() {
    let recorded = Recorded::default();
    let addr = serve(mock_api(recorded.clone())).await;
    let client = ApiClient::new(&config(addr));

    let pods = client.list_pods(PodFilter::Active).await.unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].node_name(), Some("node-a"));

    client.list_pods(PodFilter::Unscheduled).await.unwrap();

    let selectors = recorded.selectors.lock().unwrap().clone();
    assert_eq!(
        selectors,
        ["status.phase!=Succeeded,status.phase!=Failed", "spec.nodeName="]
    );
}

#[tokio::test]
async fn bind_posts_binding_object() {
    let recorded = Recorded::default();
    let addr = serve(mock_api(recorded.clone())).await;
    let client = ApiClient::new(&config(addr));

    client.bind(&Binding::new("web-0", "node-b")).await.unwrap();

    let bindings = recorded.bindings.lock().unwrap().clone();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].0, "web-0");
    assert_eq!(bindings[0].1["kind"], "Binding");
    assert_eq!(bindings[0].1["target"]["name"], "node-b");
}

#[tokio::test]
async fn posts_events() {
    let recorded = Recorded::default();
    let addr = serve(mock_api(recorded.clone())).await;
    let client = ApiClient::new(&config(addr));

    client.post_event(&sample_event()).await.unwrap();

    let events = recorded.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["reason"], "Scheduled");
    assert_eq!(events[0]["involvedObject"]["name"], "web-0");
}

#[tokio::test]
async fn non_created_status_is_an_error() {
    let router = Router::new().route(
        "/api/v1/namespaces/{ns}/pods/{name}/binding/",
        post(|| async { StatusCode::CONFLICT }),
    );
    let addr = serve(router).await;
    let client = ApiClient::new(&config(addr));

    let err = client.bind(&Binding::new("web-0", "node-a")).await.unwrap_err();
    assert!(matches!(err, ClusterError::Status { status: 409, .. }));
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn malformed_listing_is_a_decode_error() {
    let router = Router::new().route("/api/v1/nodes", get(|| async { "not json" }));
    let addr = serve(router).await;
    let client = ApiClient::new(&config(addr));

    let err = client.list_nodes().await.unwrap_err();
    assert!(matches!(err, ClusterError::Decode { .. }));
}

#[tokio::test]
async fn slow_server_times_out() {
    let router = Router::new().route(
        "/api/v1/nodes",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({"items": []}))
        }),
    );
    let addr = serve(router).await;
    let mut cfg = config(addr);
    cfg.request_timeout = Duration::from_millis(100);
    let client = ApiClient::new(&cfg);

    let err = client.list_nodes().await.unwrap_err();
    assert!(matches!(err, ClusterError::Timeout { .. }));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = ApiClient::new(&config(addr));

    let err = client.list_nodes().await.unwrap_err();
    assert!(matches!(err, ClusterError::Transport { .. }));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn watcher_forwards_only_added_pods_for_this_scheduler() {
    let recorded = Recorded::default();
    let addr = serve(mock_api(recorded.clone())).await;
    let cfg = config(addr);
    let client = Arc::new(ApiClient::new(&cfg));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handle = PodWatcher::new(client, &cfg).spawn(shutdown_rx);

    let pod = tokio::time::timeout(Duration::from_secs(2), handle.pods.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pod.name(), "ours");

    // The mock ends every stream; the watcher reports it and reconnects.
    let err = tokio::time::timeout(Duration::from_secs(2), handle.errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, ClusterError::StreamEnded { .. }));

    let again = tokio::time::timeout(Duration::from_secs(2), handle.pods.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.name(), "ours");
    assert!(*recorded.watch_calls.lock().unwrap() >= 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn watcher_keeps_retrying_failed_connections() {
    let router = Router::new().route(
        "/api/v1/watch/pods",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let addr = serve(router).await;
    let cfg = config(addr);
    let client = Arc::new(ApiClient::new(&cfg));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handle = PodWatcher::new(client, &cfg).spawn(shutdown_rx);

    for _ in 0..3 {
        let err = tokio::time::timeout(Duration::from_secs(2), handle.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, ClusterError::Status { status: 503, .. }));
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn watch_record_split_across_frames() {
    let record = added("split-0");
    let (head, tail) = record.split_at(record.len() / 2);
    let chunks = vec![head.to_string(), format!("{tail}\n")];
    let addr = serve(chunked_watch(chunks, Recorded::default())).await;
    let client = ApiClient::new(&config(addr));

    let mut stream = client.watch_unscheduled().await.unwrap();
    let event = stream.next_event().await.unwrap().unwrap();
    assert_eq!(event.event_type, "ADDED");
    assert_eq!(event.object.name(), "split-0");
    assert!(stream.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn several_watch_records_in_one_frame() {
    let chunks = vec![format!("{}\n{}\n{}\n", added("a"), added("b"), added("c"))];
    let addr = serve(chunked_watch(chunks, Recorded::default())).await;
    let client = ApiClient::new(&config(addr));

    let mut stream = client.watch_unscheduled().await.unwrap();
    let mut names = Vec::new();
    while let Some(event) = stream.next_event().await.unwrap() {
        names.push(event.object.name().to_string());
    }
    assert_eq!(names, ["a", "b", "c"]);
}

#[tokio::test]
async fn malformed_watch_record_is_a_decode_error() {
    let chunks = vec![
        format!("{}\n", added("good-0")),
        "{\"type\": nope}\n".to_string(),
        format!("{}\n", added("never-read")),
    ];
    let addr = serve(chunked_watch(chunks, Recorded::default())).await;
    let client = ApiClient::new(&config(addr));

    let mut stream = client.watch_unscheduled().await.unwrap();
    let event = stream.next_event().await.unwrap().unwrap();
    assert_eq!(event.object.name(), "good-0");

    let err = stream.next_event().await.unwrap_err();
    assert!(matches!(err, ClusterError::Decode { .. }));
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn watcher_reconnects_after_a_malformed_record() {
    let recorded = Recorded::default();
    let chunks = vec![format!("{}\n", added("good-0")), "{\"type\": nope}\n".to_string()];
    let addr = serve(chunked_watch(chunks, recorded.clone())).await;
    let cfg = config(addr);
    let client = Arc::new(ApiClient::new(&cfg));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handle = PodWatcher::new(client, &cfg).spawn(shutdown_rx);

    let pod = tokio::time::timeout(Duration::from_secs(2), handle.pods.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pod.name(), "good-0");

    let err = tokio::time::timeout(Duration::from_secs(2), handle.errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, ClusterError::Decode { .. }));

    let again = tokio::time::timeout(Duration::from_secs(2), handle.pods.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.name(), "good-0");
    assert!(*recorded.watch_calls.lock().unwrap() >= 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.task)
        .await
        .unwrap()
        .unwrap();
}
