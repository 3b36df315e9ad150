//! Control-plane client.
//!
//! `ControlPlane` is the seam the scheduler is written against; tests
//! substitute an in-memory implementation. `ApiClient` implements it
//! over plain HTTP/JSON with hyper, one deadline per call.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use fitsched_core::{Binding, Event, Node, NodeList, Pod, PodList, PodWatchEvent, SchedulerConfig};

use crate::error::{ClusterError, ClusterResult};

const NODES_PATH: &str = "/api/v1/nodes";
const PODS_PATH: &str = "/api/v1/pods";
const WATCH_PODS_PATH: &str = "/api/v1/watch/pods";

/// Which pods a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodFilter {
    /// Pods still holding capacity (not `Succeeded` or `Failed`).
    Active,
    /// Pods with no node assigned.
    Unscheduled,
}

impl PodFilter {
    pub fn field_selector(self) -> &'static str {
        match self {
            PodFilter::Active => "status.phase!=Succeeded,status.phase!=Failed",
            PodFilter::Unscheduled => "spec.nodeName=",
        }
    }
}

/// Operations the scheduler needs from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>>;

    async fn list_pods(&self, filter: PodFilter) -> ClusterResult<Vec<Pod>>;

    /// Commit a binding. The control plane rejects a second binding for an
    /// already-assigned pod; callers check assignment rather than retry.
    async fn bind(&self, binding: &Binding) -> ClusterResult<()>;

    async fn post_event(&self, event: &Event) -> ClusterResult<()>;
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// HTTP/JSON control-plane client.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    host: String,
    namespace: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &SchedulerConfig) -> Self {
        let http = Client::builder(TokioExecutor::new()).build_http();
        Self {
            http,
            host: config.api_host.clone(),
            namespace: config.namespace.clone(),
            timeout: config.request_timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Open the unscheduled pod watch stream.
    ///
    /// The deadline covers the response head only; the body stays open
    /// until the server ends it.
    pub async fn watch_unscheduled(&self) -> ClusterResult<WatchStream> {
        let uri = self.uri(WATCH_PODS_PATH, Some(PodFilter::Unscheduled.field_selector()))?;
        let req = self.request(Method::GET, &uri, None)?;
        let resp = tokio::time::timeout(self.timeout, self.http.request(req))
            .await
            .map_err(|_| ClusterError::Timeout {
                uri: uri.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| transport(&uri, e))?;

        if resp.status() != StatusCode::OK {
            return Err(ClusterError::Status {
                uri,
                status: resp.status().as_u16(),
            });
        }
        debug!(%uri, "watch stream opened");
        Ok(WatchStream::new(uri, resp.into_body()))
    }

    fn uri(&self, path: &str, field_selector: Option<&str>) -> ClusterResult<String> {
        let mut url = Url::parse(&format!("http://{}", self.host))
            .and_then(|base| base.join(path))
            .map_err(|e| ClusterError::Request(format!("invalid API address {}{path}: {e}", self.host)))?;
        if let Some(selector) = field_selector {
            url.query_pairs_mut().append_pair("fieldSelector", selector);
        }
        Ok(url.into())
    }

    fn request(&self, method: Method, uri: &str, body: Option<Vec<u8>>) -> ClusterResult<Request<Full<Bytes>>> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, "application/json, */*");
        let req = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body))),
            None => builder.body(Full::new(Bytes::new())),
        };
        req.map_err(|e| ClusterError::Request(e.to_string()))
    }

    /// Send a request and read the whole body under one deadline.
    async fn exchange(&self, req: Request<Full<Bytes>>) -> ClusterResult<(StatusCode, Bytes)> {
        let uri = req.uri().to_string();
        let call = async {
            let resp = self.http.request(req).await.map_err(|e| transport(&uri, e))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| transport(&uri, e))?
                .to_bytes();
            Ok::<_, ClusterError>((status, body))
        };
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ClusterError::Timeout {
                uri: uri.clone(),
                timeout: self.timeout,
            })?
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, field_selector: Option<&str>) -> ClusterResult<T> {
        let uri = self.uri(path, field_selector)?;
        let req = self.request(Method::GET, &uri, None)?;
        let (status, body) = self.exchange(req).await?;
        if !status.is_success() {
            return Err(ClusterError::Status {
                uri,
                status: status.as_u16(),
            });
        }
        serde_json::from_slice(&body).map_err(|source| ClusterError::Decode { uri, source })
    }

    async fn post_json<T: Serialize>(&self, path: &str, value: &T) -> ClusterResult<()> {
        let uri = self.uri(path, None)?;
        let body = serde_json::to_vec(value).map_err(|e| ClusterError::Request(e.to_string()))?;
        let req = self.request(Method::POST, &uri, Some(body))?;
        let (status, _) = self.exchange(req).await?;
        if status != StatusCode::CREATED {
            return Err(ClusterError::Status {
                uri,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        let list: NodeList = self.get_json(NODES_PATH, None).await?;
        Ok(list.items)
    }

    async fn list_pods(&self, filter: PodFilter) -> ClusterResult<Vec<Pod>> {
        let list: PodList = self.get_json(PODS_PATH, Some(filter.field_selector())).await?;
        Ok(list.items)
    }

    async fn bind(&self, binding: &Binding) -> ClusterResult<()> {
        let path = format!(
            "/api/v1/namespaces/{}/pods/{}/binding/",
            self.namespace, binding.metadata.name
        );
        self.post_json(&path, binding).await
    }

    async fn post_event(&self, event: &Event) -> ClusterResult<()> {
        let path = format!("/api/v1/namespaces/{}/events", self.namespace);
        self.post_json(&path, event).await
    }
}

/// Incremental decoder over a watch response body.
///
/// Records are JSON objects, normally one per line; any whitespace
/// between them is accepted and records may span body frames.
pub struct WatchStream {
    uri: String,
    body: Incoming,
    buf: Vec<u8>,
}

impl WatchStream {
    fn new(uri: String, body: Incoming) -> Self {
        Self {
            uri,
            body,
            buf: Vec::new(),
        }
    }

    /// Next watch record, or `None` once the server closes the stream.
    pub async fn next_event(&mut self) -> ClusterResult<Option<PodWatchEvent>> {
        loop {
            if let Some(event) = self.decode_buffered()? {
                return Ok(Some(event));
            }

            match self.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.buf.extend_from_slice(&data);
                    }
                }
                Some(Err(e)) => return Err(transport(&self.uri, e)),
                None if self.buf.iter().all(u8::is_ascii_whitespace) => return Ok(None),
                None => {
                    // Trailing bytes that never formed a full record.
                    let result = serde_json::from_slice::<PodWatchEvent>(&self.buf);
                    self.buf.clear();
                    return result.map(Some).map_err(|source| ClusterError::Decode {
                        uri: self.uri.clone(),
                        source,
                    });
                }
            }
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn decode_buffered(&mut self) -> ClusterResult<Option<PodWatchEvent>> {
        let next = {
            let mut records = serde_json::Deserializer::from_slice(&self.buf).into_iter::<PodWatchEvent>();
            records
                .next()
                .map(|record| record.map(|event| (event, records.byte_offset())))
        };

        match next {
            Some(Ok((event, consumed))) => {
                self.buf.drain(..consumed);
                Ok(Some(event))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(source)) => {
                self.buf.clear();
                Err(ClusterError::Decode {
                    uri: self.uri.clone(),
                    source,
                })
            }
            None => {
                self.buf.clear();
                Ok(None)
            }
        }
    }
}

fn transport(uri: &str, err: impl std::fmt::Display) -> ClusterError {
    ClusterError::Transport {
        uri: uri.to_string(),
        message: err.to_string(),
    }
}
