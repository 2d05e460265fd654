//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use failover_proxy::config::ProxyConfig;
use failover_proxy::lifecycle::Shutdown;
use failover_proxy::{FailoverMachine, HttpServer};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by a mock upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Scripted reply of a mock upstream.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, &'static str),
    /// 200 whose body arrives in several chunks.
    Stream(Vec<&'static str>),
    /// 200 whose chunks are each preceded by `Duration` of silence.
    SlowStream(Vec<&'static str>, Duration),
    /// Status and body, sent only after `Duration`.
    Delayed(Duration, u16, &'static str),
}

#[derive(Clone)]
struct MockState {
    name: &'static str,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
}

/// Mock upstream on an ephemeral port. Replies come from the script, then
/// default to 200 with `{"served_by": <name>}`.
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockUpstream {
    pub async fn start(name: &'static str) -> Self {
        let state = MockState {
            name,
            recorded: Arc::default(),
            replies: Arc::default(),
        };
        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn reply(&self, reply: Reply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.recorded.lock().unwrap().clone()
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.recorded.lock().unwrap().push(Recorded {
        method,
        path: uri.path_and_query().map(|p| p.as_str().to_string()).unwrap_or_default(),
        headers,
        body,
    });

    let reply = state.replies.lock().unwrap().pop_front();
    let (status, body) = match reply {
        Some(Reply::Status(status, body)) => (status, Body::from(body)),
        Some(Reply::Delayed(delay, status, body)) => {
            tokio::time::sleep(delay).await;
            (status, Body::from(body))
        }
        Some(Reply::SlowStream(chunks, gap)) => {
            let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
                tokio::time::sleep(gap).await;
                Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))
            });
            (200, Body::from_stream(stream))
        }
        Some(Reply::Stream(chunks)) => {
            let stream = futures_util::stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))),
            );
            (200, Body::from_stream(stream))
        }
        None => (200, Body::from(format!("{{\"served_by\":\"{}\"}}", state.name))),
    };

    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header("content-type", "application/json")
        .header("x-served-by", state.name)
        .body(body)
        .unwrap()
}

/// Forward HTTP proxy on an ephemeral port. Records the absolute-form target
/// of every request it relays.
pub struct MockRelay {
    pub addr: SocketAddr,
    targets: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct RelayState {
    targets: Arc<Mutex<Vec<String>>>,
    client: reqwest::Client,
}

impl MockRelay {
    pub async fn start() -> Self {
        let state = RelayState {
            targets: Arc::default(),
            client: client(),
        };
        let targets = state.targets.clone();
        let app = Router::new().fallback(forward).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, targets }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

async fn forward(
    State(state): State<RelayState>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = uri.to_string();
    state.targets.lock().unwrap().push(target.clone());

    headers.remove("proxy-connection");
    headers.remove("connection");
    let upstream = state
        .client
        .request(method, target)
        .headers(headers)
        .body(body)
        .send()
        .await
        .unwrap();

    let mut response = Response::builder().status(upstream.status());
    for (name, value) in upstream.headers() {
        if name != "transfer-encoding" && name != "connection" {
            response = response.header(name, value);
        }
    }
    response.body(Body::from(upstream.bytes().await.unwrap())).unwrap()
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Proxy config pointing at local plain-HTTP upstreams.
pub fn proxy_config(primary_port: u16, backup_port: Option<u16>, state_dir: &Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();

    config.primary.scheme = "http".into();
    config.primary.host = "127.0.0.1".into();
    config.primary.port = primary_port;
    config.primary.oauth_token = "sho_token".into();

    if let Some(port) = backup_port {
        config.backup.scheme = "http".into();
        config.backup.host = "127.0.0.1".into();
        config.backup.port = port;
        config.backup.api_key = "sk-backup".into();
        config.backup.model = "backup-model".into();
    }

    config.failover.state_file = state_dir.join("brain-state.json").display().to_string();
    config.timeouts.attempt_secs = Some(5);
    config
}

/// A proxy running in the background.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub failover: Arc<FailoverMachine>,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig) -> Self {
        let server = HttpServer::new(&config).unwrap();
        let failover = server.failover().clone();

        let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let stopped = shutdown.subscribe();
        let handle = tokio::spawn(server.run(listener, stopped));

        Self {
            addr,
            failover,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger graceful shutdown and wait for the final state flush.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
