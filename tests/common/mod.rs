//! A canned-response HTTP server for exercising the REST clients.
//!
//! Routes are matched on method and path (query string ignored). Each route
//! serves its responses in order and repeats the last one. Every request is
//! recorded so tests can assert on what the client sent.

// Each test binary compiles this module on its own and uses a different subset.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Request target including any query string.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
}

impl StubResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

impl IntoResponse for StubResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).expect("invalid stub status");
        if self.body.is_empty() {
            status.into_response()
        } else {
            (status, [(CONTENT_TYPE, "application/json")], self.body).into_response()
        }
    }
}

struct Route {
    method: Method,
    path: String,
    responses: VecDeque<StubResponse>,
}

#[derive(Default)]
struct StubState {
    routes: Vec<Route>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<StubState>>;

pub struct StubServer {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let addr = listener.local_addr().unwrap();
        let state = SharedState::default();

        let app = Router::new().fallback(respond).with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register a route, or queue one more response on an existing route.
    pub fn route(&self, method: &str, path: &str, response: StubResponse) -> &Self {
        let method = Method::from_bytes(method.as_bytes()).expect("invalid method");
        let mut state = self.state.lock().unwrap();
        match state
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => route.responses.push_back(response),
            None => state.routes.push(Route {
                method,
                path: path.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path() == path)
            .collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StubResponse {
    let mut state = state.lock().unwrap();
    let path = uri.path().to_string();

    let response = state
        .routes
        .iter_mut()
        .find(|r| r.method == method && r.path == path)
        .map(|route| {
            if route.responses.len() > 1 {
                route.responses.pop_front().unwrap()
            } else {
                route.responses[0].clone()
            }
        })
        .unwrap_or_else(|| StubResponse {
            status: 404,
            body: format!("no route for {method} {path}"),
        });

    state.requests.push(RecordedRequest {
        method: method.to_string(),
        target: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or(path),
        headers,
        body,
    });
    response
}

/// Client that never goes through a proxy configured in the environment.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
