/*!
Stub of the upstream node-list endpoint

Serves `GET /nodes` on an ephemeral local port. Tests script what the next
fetch answers: a node batch, an error status or a raw body.
*/

use crate::test_utils::StubNode;
use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum Reply {
    Nodes(Vec<StubNode>),
    Status(u16),
    Raw(String),
}

#[derive(Clone)]
struct StubState {
    reply: Arc<Mutex<Reply>>,
    requests: Arc<AtomicUsize>,
}

/// Running stub server, stopped when dropped.
pub struct StubSource {
    addr: SocketAddr,
    state: StubState,
    handle: JoinHandle<()>,
}

impl StubSource {
    /// Binds 127.0.0.1 on a free port and starts serving an empty batch.
    pub async fn start() -> Result<Self> {
        let state = StubState {
            reply: Arc::new(Mutex::new(Reply::Nodes(Vec::new()))),
            requests: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new().route("/nodes", get(serve_nodes)).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[stub] server stopped: {}", e);
            }
        });
        log::info!("🛰️ [stub] node source listening on {}", addr);

        Ok(Self { addr, state, handle })
    }

    /// Full URL of the node-list endpoint.
    pub fn url(&self) -> String {
        format!("http://{}/nodes", self.addr)
    }

    pub fn set_nodes(&self, nodes: Vec<StubNode>) {
        log::info!("[stub] serving {} nodes", nodes.len());
        self.set(Reply::Nodes(nodes));
    }

    /// Every following fetch answers `status` with a plain-text body.
    pub fn fail_with(&self, status: u16) {
        self.set(Reply::Status(status));
    }

    /// Every following fetch answers 200 with `body` verbatim.
    pub fn serve_raw(&self, body: impl Into<String>) {
        self.set(Reply::Raw(body.into()));
    }

    /// Number of fetches served so far.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    fn set(&self, reply: Reply) {
        match self.state.reply.lock() {
            Ok(mut guard) => *guard = reply,
            Err(poisoned) => *poisoned.into_inner() = reply,
        }
    }
}

impl Drop for StubSource {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_nodes(State(state): State<StubState>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let reply = match state.reply.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };

    match reply {
        Reply::Nodes(nodes) => Json(nodes).into_response(),
        Reply::Status(code) => {
            let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (code, "stub failure").into_response()
        }
        Reply::Raw(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
    }
}
