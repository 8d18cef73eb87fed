//! Read-only HTTP query API.
//!
//! Runs on its own thread with a blocking `tiny_http` server. Session state
//! comes from the coordinator, falling back to the store for sessions it no
//! longer holds; player statistics come from the store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fourfold_game::SessionId;
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server};

use crate::hub::HubHandle;
use crate::persistence::{PlayerStats, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to bind API to {addr}: {error}")]
    BindError { addr: SocketAddr, error: String },
}

/// What the request handlers read from.
#[derive(Clone)]
pub struct ApiState {
    pub hub: HubHandle,
    pub store: Arc<dyn SessionStore>,
    pub leaderboard_limit: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    leaderboard: Vec<PlayerStats>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type Reply = Response<std::io::Cursor<Vec<u8>>>;

/// HTTP server for the query API.
pub struct ApiServer {
    addr: SocketAddr,
    actual_port: Option<u16>,
    server: Option<Arc<Server>>,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            actual_port: None,
            server: None,
            handle: None,
        }
    }

    pub fn start(&mut self, state: ApiState) -> Result<(), ApiError> {
        let server = Server::http(self.addr).map_err(|e| ApiError::BindError {
            addr: self.addr,
            error: e.to_string(),
        })?;
        let server = Arc::new(server);

        let actual_port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(self.addr.port());
        self.actual_port = Some(actual_port);
        tracing::info!("Query API listening on port {actual_port}");

        let worker = server.clone();
        self.handle = Some(thread::spawn(move || Self::run_server(&worker, &state)));
        self.server = Some(server);
        Ok(())
    }

    /// Stop accepting requests and wait for the server thread.
    pub fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            server.unblock();
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("Query API thread panicked");
        }
    }

    pub fn actual_port(&self) -> u16 {
        self.actual_port.unwrap_or(self.addr.port())
    }

    fn run_server(server: &Server, state: &ApiState) {
        for request in server.incoming_requests() {
            let method = request.method().clone();
            let url = request.url().to_string();
            let response = Self::route(&method, &url, state);
            tracing::debug!("{method} {url} -> {}", response.status_code().0);
            if let Err(e) = request.respond(response) {
                tracing::warn!("Failed to answer {method} {url}: {e}");
            }
        }
        tracing::debug!("Query API stopped");
    }

    fn route(method: &Method, url: &str, state: &ApiState) -> Reply {
        if *method != Method::Get {
            return error_reply(404, "Not found");
        }
        let path = url.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match segments.as_slice() {
            ["health"] => json_reply(200, &HealthResponse { status: "healthy" }),
            ["api", "leaderboard"] => match state.store.leaderboard(state.leaderboard_limit) {
                Ok(leaderboard) => json_reply(200, &LeaderboardResponse { leaderboard }),
                Err(e) => store_failure(&e),
            },
            ["api", "player", name] if !name.is_empty() => {
                match state.store.player_stats(&percent_decode(name)) {
                    Ok(stats) => json_reply(200, &stats),
                    Err(e) => store_failure(&e),
                }
            }
            ["api", "game", id] if !id.is_empty() => Self::game(state, SessionId::from(*id)),
            _ => error_reply(404, "Not found"),
        }
    }

    fn game(state: &ApiState, id: SessionId) -> Reply {
        if let Some(view) = state.hub.blocking_session(id.clone()) {
            return json_reply(200, &view);
        }
        match state.store.session(&id) {
            Ok(Some(record)) => json_reply(200, &record),
            Ok(None) => error_reply(404, "Game not found"),
            Err(e) => store_failure(&e),
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn json_reply(status: u16, body: &impl Serialize) -> Reply {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_headers(Response::from_data(bytes).with_status_code(status)),
        Err(e) => {
            tracing::error!("Failed to serialize API response: {e}");
            with_headers(Response::from_data(br#"{"error":"Internal error"}"#.to_vec()))
                .with_status_code(500)
        }
    }
}

fn error_reply(status: u16, message: &str) -> Reply {
    json_reply(
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

fn store_failure(e: &dyn std::error::Error) -> Reply {
    tracing::error!("Store query failed: {e}");
    error_reply(500, &e.to_string())
}

fn with_headers(response: Reply) -> Reply {
    let mut response = response;
    for (name, value) in [
        ("Content-Type", "application/json"),
        ("Access-Control-Allow-Origin", "*"),
    ] {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}

/// Decode `%XX` escapes in a path segment. Malformed escapes are kept as is.
fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = segment.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
