//! HTTP transport for the tool server
//!
//! `POST /mcp` carries one JSON-RPC message per request. `initialize` opens a
//! session whose id is returned in the `Mcp-Session-Id` header. Every later
//! request must carry a known id, and `DELETE /mcp` closes it. Sessions hold
//! no state beyond their id and are not expired, so clients close what they
//! open. `GET /health` is a liveness check reporting the open session count.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR};
use super::server::{ToolServer, SERVER_NAME};
use crate::error::Result;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;

pub const SESSION_HEADER: &str = "mcp-session-id";

pub struct AppState {
    server: Arc<ToolServer>,
    sessions: Mutex<HashSet<String>>,
}

impl AppState {
    fn sessions(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn router(server: Arc<ToolServer>) -> Router {
    let state = Arc::new(AppState {
        server,
        sessions: Mutex::new(HashSet::new()),
    });

    Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: &str, server: Arc<ToolServer>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, server).await
}

/// Serve on an already bound listener until Ctrl-C
pub async fn serve_listener(listener: TcpListener, server: Arc<ToolServer>) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "Tool server listening");
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Tool server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn rpc_error(status: StatusCode, code: i64, message: &str) -> Response {
    (status, Json(JsonRpcResponse::error(Value::Null, code, message))).into_response()
}

async fn handle_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                PARSE_ERROR,
                &format!("Parse error: {}", e),
            )
        }
    };

    let opens_session = request.method == "initialize";
    if !opens_session {
        match session_id(&headers) {
            None => {
                return rpc_error(StatusCode::BAD_REQUEST, INVALID_REQUEST, "Missing session id")
            }
            Some(id) if !state.sessions().contains(&id) => {
                return rpc_error(StatusCode::NOT_FOUND, INVALID_REQUEST, "Session not found")
            }
            Some(_) => {}
        }
    }

    let new_session = opens_session.then(|| {
        let id = uuid::Uuid::new_v4().simple().to_string();
        state.sessions().insert(id.clone());
        tracing::debug!(session_id = %id, "session opened");
        id
    });

    match state.server.handle(request).await {
        None => StatusCode::ACCEPTED.into_response(),
        Some(response) => {
            let mut http = Json(response).into_response();
            if let Some(id) = new_session {
                if let Ok(value) = HeaderValue::from_str(&id) {
                    http.headers_mut().insert(SESSION_HEADER, value);
                }
            }
            http
        }
    }
}

async fn handle_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> StatusCode {
    match session_id(&headers) {
        None => StatusCode::BAD_REQUEST,
        Some(id) => {
            if state.sessions().remove(&id) {
                tracing::debug!(session_id = %id, "session closed");
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            }
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server": SERVER_NAME,
        "open_sessions": state.sessions().len(),
    }))
}
