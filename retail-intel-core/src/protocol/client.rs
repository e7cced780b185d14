//! Client transport for the remote tool server
//!
//! Every tool call runs in its own short-lived session:
//! `initialize`, the `notifications/initialized` notification, exactly one
//! `tools/call`, then `DELETE` to close the session whatever the outcome.
//! Failures never escape as errors; the caller receives
//! `"Error calling {tool}: {reason}"` instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Map, Value};

use super::http::SESSION_HEADER;
use super::jsonrpc::{CallToolResult, JsonRpcRequest, JsonRpcResponse};
use super::PROTOCOL_VERSION;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::ClientMetrics;

/// Maximum characters of an HTTP error body kept in messages
const ERROR_BODY_LIMIT: usize = 200;

/// One HTTP exchange with the server
struct Exchange {
    session_id: Option<String>,
    response: Option<JsonRpcResponse>,
}

/// HTTP client for the tool server
pub struct McpClient {
    endpoint: String,
    http_client: reqwest::Client,
    metrics: Arc<ClientMetrics>,
    next_id: AtomicU64,
}

impl McpClient {
    /// Create a client for the JSON-RPC endpoint at `endpoint`
    ///
    /// `timeout` bounds each HTTP request of a session.
    pub fn new(endpoint: impl Into<String>, timeout: Duration, metrics: Arc<ClientMetrics>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );

        // Sessions are never reused, and each blocking call runs on its own
        // runtime, so idle connections must not outlive a call.
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
            metrics,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &Config, metrics: Arc<ClientMetrics>) -> Result<Self> {
        Self::new(
            config.server.endpoint(),
            Duration::from_secs(config.server.timeout_secs),
            metrics,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn metrics(&self) -> &Arc<ClientMetrics> {
        &self.metrics
    }

    /// Call a remote tool and return its first text block
    pub async fn call_tool(&self, tool_name: &str, arguments: Map<String, Value>) -> String {
        let start = Instant::now();
        let outcome = self.call_in_session(tool_name, arguments).await;
        let latency = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(text) => {
                self.metrics.track_mcp_call(tool_name, latency, true, None);
                text
            }
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "tool call failed");
                self.metrics
                    .track_mcp_call(tool_name, latency, false, Some(e.to_string()));
                format!("Error calling {}: {}", tool_name, e)
            }
        }
    }

    /// Blocking form of [`call_tool`](Self::call_tool)
    ///
    /// Drives the call on a fresh current-thread runtime. Must not be called
    /// from inside an async context.
    pub fn call_tool_blocking(&self, tool_name: &str, arguments: Map<String, Value>) -> String {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.call_tool(tool_name, arguments)),
            Err(e) => {
                let message = format!("failed to create runtime: {}", e);
                self.metrics
                    .track_mcp_call(tool_name, 0.0, false, Some(message.clone()));
                format!("Error calling {}: {}", tool_name, message)
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call_in_session(&self, tool_name: &str, arguments: Map<String, Value>) -> Result<String> {
        let initialize = JsonRpcRequest::new(
            self.next_id(),
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "retail-intel",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );
        let opened = self.send(None, &initialize).await?;
        let session_id = opened.session_id;

        let outcome = self
            .call_once(session_id.as_deref(), opened.response, tool_name, arguments)
            .await;

        if let Some(id) = session_id.as_deref() {
            self.close(id).await;
        }

        outcome
    }

    async fn call_once(
        &self,
        session_id: Option<&str>,
        initialized: Option<JsonRpcResponse>,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String> {
        expect_result(initialized)?;

        let notification = JsonRpcRequest::notification("notifications/initialized");
        self.send(session_id, &notification).await?;

        let call = JsonRpcRequest::new(
            self.next_id(),
            "tools/call",
            Some(json!({ "name": tool_name, "arguments": arguments })),
        );
        let exchange = self.send(session_id, &call).await?;
        let result = expect_result(exchange.response)?;
        Ok(first_text(result))
    }

    async fn send(&self, session_id: Option<&str>, message: &JsonRpcRequest) -> Result<Exchange> {
        let mut request = self.http_client.post(&self.endpoint).json(message);
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(Error::Transport(format!("HTTP {}: {}", status, snippet)));
        }

        if message.is_notification() || body.trim().is_empty() {
            return Ok(Exchange {
                session_id,
                response: None,
            });
        }

        let response = parse_body(&body, is_event_stream, message.id.as_ref())?;
        Ok(Exchange {
            session_id,
            response: Some(response),
        })
    }

    async fn close(&self, session_id: &str) {
        let result = self
            .http_client
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session_id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(session_id, error = %e, "session close failed");
        }
    }
}

/// Parse a JSON or server-sent-events body into the response for `id`
fn parse_body(body: &str, is_event_stream: bool, id: Option<&Value>) -> Result<JsonRpcResponse> {
    let trimmed = body.trim_start();
    let looks_like_events = trimmed.starts_with("data:") || trimmed.starts_with("event:");

    if !is_event_stream && !looks_like_events {
        return Ok(serde_json::from_str(body)?);
    }

    let normalized = body.replace("\r\n", "\n");
    for event in normalized.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if data.is_empty() {
            continue;
        }
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&data.join("\n")) {
            if id.map_or(true, |id| &response.id == id) {
                return Ok(response);
            }
        }
    }

    Err(Error::Transport(
        "no matching response in event stream".to_string(),
    ))
}

fn expect_result(response: Option<JsonRpcResponse>) -> Result<Value> {
    let response =
        response.ok_or_else(|| Error::Transport("empty response from server".to_string()))?;
    if let Some(error) = response.error {
        return Err(Error::Protocol {
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| Error::Transport("response carried no result".to_string()))
}

/// First text block of a tool result, or the raw result JSON
fn first_text(result: Value) -> String {
    match serde_json::from_value::<CallToolResult>(result.clone()) {
        Ok(call) => match call.first_text() {
            Some(text) => text.to_string(),
            None => result.to_string(),
        },
        Err(_) => result.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use tempfile::TempDir;

    #[test]
    fn test_parse_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;
        let response = parse_body(body, false, Some(&json!(1))).unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[test]
    fn test_parse_event_stream_body() {
        let body = "event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\r\n\r\n\
                    event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"n\":2}}\r\n\r\n";
        let response = parse_body(body, true, Some(&json!(2))).unwrap();
        assert_eq!(response.result.unwrap()["n"], 2);

        let err = parse_body(body, true, Some(&json!(9))).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_protocol_error_surfaces() {
        let response = JsonRpcResponse::error(json!(1), -32601, "Method not found: x");
        let err = expect_result(Some(response)).unwrap_err();
        assert_eq!(err.to_string(), "protocol error -32601: Method not found: x");
    }

    #[test]
    fn test_first_text_falls_back_to_raw_result() {
        let result = serde_json::to_value(CallToolResult::text("hello", false)).unwrap();
        assert_eq!(first_text(result), "hello");

        let empty = json!({"content": [], "isError": false});
        assert_eq!(first_text(empty.clone()), empty.to_string());
    }

    #[test]
    fn test_unreachable_server_becomes_error_string() {
        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(ClientMetrics::new(dir.path(), MetricsConfig::default()));
        let client = McpClient::new(
            "http://127.0.0.1:9/mcp",
            Duration::from_secs(2),
            metrics.clone(),
        )
        .unwrap();

        let text = client.call_tool_blocking("fred_api", Map::new());
        assert!(text.starts_with("Error calling fred_api: "), "{}", text);

        let data = metrics.snapshot();
        assert_eq!(data.total_mcp_calls, 1);
        assert!(!data.mcp_calls[0].success);
        assert!(data.mcp_calls[0].response_time_ms >= 0.0);
    }
}
