//! Transport-independent request dispatcher for the tool server

use super::jsonrpc::{
    CallToolResult, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use super::PROTOCOL_VERSION;
use crate::error::Error;
use crate::tools::{ToolCall, ToolContext, ToolKind};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const SERVER_NAME: &str = "retail-analysis";

const INSTRUCTIONS: &str = "Retail analysis tool server. Tools return JSON text; failures come back \
     as JSON with \"error\": true and an \"error_message\". Call one tool at a time.";

/// Dispatches JSON-RPC requests to the tool adapters
pub struct ToolServer {
    tools: Arc<ToolContext>,
}

impl ToolServer {
    pub fn new(tools: Arc<ToolContext>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &Arc<ToolContext> {
        &self.tools
    }

    /// Handle one request. Notifications produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    /// Handle one raw message, returning the serialized response if any
    pub async fn handle_text(&self, text: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonRpcRequest>(text) {
            Ok(request) => self.handle(request).await?,
            Err(e) => JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)),
        };
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                None
            }
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                },
                "instructions": INSTRUCTIONS
            }),
        )
    }

    fn handle_list_tools(&self, id: Value) -> JsonRpcResponse {
        let tools: Vec<Value> = ToolKind::ALL
            .iter()
            .map(|kind| {
                json!({
                    "name": kind.name(),
                    "description": kind.description(),
                    "inputSchema": kind.input_schema(),
                })
            })
            .collect();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        let tool_name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name"),
        };

        let kind = match ToolKind::from_name(tool_name) {
            Some(kind) => kind,
            None => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    Error::UnknownTool(tool_name.to_string()).to_string(),
                )
            }
        };

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    "Invalid arguments: expected an object",
                )
            }
        };

        self.tools.metrics().track_tool_call(kind.name(), &arguments);

        let result = match ToolCall::parse(kind, &arguments) {
            Ok(call) => CallToolResult::text(self.tools.run(call).await, false),
            Err(validation) => {
                tracing::warn!(tool = kind.name(), "argument validation failed");
                CallToolResult::text(validation, true)
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, super::jsonrpc::INTERNAL_ERROR, e.to_string()),
        }
    }
}
