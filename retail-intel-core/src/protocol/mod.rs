//! Tool-calling protocol
//!
//! JSON-RPC 2.0 in the shape of the Model Context Protocol: `initialize`,
//! `tools/list`, `tools/call` and `ping`. The server side dispatches to the
//! tool adapters and is reachable over HTTP or stdio; the client side opens
//! one short-lived HTTP session per call.

pub mod client;
pub mod http;
pub mod jsonrpc;
pub mod server;
pub mod stdio;

pub use client::McpClient;
pub use jsonrpc::{CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::ToolServer;

/// Protocol revision spoken by both sides
pub const PROTOCOL_VERSION: &str = "2024-11-05";
