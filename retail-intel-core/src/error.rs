//! Error types for retail-intel-core

use thiserror::Error;

/// Main error type for the retail-intel-core library
///
/// These errors stay inside the process. Anything that crosses the tool
/// boundary is converted to an error-shaped JSON payload first.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream data API returned something unusable
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Tool transport/session failure
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object returned by the tool server
    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Analysis session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Task graph whose dependencies cannot be scheduled
    #[error("invalid task graph: {0}")]
    TaskGraph(String),

    /// Tool name not registered on the server
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Result type alias for retail-intel-core
pub type Result<T> = std::result::Result<T, Error>;
