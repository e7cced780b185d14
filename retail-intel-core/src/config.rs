//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/retail-intel/config.toml`, then
//! overridden by process environment (a `.env` file in the working directory
//! is loaded first).
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/retail-intel/` (~/.config/retail-intel/)
//! - Data: `$XDG_DATA_HOME/retail-intel/` (~/.local/share/retail-intel/)
//! - State/Logs: `$XDG_STATE_HOME/retail-intel/` (~/.local/state/retail-intel/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Tool server location (client side) and bind address (server side)
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM backing the specialist agents
    #[serde(default)]
    pub llm: LlmConfig,

    /// Upstream data API credentials
    #[serde(default)]
    pub apis: ApiConfig,

    /// Retry suppression for malformed tool calls
    #[serde(default)]
    pub guard: GuardConfig,

    /// Metrics sidecar tuning
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Crew execution
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tool server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the tool server, without the `/mcp` suffix
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Bind host for `retail-intel-server`
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port for `retail-intel-server`
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Timeout for one full tool session (initialize + call + close)
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            host: default_server_host(),
            port: default_server_port(),
            timeout_secs: default_server_timeout(),
        }
    }
}

impl ServerConfig {
    /// Full URL of the JSON-RPC endpoint
    pub fn endpoint(&self) -> String {
        format!("{}/mcp", self.url.trim_end_matches('/'))
    }
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_server_timeout() -> u64 {
    60
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Maximum tool-calling rounds per task before a final answer is forced
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_llm_model(),
            endpoint: None,
            api_key: None,
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Supported LLM providers
///
/// Both speak the chat-completions wire format with function calling.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    Ollama,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com",
            LlmProvider::Ollama => "http://localhost:11434",
        }
    }

    /// Whether this provider refuses requests without an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_iterations() -> usize {
    10
}

/// Upstream API credentials
///
/// Every field is optional: a missing credential degrades the matching
/// adapter to its synthetic payload instead of failing the run.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Alpha Vantage key (equity quotes)
    pub alpha_vantage_key: Option<String>,
    /// FRED key (macroeconomic series)
    pub fred_key: Option<String>,
    /// Google Cloud project billed for BigQuery jobs
    pub bigquery_project: Option<String>,
    /// OAuth access token for BigQuery
    pub bigquery_token: Option<String>,
    /// Timeout for a single upstream round trip
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            alpha_vantage_key: None,
            fred_key: None,
            bigquery_project: None,
            bigquery_token: None,
            upstream_timeout_secs: default_upstream_timeout(),
        }
    }
}

fn default_upstream_timeout() -> u64 {
    10
}

/// Retry suppression policy for the country/region tool
#[derive(Debug, Deserialize, Clone)]
pub struct GuardConfig {
    /// Attempts allowed per (caller, parameters) before the terminal error
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// Metrics sidecar configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    /// Server side: write a JSON snapshot every N API calls
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
    /// Number of recent API calls in the server summary
    #[serde(default = "default_recent_calls")]
    pub recent_calls: usize,
    /// Number of recent errors in the server summary
    #[serde(default = "default_recent_errors")]
    pub recent_errors: usize,
    /// Number of recent analysis sessions in the client summary
    #[serde(default = "default_recent_sessions")]
    pub recent_sessions: usize,
    /// Number of recent tool calls in the client summary
    #[serde(default = "default_recent_tool_calls")]
    pub recent_tool_calls: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            snapshot_every: default_snapshot_every(),
            recent_calls: default_recent_calls(),
            recent_errors: default_recent_errors(),
            recent_sessions: default_recent_sessions(),
            recent_tool_calls: default_recent_tool_calls(),
        }
    }
}

fn default_snapshot_every() -> u64 {
    10
}

fn default_recent_calls() -> usize {
    100
}

fn default_recent_errors() -> usize {
    50
}

fn default_recent_sessions() -> usize {
    10
}

fn default_recent_tool_calls() -> usize {
    50
}

/// How the five specialist tasks are scheduled
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Orchestration configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct OrchestrationConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for tracing output, line logs and metric snapshots
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path, then apply `.env` and
    /// process environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.drop_blank_credentials();

        Ok(config)
    }

    /// Treat blank credentials from the file as unset
    fn drop_blank_credentials(&mut self) {
        for value in [
            &mut self.llm.api_key,
            &mut self.apis.alpha_vantage_key,
            &mut self.apis.fred_key,
            &mut self.apis.bigquery_project,
            &mut self.apis.bigquery_token,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("MCP_URL") {
            self.server.url = url;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = get("ALPHA_VANTAGE_API_KEY") {
            self.apis.alpha_vantage_key = Some(key);
        }
        if let Some(key) = get("FRED_API_KEY") {
            self.apis.fred_key = Some(key);
        }
        if let Some(project) = get("GOOGLE_CLOUD_PROJECT") {
            self.apis.bigquery_project = Some(project);
        }
        if let Some(token) = get("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.apis.bigquery_token = Some(token);
        }
        if let Some(dir) = get("RETAIL_INTEL_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(dir));
        }
    }

    /// Directory holding line logs, tracing output and JSON snapshots
    pub fn log_dir(&self) -> PathBuf {
        self.logging.dir.clone().unwrap_or_else(Self::state_dir)
    }

    /// Client-side line logs and `client_metrics.json`
    pub fn client_log_dir(&self) -> PathBuf {
        self.log_dir().join("client")
    }

    /// Tool server line logs and `server_metrics.json`
    pub fn server_log_dir(&self) -> PathBuf {
        self.log_dir().join("server")
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/retail-intel/config.toml` (~/.config/retail-intel/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("retail-intel").join("config.toml")
    }

    /// Returns the data directory path (for the song catalog)
    ///
    /// `$XDG_DATA_HOME/retail-intel/` (~/.local/share/retail-intel/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("retail-intel")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/retail-intel/` (~/.local/state/retail-intel/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("retail-intel")
    }

    /// Returns the song catalog database path
    ///
    /// `$XDG_DATA_HOME/retail-intel/songs.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("songs.db")
    }
}
