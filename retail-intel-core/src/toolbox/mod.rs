//! Agent-facing tool wrappers
//!
//! The [`ToolBox`] is what analysis agents call. Each wrapper normalizes its
//! parameters, forwards the call to the tool server through a
//! [`ToolTransport`], writes the input and outcome to the tool's line log and
//! to the calling agent's line log, and records exactly one
//! [`ToolCallRecord`] per call.

pub mod guard;

pub use guard::{Admission, CallKey, RetryGuard, RetryPolicy};

use crate::config::Config;
use crate::error::Result;
use crate::linelog::LineLog;
use crate::metrics::{params, ClientMetrics, ToolCallRecord};
use crate::protocol::McpClient;
use crate::tools::ToolKind;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Maximum characters of the project name shown in agent logs
const PROJECT_NAME_LIMIT: usize = 100;

/// Maximum characters of a query kept in logged inputs
const QUERY_LOG_LIMIT: usize = 200;

const SEPARATOR_WIDTH: usize = 80;

const VALIDATION_KEYWORDS: [&str; 3] = ["validation error", "field required", "missing"];

const BOTH_PARAMS_NOTE: &str =
    "Both 'country' and 'region' parameters must be explicitly provided (use empty string '' if not needed)";

/// Something that can run a remote tool and hand back its text output
///
/// Implementations never fail; errors come back as text.
pub trait ToolTransport: Send + Sync {
    fn call(&self, tool_name: &str, arguments: Map<String, Value>) -> String;
}

impl ToolTransport for McpClient {
    fn call(&self, tool_name: &str, arguments: Map<String, Value>) -> String {
        self.call_tool_blocking(tool_name, arguments)
    }
}

/// Line log file for an agent, chosen from keywords in its role name
pub fn agent_log_file(agent_name: &str) -> &'static str {
    let name = agent_name.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| name.contains(w));

    if has(&["operations", "supply chain"]) {
        "operations_agent.log"
    } else if has(&["customer", "marketing"]) {
        "customer_analytics_agent.log"
    } else if has(&["financial", "sales"]) {
        "financial_agent.log"
    } else if has(&["market", "intelligence", "research"]) {
        "market_intelligence_agent.log"
    } else if has(&["product", "ecommerce", "e-commerce"]) {
        "product_ecommerce_agent.log"
    } else {
        "operations_agent.log"
    }
}

/// Tool wrappers shared by every agent of an analysis
pub struct ToolBox {
    transport: Arc<dyn ToolTransport>,
    metrics: Arc<ClientMetrics>,
    guard: RetryGuard,
    log_dir: PathBuf,
    project_name: Mutex<String>,
    session_id: Mutex<Option<String>>,
    show_tool_data: AtomicBool,
}

impl ToolBox {
    pub fn new(
        transport: Arc<dyn ToolTransport>,
        metrics: Arc<ClientMetrics>,
        policy: RetryPolicy,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            transport,
            metrics,
            guard: RetryGuard::new(policy),
            log_dir,
            project_name: Mutex::new("Unknown Project".to_string()),
            session_id: Mutex::new(None),
            show_tool_data: AtomicBool::new(false),
        }
    }

    /// Tool box talking to the configured tool server over HTTP
    pub fn from_config(config: &Config, metrics: Arc<ClientMetrics>) -> Result<Self> {
        let client = McpClient::from_config(config, metrics.clone())?;
        Ok(Self::new(
            Arc::new(client),
            metrics,
            RetryPolicy::from_config(&config.guard),
            config.client_log_dir(),
        ))
    }

    pub fn metrics(&self) -> &Arc<ClientMetrics> {
        &self.metrics
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Project name written to agent logs, cut to 100 characters
    pub fn set_project_name(&self, name: &str) {
        let name = if name.chars().count() > PROJECT_NAME_LIMIT {
            let head: String = name.chars().take(PROJECT_NAME_LIMIT).collect();
            format!("{}...", head)
        } else {
            name.to_string()
        };
        *self
            .project_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = name;
    }

    pub fn project_name(&self) -> String {
        self.project_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Session that subsequent tool call records are attached to
    pub fn set_session(&self, session_id: Option<String>) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = session_id;
    }

    fn session(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Echo tool inputs and outputs on stdout
    pub fn set_show_tool_data(&self, show: bool) {
        self.show_tool_data.store(show, Ordering::Relaxed);
    }

    pub fn bigquery(&self, query: &str, agent: &str) -> String {
        let start = Instant::now();
        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!(query));

        let output = self.transport.call(ToolKind::BigQuery.name(), arguments);

        let logged_query = truncate(query, QUERY_LOG_LIMIT);
        self.finish(
            ToolKind::BigQuery,
            agent,
            json!({ "query": logged_query }),
            output,
            start,
        )
    }

    /// Country/region lookup, guarded against identical retries
    pub fn rest_countries(&self, country: &str, region: &str, agent: &str) -> String {
        let start = Instant::now();
        let input = json!({ "country": country, "region": region });

        let admission = self.guard.admit(CallKey::new(agent, &[country, region]));
        if let Admission::Exhausted { attempts } = admission {
            tracing::warn!(agent, country, region, attempts, "rest countries call limit exceeded");
            let output = json!({
                "error": true,
                "error_message": "Tool call limit exceeded. Please check your parameters and try a different approach.",
                "note": BOTH_PARAMS_NOTE,
            });
            return self.finish(ToolKind::RestCountries, agent, input, output.to_string(), start);
        }

        // Both keys always go out; blank means unset.
        let mut arguments = Map::new();
        arguments.insert("country".to_string(), json!(blank_to_empty(country)));
        arguments.insert("region".to_string(), json!(blank_to_empty(region)));

        let output = self.transport.call(ToolKind::RestCountries.name(), arguments);
        let output = explain_validation_failure(output);

        self.finish(ToolKind::RestCountries, agent, input, output, start)
    }

    pub fn alpha_vantage(&self, stock_symbol: &str, agent: &str) -> String {
        let start = Instant::now();
        let arguments = optional_arguments(&[("stock_symbol", stock_symbol)]);
        let output = self.transport.call(ToolKind::AlphaVantage.name(), arguments);
        self.finish(
            ToolKind::AlphaVantage,
            agent,
            json!({ "stock_symbol": stock_symbol }),
            output,
            start,
        )
    }

    pub fn fred(&self, series_id: &str, industry: &str, agent: &str) -> String {
        let start = Instant::now();
        let arguments = optional_arguments(&[("series_id", series_id), ("industry", industry)]);
        let output = self.transport.call(ToolKind::Fred.name(), arguments);
        self.finish(
            ToolKind::Fred,
            agent,
            json!({ "series_id": series_id, "industry": industry }),
            output,
            start,
        )
    }

    pub fn fake_store(&self, category: &str, agent: &str) -> String {
        let start = Instant::now();
        let arguments = optional_arguments(&[("category", category)]);
        let output = self.transport.call(ToolKind::FakeStore.name(), arguments);
        self.finish(
            ToolKind::FakeStore,
            agent,
            json!({ "category": category }),
            output,
            start,
        )
    }

    /// Dispatch a call by tool kind with loosely-typed arguments
    ///
    /// Missing string arguments are treated as empty.
    pub fn invoke(&self, kind: ToolKind, arguments: &Map<String, Value>, agent: &str) -> String {
        let arg = |key: &str| {
            arguments
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        match kind {
            ToolKind::BigQuery => self.bigquery(&arg("query"), agent),
            ToolKind::RestCountries => self.rest_countries(&arg("country"), &arg("region"), agent),
            ToolKind::AlphaVantage => self.alpha_vantage(&arg("stock_symbol"), agent),
            ToolKind::Fred => self.fred(&arg("series_id"), &arg("industry"), agent),
            ToolKind::FakeStore => self.fake_store(&arg("category"), agent),
        }
    }

    /// Log the call, record it, and hand the output back
    fn finish(&self, kind: ToolKind, agent: &str, input: Value, output: String, start: Instant) -> String {
        let latency = start.elapsed().as_secs_f64() * 1000.0;
        self.log_tool_data(kind, agent, &input, &output);

        let parameters = match input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let session = self.session();
        let mut record = ToolCallRecord::new(kind.display_name(), agent, parameters)
            .with_session(session.as_deref())
            .with_latency(latency);
        if let Some(message) = failure_message(&output) {
            record = record.failed(message);
        }
        self.metrics.track_tool_call(record);

        output
    }

    fn log_tool_data(&self, kind: ToolKind, agent: &str, input: &Value, output: &str) {
        let input_text = pretty(input);
        let parsed: Option<Value> = serde_json::from_str(output).ok();
        let outcome = parsed.as_ref().map(|value| match error_of(value) {
            Some(message) => format!("ERROR: {}", message),
            None => "SUCCESS: Response received".to_string(),
        });
        let separator = "-".repeat(SEPARATOR_WIDTH);

        let tool_log = LineLog::in_dir(&self.log_dir, kind.log_file());
        tool_log.write(&format!("Input: {}", input_text));
        match &parsed {
            Some(value) => {
                tool_log.write(outcome.as_deref().unwrap_or_default());
                tool_log.write(&format!("Output: {}...", head(&pretty(value), 2000)));
            }
            None => tool_log.write(&format!("Output (raw): {}...", head(output, 1000))),
        }
        tool_log.write(&separator);

        let agent_log = LineLog::in_dir(&self.log_dir, agent_log_file(agent));
        agent_log.write(&format!("Project: {}", self.project_name()));
        agent_log.write(&format!("Tool Called: {}", kind.display_name()));
        agent_log.write(&format!("Input: {}", input_text));
        agent_log.write(
            outcome
                .as_deref()
                .unwrap_or("Response received (non-JSON)"),
        );
        agent_log.write(&separator);

        tracing::debug!(tool = kind.name(), agent, "tool data logged");

        if self.show_tool_data.load(Ordering::Relaxed) {
            let rule = "=".repeat(SEPARATOR_WIDTH);
            println!("\n{}", rule);
            println!("[TOOL DATA] {}", kind.display_name());
            println!("{}", rule);
            println!("Input: {}", input_text);
            match &parsed {
                Some(value) => println!("Output (JSON): {}...", head(&pretty(value), 2000)),
                None => println!("Output (raw): {}...", head(output, 1000)),
            }
            println!("{}\n", rule);
        }
    }
}

fn blank_to_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        ""
    } else {
        value
    }
}

/// Arguments with blank values left out
fn optional_arguments(pairs: &[(&str, &str)]) -> Map<String, Value> {
    let present = pairs
        .iter()
        .map(|(key, value)| (*key, Some(*value).filter(|v| !v.trim().is_empty())));
    params(present)
}

/// Rewrite schema validation failures into a payload that tells the agent how to fix the call
fn explain_validation_failure(output: String) -> String {
    let lowered = output.to_lowercase();
    if !VALIDATION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return output;
    }

    match serde_json::from_str::<Value>(&output) {
        Ok(Value::Object(map)) if map.contains_key("error") || map.contains_key("error_message") => {
            let original = map
                .get("error_message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string());
            json!({
                "error": true,
                "error_message": "Tool validation failed. Both 'country' and 'region' parameters must be provided (use empty string '' if not needed).",
                "suggestion": "When calling this tool, always provide both parameters: country='United States', region='' (or both as empty strings if querying all countries)",
                "original_error": original,
            })
            .to_string()
        }
        Ok(_) => output,
        Err(_) => json!({
            "error": true,
            "error_message": format!("Tool validation failed: {}", head(&output, 200)),
            "suggestion": "When calling REST Countries Tool, always provide both 'country' and 'region' parameters (use empty string '' if not needed)",
        })
        .to_string(),
    }
}

/// Error message of an error-shaped payload, if the payload is one
fn error_of(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    if !map.get("error").is_some_and(is_truthy) {
        return None;
    }
    Some(
        map.get("error_message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string(),
    )
}

/// Why a tool output counts as a failed call
fn failure_message(output: &str) -> Option<String> {
    if output.starts_with("Error calling ") {
        return Some(output.to_string());
    }
    serde_json::from_str::<Value>(output)
        .ok()
        .and_then(|value| error_of(&value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn head(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        format!("{}...", head(text, limit))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Transport that replays fixed outputs and remembers what it was asked
    #[derive(Default)]
    pub struct ScriptedTransport {
        outputs: Mutex<Vec<String>>,
        fallback: String,
        pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl ScriptedTransport {
        pub fn always(output: &str) -> Self {
            Self {
                fallback: output.to_string(),
                ..Self::default()
            }
        }

        pub fn then(self, output: &str) -> Self {
            self.outputs.lock().unwrap().push(output.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ToolTransport for ScriptedTransport {
        fn call(&self, tool_name: &str, arguments: Map<String, Value>) -> String {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments));
            let mut outputs = self.outputs.lock().unwrap();
            if outputs.is_empty() {
                self.fallback.clone()
            } else {
                outputs.remove(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use crate::config::MetricsConfig;
    use std::fs;
    use tempfile::TempDir;

    fn toolbox(transport: Arc<ScriptedTransport>, dir: &TempDir) -> ToolBox {
        let metrics = Arc::new(ClientMetrics::new(dir.path(), MetricsConfig::default()));
        ToolBox::new(
            transport,
            metrics,
            RetryPolicy::new(3),
            dir.path().to_path_buf(),
        )
    }

    #[test]
    fn test_agent_log_file_by_role() {
        assert_eq!(
            agent_log_file("Operations & Supply Chain Analyst"),
            "operations_agent.log"
        );
        assert_eq!(
            agent_log_file("Customer Analytics & Marketing Specialist"),
            "customer_analytics_agent.log"
        );
        assert_eq!(
            agent_log_file("Financial & Sales Performance Analyst"),
            "financial_agent.log"
        );
        assert_eq!(
            agent_log_file("Market Intelligence & Research Analyst"),
            "market_intelligence_agent.log"
        );
        assert_eq!(
            agent_log_file("Product & E-commerce Specialist"),
            "product_ecommerce_agent.log"
        );
        assert_eq!(agent_log_file("Unknown Agent"), "operations_agent.log");
    }

    #[test]
    fn test_fourth_identical_call_short_circuits() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::always(r#"{"filter":"Brazil"}"#));
        let tools = toolbox(transport.clone(), &dir);

        for _ in 0..3 {
            let out = tools.rest_countries("Brazil", "", "Operations Analyst");
            assert_eq!(out, r#"{"filter":"Brazil"}"#);
        }
        let out = tools.rest_countries("Brazil", "", "Operations Analyst");
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["error"], true);
        assert!(payload["error_message"]
            .as_str()
            .unwrap()
            .starts_with("Tool call limit exceeded"));
        assert_eq!(payload["note"], BOTH_PARAMS_NOTE);

        assert_eq!(transport.call_count(), 3);
        let data = tools.metrics().snapshot();
        assert_eq!(data.total_tool_calls, 4);
        assert_eq!(data.failed_tool_calls, 1);
    }

    #[test]
    fn test_rest_countries_always_sends_both_keys() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::always("{}"));
        let tools = toolbox(transport.clone(), &dir);

        tools.rest_countries("  ", "Europe", "Market Intelligence & Research Analyst");

        let calls = transport.calls.lock().unwrap();
        let (name, args) = &calls[0];
        assert_eq!(name, "rest_countries_api");
        assert_eq!(args["country"], "");
        assert_eq!(args["region"], "Europe");
    }

    #[test]
    fn test_validation_error_json_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let upstream = json!({
            "error": true,
            "error_message": "1 validation error for rest_countries_api\nregion\n  Field required"
        })
        .to_string();
        let transport = Arc::new(ScriptedTransport::always(&upstream));
        let tools = toolbox(transport, &dir);

        let out = tools.rest_countries("France", "", "a");
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["error"], true);
        assert!(payload["error_message"]
            .as_str()
            .unwrap()
            .starts_with("Tool validation failed. Both"));
        assert!(payload["original_error"]
            .as_str()
            .unwrap()
            .contains("Field required"));
        assert!(payload["suggestion"].is_string());
    }

    #[test]
    fn test_validation_error_text_is_wrapped() {
        let out = explain_validation_failure(
            "1 validation error for rest_countries_api\nregion\n  Field required".to_string(),
        );
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert!(payload["error_message"]
            .as_str()
            .unwrap()
            .starts_with("Tool validation failed: 1 validation error"));
    }

    #[test]
    fn test_keyword_in_successful_payload_is_left_alone() {
        let output = r#"{"countries":[{"name":"Missing Islands"}]}"#.to_string();
        assert_eq!(explain_validation_failure(output.clone()), output);
    }

    #[test]
    fn test_blank_optional_arguments_are_omitted() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::always("{}"));
        let tools = toolbox(transport.clone(), &dir);

        tools.fred("GDP", " ", "Financial & Sales Performance Analyst");
        tools.fake_store("", "Product & E-commerce Specialist");

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, "fred_api");
        assert_eq!(calls[0].1.get("series_id"), Some(&json!("GDP")));
        assert!(!calls[0].1.contains_key("industry"));
        assert_eq!(calls[1].0, "fake_store_api");
        assert!(calls[1].1.is_empty());
    }

    #[test]
    fn test_records_carry_session_and_success() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(
            ScriptedTransport::always("{}")
                .then(r#"{"error": true, "error_message": "no key"}"#)
                .then("Error calling fred_api: HTTP request failed"),
        );
        let tools = toolbox(transport, &dir);
        let session = tools.metrics().start_analysis_session("Store expansion");
        tools.set_session(Some(session.clone()));

        tools.alpha_vantage("WMT", "Financial & Sales Performance Analyst");
        tools.fred("", "", "Financial & Sales Performance Analyst");
        tools.fake_store("electronics", "Product & E-commerce Specialist");

        let data = tools.metrics().snapshot();
        assert_eq!(data.total_tool_calls, 3);
        assert_eq!(data.successful_tool_calls, 1);
        assert_eq!(data.tool_calls[0].error_message.as_deref(), Some("no key"));
        assert_eq!(data.tool_calls[0].tool_name, "Alpha Vantage Tool");
        assert!(data
            .tool_calls
            .iter()
            .all(|r| r.session_id.as_deref() == Some(session.as_str())));
        assert_eq!(data.analysis_sessions[0].tool_calls.len(), 3);
        assert_eq!(data.analysis_sessions[0].agents_used.len(), 2);
    }

    #[test]
    fn test_tool_and_agent_logs_written() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::always(
            r#"{"error": true, "error_message": "Query must use bigquery-public-data"}"#,
        ));
        let tools = toolbox(transport, &dir);
        tools.set_project_name(&"x".repeat(150));

        tools.bigquery("SELECT 1", "Customer Analytics & Marketing Specialist");

        let tool_log = fs::read_to_string(dir.path().join("bigquery.log")).unwrap();
        assert!(tool_log.contains("Input: {"));
        assert!(tool_log.contains("ERROR: Query must use bigquery-public-data"));
        assert!(tool_log.contains(&"-".repeat(80)));

        let agent_log =
            fs::read_to_string(dir.path().join("customer_analytics_agent.log")).unwrap();
        assert!(agent_log.contains(&format!("Project: {}...", "x".repeat(100))));
        assert!(agent_log.contains("Tool Called: BigQuery Tool"));
    }

    #[test]
    fn test_non_json_output_logged_raw() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::always("plain text"));
        let tools = toolbox(transport, &dir);

        tools.alpha_vantage("", "Financial & Sales Performance Analyst");

        let tool_log = fs::read_to_string(dir.path().join("alpha_vantage.log")).unwrap();
        assert!(tool_log.contains("Output (raw): plain text..."));
        let agent_log = fs::read_to_string(dir.path().join("financial_agent.log")).unwrap();
        assert!(agent_log.contains("Response received (non-JSON)"));
    }

    #[test]
    fn test_invoke_dispatches_by_kind() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::always("{}"));
        let tools = toolbox(transport.clone(), &dir);

        let args = json!({"country": "Japan"}).as_object().cloned().unwrap();
        tools.invoke(ToolKind::RestCountries, &args, "a");

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1["country"], "Japan");
        assert_eq!(calls[0].1["region"], "");
    }
}
