//! End-to-end tests across the tool boundary
//!
//! The tool server runs over a canned upstream, so no test reaches the
//! network beyond the loopback interface.

use retail_intel_core::agents::llm::Role;
use retail_intel_core::agents::{ChatMessage, ChatReply, Crew, FunctionSpec, LlmClient, TaskGraph, ToolCallRequest};
use retail_intel_core::config::{ApiConfig, ExecutionMode, MetricsConfig};
use retail_intel_core::metrics::SessionStatus;
use retail_intel_core::protocol::{http, stdio, McpClient, ToolServer};
use retail_intel_core::toolbox::RetryPolicy;
use retail_intel_core::tools::CannedUpstream;
use retail_intel_core::{AnalysisOutcome, ClientMetrics, RetailAnalyst, ServerMetrics, ToolBox, ToolContext};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn products() -> Value {
    json!([
        {"id": 1, "title": "Backpack", "price": 109.95, "category": "men's clothing"},
        {"id": 2, "title": "Monitor", "price": 999.99, "category": "electronics"},
        {"id": 3, "title": "Ring", "price": 9.99, "category": "jewelery"}
    ])
}

fn countries() -> Value {
    json!([
        {
            "name": {"common": "Brazil"},
            "region": "Americas",
            "subregion": "South America",
            "population": 212559409,
            "area": 8515767.0,
            "capital": ["Brasília"]
        }
    ])
}

fn tool_server(dir: &TempDir) -> (Arc<ToolServer>, Arc<ServerMetrics>) {
    let upstream = CannedUpstream::new()
        .with_route("https://fakestoreapi.com/products", products())
        .with_route("https://restcountries.com/v3.1", countries());
    let metrics = Arc::new(ServerMetrics::new(
        &dir.path().join("server"),
        MetricsConfig::default(),
    ));
    let ctx = ToolContext::new(
        Arc::new(upstream),
        ApiConfig::default(),
        metrics.clone(),
        dir.path().join("server"),
    );
    (Arc::new(ToolServer::new(Arc::new(ctx))), metrics)
}

/// Serve the tool server on a loopback port from a background thread
fn spawn_http(server: Arc<ToolServer>) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, http::router(server)).await.unwrap();
        });
    });

    format!("http://{}/mcp", addr)
}

/// Run a raw HTTP exchange against the server from a synchronous test
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn open_sessions(endpoint: &str) -> u64 {
    let url = endpoint.replace("/mcp", "/health");
    block_on(async {
        let health: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "ok");
        health["open_sessions"].as_u64().unwrap()
    })
}

fn toolbox(endpoint: &str, dir: &TempDir) -> Arc<ToolBox> {
    let metrics = Arc::new(ClientMetrics::new(
        &dir.path().join("client"),
        MetricsConfig::default(),
    ));
    let client = McpClient::new(endpoint, Duration::from_secs(10), metrics.clone()).unwrap();
    Arc::new(ToolBox::new(
        Arc::new(client),
        metrics,
        RetryPolicy::default(),
        dir.path().join("client"),
    ))
}

#[tokio::test]
async fn test_stdio_session_end_to_end() {
    retail_intel_core::logging::init_test();
    let dir = TempDir::new().unwrap();
    let (server, metrics) = tool_server(&dir);

    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "fake_store_api", "arguments": {}}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n");

    let mut output = Vec::new();
    stdio::run(
        &server,
        tokio::io::BufReader::new(input.as_bytes()),
        &mut output,
    )
    .await
    .unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // The notification gets no reply
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 5);

    let text = responses[2]["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["product_portfolio_metrics"]["total_products"], 3);

    assert_eq!(responses[3]["error"]["code"], -32601);

    let summary = metrics.summary();
    assert_eq!(summary.summary.total_api_calls, 1);
    assert_eq!(summary.tool_usage.get("fake_store_api"), Some(&1));
}

#[test]
fn test_http_round_trip_and_retry_guard() {
    let dir = TempDir::new().unwrap();
    let (server, server_metrics) = tool_server(&dir);
    let endpoint = spawn_http(server);
    let tools = toolbox(&endpoint, &dir);

    let products = tools.fake_store("", "Product & E-commerce Analyst");
    let payload: Value = serde_json::from_str(&products).unwrap();
    assert_eq!(payload["product_portfolio_metrics"]["total_products"], 3);

    for _ in 0..3 {
        let output = tools.rest_countries("Brazil", "", "Market Intelligence Analyst");
        assert!(!output.contains("Tool call limit exceeded"), "{}", output);
    }
    let refused = tools.rest_countries("Brazil", "", "Market Intelligence Analyst");
    let refused: Value = serde_json::from_str(&refused).unwrap();
    assert_eq!(refused["error"], true);
    assert!(refused["error_message"]
        .as_str()
        .unwrap()
        .contains("Tool call limit exceeded"));

    // The refused call never crossed the boundary
    let server_summary = server_metrics.summary();
    assert_eq!(server_summary.tool_usage.get("rest_countries_api"), Some(&3));
    assert_eq!(server_summary.tool_usage.get("fake_store_api"), Some(&1));

    let client_summary = tools.metrics().summary();
    assert_eq!(client_summary.summary.total_mcp_calls, 4);
    assert_eq!(client_summary.summary.total_tool_calls, 5);
    assert_eq!(client_summary.summary.failed_tool_calls, 1);
}

#[test]
fn test_http_sessions_closed_after_each_call() {
    let dir = TempDir::new().unwrap();
    let (server, _server_metrics) = tool_server(&dir);
    let endpoint = spawn_http(server);
    let tools = toolbox(&endpoint, &dir);
    assert_eq!(open_sessions(&endpoint), 0);

    let products = tools.fake_store("", "Product & E-commerce Analyst");
    assert!(!products.starts_with("Error calling"), "{}", products);
    assert_eq!(open_sessions(&endpoint), 0);

    let metrics = Arc::new(ClientMetrics::new(
        &dir.path().join("client"),
        MetricsConfig::default(),
    ));
    let client = McpClient::new(endpoint.as_str(), Duration::from_secs(10), metrics).unwrap();
    let output = client.call_tool_blocking("no_such_tool", Map::new());
    assert!(output.starts_with("Error calling no_such_tool"), "{}", output);
    assert_eq!(open_sessions(&endpoint), 0);
}

#[test]
fn test_http_requires_session_after_initialize() {
    let dir = TempDir::new().unwrap();
    let (server, server_metrics) = tool_server(&dir);
    let endpoint = spawn_http(server);

    block_on(async {
        let client = reqwest::Client::new();
        let call = json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call",
                          "params": {"name": "fake_store_api", "arguments": {}}});

        let missing = client.post(&endpoint).json(&call).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);

        let unknown = client
            .post(&endpoint)
            .header(http::SESSION_HEADER, "not-a-session")
            .json(&call)
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

        let opened = client
            .post(&endpoint)
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .send()
            .await
            .unwrap();
        assert!(opened.status().is_success());
        let session = opened.headers()[http::SESSION_HEADER]
            .to_str()
            .unwrap()
            .to_string();

        let answered: Value = client
            .post(&endpoint)
            .header(http::SESSION_HEADER, &session)
            .json(&call)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(answered["id"], 7);
        assert!(answered["result"]["content"][0]["text"].is_string());

        let closed = client
            .delete(&endpoint)
            .header(http::SESSION_HEADER, &session)
            .send()
            .await
            .unwrap();
        assert_eq!(closed.status(), reqwest::StatusCode::OK);
    });

    // Only the call inside the session reached the adapter
    assert_eq!(
        server_metrics.summary().tool_usage.get("fake_store_api"),
        Some(&1)
    );
    assert_eq!(open_sessions(&endpoint), 0);
}

#[test]
fn test_unreachable_server_yields_error_text() {
    let dir = TempDir::new().unwrap();
    let tools = toolbox("http://127.0.0.1:9/mcp", &dir);

    let output = tools.fred("GDP", "Retail", "Financial Analyst");
    assert!(output.starts_with("Error calling fred_api"), "{}", output);

    let summary = tools.metrics().summary();
    assert_eq!(summary.summary.failed_tool_calls, 1);
}

/// Each specialist fetches the product catalog once, then answers.
struct CatalogLlm;

impl CatalogLlm {
    fn speaker(messages: &[ChatMessage]) -> String {
        messages
            .first()
            .and_then(|m| m.content.as_deref())
            .and_then(|c| c.lines().next())
            .unwrap_or("You are someone.")
            .trim_start_matches("You are ")
            .trim_end_matches('.')
            .to_string()
    }
}

impl LlmClient for CatalogLlm {
    fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[FunctionSpec],
    ) -> retail_intel_core::Result<ChatReply> {
        let speaker = Self::speaker(messages);
        let after_tool = messages.last().map(|m| m.role) == Some(Role::Tool);

        if tools.is_empty() || after_tool {
            let body = format!("Findings from {}. ", speaker).repeat(12);
            return Ok(ChatReply::text(body));
        }

        Ok(ChatReply::calls(vec![ToolCallRequest::new(
            format!("call-{}", speaker.len()),
            "fake_store_api",
            &json!({"category": "", "agent_name": speaker}),
        )]))
    }
}

#[test]
fn test_full_analysis_over_http() {
    retail_intel_core::logging::init_test();
    let dir = TempDir::new().unwrap();
    let (server, server_metrics) = tool_server(&dir);
    let endpoint = spawn_http(server);
    let tools = toolbox(&endpoint, &dir);

    let crew = Crew::new(Arc::new(CatalogLlm), tools.clone(), ExecutionMode::Parallel, 5);
    let analyst = RetailAnalyst::new(crew, tools.clone());

    let outcome = analyst.analyze_retail_project("Open 20 grocery stores in Brazil");
    let report = match &outcome {
        AnalysisOutcome::Completed { report, task_outputs, .. } => {
            assert_eq!(task_outputs.len(), 6);
            report.clone()
        }
        AnalysisOutcome::Failed { message, .. } => panic!("analysis failed: {}", message),
    };
    assert!(report.contains("Project Analysis Coordinator"), "{}", report);

    assert_eq!(
        server_metrics.summary().tool_usage.get("fake_store_api"),
        Some(&5)
    );

    let summary = tools.metrics().summary();
    assert_eq!(summary.summary.total_analyses, 1);
    assert_eq!(summary.summary.total_tool_calls, 5);
    let session = summary.recent_sessions.last().unwrap();
    assert_eq!(session.session_id, outcome.session_id());
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.tool_calls.len(), 5);
    assert_eq!(session.agents_used.len(), 5);

    let snapshot = dir.path().join("client").join("client_metrics.json");
    assert!(snapshot.exists());
}

#[test]
fn test_kickoff_rejects_invalid_graph() {
    let dir = TempDir::new().unwrap();
    let tools = toolbox("http://127.0.0.1:9/mcp", &dir);
    let crew = Crew::new(Arc::new(CatalogLlm), tools, ExecutionMode::Sequential, 3);

    assert!(crew.kickoff(&TaskGraph::new(Vec::new())).is_err());
}
