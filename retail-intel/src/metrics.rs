//! retail-intel-metrics - print the client and server metrics snapshots
//!
//! Reads `client_metrics.json` and `server_metrics.json` from the client and
//! server log directories and prints a dashboard. Missing snapshots are
//! reported, not treated as errors.

use anyhow::{Context, Result};
use clap::Parser;
use retail_intel_core::metrics::{
    ClientMetricsData, ClientSummary, ServerMetricsData, ServerSummary, SessionStatus,
    CLIENT_METRICS_JSON, SERVER_METRICS_JSON,
};
use retail_intel_core::Config;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

const WIDTH: usize = 80;

/// How many sessions and errors the dashboard lists
const RECENT: usize = 5;

#[derive(Parser)]
#[command(name = "retail-intel-metrics")]
#[command(about = "Show retail-intel client and server metrics")]
#[command(version)]
struct Args {
    /// Print the summaries as JSON instead of the dashboard
    #[arg(long)]
    json: bool,
}

fn heavy_rule() -> String {
    "=".repeat(WIDTH)
}

fn light_rule() -> String {
    "-".repeat(WIDTH)
}

/// Load a snapshot; `None` when it does not exist or cannot be parsed
fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from));
    match parsed {
        Ok(data) => Some(data),
        Err(e) => {
            println!("Error loading metrics from {}: {}", path.display(), e);
            None
        }
    }
}

fn section(title: &str) {
    println!("\n{}", title);
    println!("{}", light_rule());
}

fn title(title: &str) {
    println!("\n{}", heavy_rule());
    println!("{}", title);
    println!("{}", heavy_rule());
}

/// Entries sorted by count, highest first
fn by_count<V: Copy + Ord>(counts: &BTreeMap<String, V>) -> Vec<(&str, V)> {
    let mut entries: Vec<(&str, V)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn print_client(summary: &ClientSummary) {
    title("CLIENT METRICS");

    let totals = &summary.summary;
    section("SUMMARY");
    println!("  Start Time: {}", totals.start_time.to_rfc3339());
    println!("  Total Analyses: {}", totals.total_analyses);
    println!("  Total Tool Calls: {}", totals.total_tool_calls);
    println!("  Successful Tool Calls: {}", totals.successful_tool_calls);
    println!("  Failed Tool Calls: {}", totals.failed_tool_calls);
    println!(
        "  Tool Call Success Rate Percent: {:.2}",
        totals.tool_call_success_rate_percent
    );
    println!("  Total MCP Calls: {}", totals.total_mcp_calls);
    println!(
        "  Average MCP Response Time Ms: {:.2}",
        totals.average_mcp_response_time_ms
    );
    println!(
        "  Average Analysis Duration Seconds: {:.2}",
        totals.average_analysis_duration_seconds
    );

    section("TOOL USAGE");
    for (tool, count) in by_count(&summary.tool_usage) {
        println!("  {}: {} calls", tool, count);
    }

    section("AGENT ACTIVITY");
    for (agent, count) in by_count(&summary.agent_activity_summary) {
        println!("  {}: {} activities", agent, count);
    }

    if !summary.recent_sessions.is_empty() {
        section("RECENT ANALYSIS SESSIONS");
        let skip = summary.recent_sessions.len().saturating_sub(RECENT);
        for session in &summary.recent_sessions[skip..] {
            let marker = match session.status {
                SessionStatus::Completed => "[ok]",
                SessionStatus::Failed => "[failed]",
                SessionStatus::Started => "[running]",
            };
            let duration = session
                .duration_seconds
                .map(|d| format!("{:.2}s", d))
                .unwrap_or_else(|| "N/A".to_string());
            println!("  {} {}: {}", marker, session.session_id, duration);
            println!(
                "    Project: {}...",
                truncate(&session.project_description, 60)
            );
            println!("    Tools used: {}", session.tool_calls.len());
            println!("    Agents: {}", session.agents_used.join(", "));
        }
    }
}

fn print_server(summary: &ServerSummary) {
    title("SERVER METRICS");

    let totals = &summary.summary;
    section("SUMMARY");
    println!("  Start Time: {}", totals.start_time.to_rfc3339());
    println!("  Total API Calls: {}", totals.total_api_calls);
    println!("  Successful Calls: {}", totals.successful_calls);
    println!("  Failed Calls: {}", totals.failed_calls);
    println!("  Success Rate Percent: {:.2}", totals.success_rate_percent);

    section("TOOL USAGE");
    for (tool, count) in by_count(&summary.tool_usage) {
        println!("  {}: {} calls", tool, count);
    }

    section("API USAGE");
    for (api, count) in by_count(&summary.api_usage) {
        println!("  {}: {} calls", api, count);
    }

    section("AVERAGE RESPONSE TIMES");
    for (api, stats) in &summary.average_response_times {
        println!("  {}:", api);
        println!("    Average: {} ms", stats.avg_ms);
        println!("    Min: {} ms", stats.min_ms);
        println!("    Max: {} ms", stats.max_ms);
        println!("    Count: {}", stats.count);
    }

    if !summary.errors.is_empty() {
        section("RECENT ERRORS");
        let skip = summary.errors.len().saturating_sub(RECENT);
        for error in &summary.errors[skip..] {
            println!("  [{}] {}", error.timestamp.to_rfc3339(), error.api_name);
            println!("    Error: {}", truncate(&error.error_message, 100));
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let client_path = config.client_log_dir().join(CLIENT_METRICS_JSON);
    let server_path = config.server_log_dir().join(SERVER_METRICS_JSON);

    let client = load_snapshot::<ClientMetricsData>(&client_path)
        .map(|data| data.summary(&config.metrics));
    let server = load_snapshot::<ServerMetricsData>(&server_path)
        .map(|data| data.summary(&config.metrics));

    if args.json {
        let combined = serde_json::json!({
            "client": client,
            "server": server,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&combined).context("failed to encode summaries")?
        );
        return Ok(());
    }

    title("RETAIL INTELLIGENCE PLATFORM - METRICS DASHBOARD");

    match &client {
        Some(summary) => print_client(summary),
        None => println!("\nCLIENT METRICS: No metrics data available"),
    }

    match &server {
        Some(summary) => print_server(summary),
        None => println!("\nSERVER METRICS: No metrics data available"),
    }

    title("End of Metrics Report");
    println!();

    Ok(())
}
