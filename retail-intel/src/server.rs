//! retail-intel-server - tool server for the analysis agents
//!
//! Serves the five data tools over JSON-RPC, either on HTTP (`POST /mcp`)
//! or, with `--stdio`, one message per line on stdin/stdout.

use anyhow::{Context, Result};
use clap::Parser;
use retail_intel_core::protocol::{http, stdio, ToolServer};
use retail_intel_core::{Config, ServerMetrics, ToolContext};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "retail-intel-server")]
#[command(about = "Serve retail data tools over JSON-RPC")]
#[command(version)]
struct Args {
    /// Serve on stdin/stdout instead of HTTP
    #[arg(long)]
    stdio: bool,

    /// Bind address (defaults to server.host)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (defaults to PORT or server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    // stdout carries protocol traffic in stdio mode
    let _log_guard = retail_intel_core::logging::init(&config, !args.stdio)
        .context("failed to initialize logging")?;

    let metrics = Arc::new(ServerMetrics::from_config(&config));
    let context = ToolContext::from_config(&config, metrics.clone())
        .context("failed to set up tool context")?;
    let server = Arc::new(ToolServer::new(Arc::new(context)));

    if args.stdio {
        tracing::info!("retail-intel-server starting on stdio");
        stdio::run_stdio(&server)
            .await
            .context("stdio transport failed")?;
    } else {
        let host = args.host.unwrap_or_else(|| config.server.host.clone());
        let port = args.port.unwrap_or(config.server.port);
        let addr = format!("{}:{}", host, port);
        tracing::info!(%addr, "retail-intel-server starting");
        http::serve(&addr, server)
            .await
            .with_context(|| format!("failed to serve on {}", addr))?;
    }

    match metrics.save_snapshot() {
        Ok(path) => tracing::info!(path = %path.display(), "Server metrics saved"),
        Err(e) => tracing::warn!(error = %e, "Failed to save server metrics"),
    }

    Ok(())
}
