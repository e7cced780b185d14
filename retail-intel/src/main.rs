//! retail-intel - analyze a retail project with specialist agents
//!
//! Reads a project description (argument or prompt), runs the specialist
//! crew against the remote tool server, and prints the synthesized report.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs and metrics: $XDG_STATE_HOME/retail-intel/ (~/.local/state/retail-intel/)
//! - Config: $XDG_CONFIG_HOME/retail-intel/config.toml (~/.config/retail-intel/config.toml)

use anyhow::{Context, Result};
use clap::Parser;
use retail_intel_core::config::ExecutionMode;
use retail_intel_core::{ClientMetrics, Config, RetailAnalyst};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

const RULE_WIDTH: usize = 70;

#[derive(Parser)]
#[command(name = "retail-intel")]
#[command(about = "Analyze a retail project with specialist agents")]
#[command(version)]
struct Args {
    /// Project description; prompted for when omitted
    description: Vec<String>,

    /// Run the five specialist analyses concurrently
    #[arg(long)]
    parallel: bool,

    /// Do not echo tool inputs and outputs to the console
    #[arg(long)]
    hide_tool_data: bool,
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn banner(title: &str) {
    println!("\n{}", rule());
    println!("{}", title);
    println!("{}", rule());
}

/// Prompt on stdin; `None` when stdin is closed
fn prompt_description() -> Result<Option<String>> {
    print!("Enter your retail project description: ");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read project description")?;
    Ok((read > 0).then_some(line))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if args.parallel {
        config.orchestration.mode = ExecutionMode::Parallel;
    }

    let _log_guard =
        retail_intel_core::logging::init(&config, false).context("failed to initialize logging")?;

    // Agent threads may still be blocked on the network; leave immediately.
    ctrlc::set_handler(|| {
        println!("\n\n{}", rule());
        println!("Interrupted by user (Ctrl+C)");
        println!("{}", rule());
        std::process::exit(0);
    })
    .context("failed to install interrupt handler")?;

    println!("{}", rule());
    println!("Retail Project Analysis System");
    println!("{}", rule());
    println!("\nSpecialist agents gather data from the tool server at {}.", config.server.endpoint());
    println!("The coordinator synthesizes all analyses into one report.");
    println!("\nPress Ctrl+C at any time to exit.\n");

    let description = if args.description.is_empty() {
        match prompt_description()? {
            Some(line) => line,
            None => {
                println!("\n\nNo input provided. Exiting.");
                return Ok(());
            }
        }
    } else {
        args.description.join(" ")
    };
    let description = description.trim();

    if description.is_empty() {
        println!("No project description provided. Exiting.");
        return Ok(());
    }

    tracing::info!(mode = ?config.orchestration.mode, "retail-intel starting analysis");

    let metrics = Arc::new(ClientMetrics::from_config(&config));
    let analyst =
        RetailAnalyst::from_config(&config, metrics).context("failed to set up analysis")?;
    analyst.tools().set_show_tool_data(!args.hide_tool_data);

    banner("Analyzing project...");
    let outcome = analyst.analyze_retail_project(description);

    banner("Analysis Complete");
    println!("{}", outcome.report_text());

    banner("Analysis finished. Exiting...");
    println!("Session: {}", outcome.session_id());

    Ok(())
}
