//! # retail-intel-core
//!
//! Core library for retail-intel - multi-agent retail project analysis over
//! a small set of wrapped public data APIs.
//!
//! This library provides:
//! - Tool adapters for population, country, equity, macroeconomic and
//!   product catalog data
//! - A JSON-RPC tool server (HTTP and stdio) and the matching client
//! - Client and server metrics collectors with JSON snapshots
//! - Analysis agents, the task graph and the crew runner
//! - Configuration, logging and a small song catalog store
//!
//! ## Architecture
//!
//! Data flows across one process boundary:
//! - **Server:** [`protocol::ToolServer`] dispatches `tools/call` requests to
//!   the adapters in [`tools`], which call upstream APIs and never fail.
//! - **Client:** agents in [`agents`] call tools through the [`toolbox`],
//!   which forwards each call over a fresh session with [`protocol::McpClient`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use retail_intel_core::{ClientMetrics, Config, RetailAnalyst};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let metrics = Arc::new(ClientMetrics::from_config(&config));
//! let analyst = RetailAnalyst::from_config(&config, metrics).expect("failed to build analyst");
//!
//! let outcome = analyst.analyze_retail_project("Open 20 grocery stores in Brazil");
//! println!("{}", outcome.report_text());
//! ```

// Re-export commonly used items at the crate root
pub use analysis::{AnalysisOutcome, RetailAnalyst};
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{ClientMetrics, ServerMetrics};
pub use songs::{Song, SongDatabase, SongStore};
pub use toolbox::ToolBox;
pub use tools::{ToolContext, ToolKind};

// Public modules
pub mod agents;
pub mod analysis;
pub mod config;
pub mod error;
pub mod linelog;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod songs;
pub mod toolbox;
pub mod tools;
