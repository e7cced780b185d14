//! Metrics sidecar
//!
//! Two explicitly constructed collectors, one per side of the tool boundary:
//!
//! - [`ServerMetrics`] counts upstream API round trips made by the adapters.
//! - [`ClientMetrics`] tracks analysis sessions, agent tool calls and raw
//!   transport calls.
//!
//! Both hold their state behind a single `Mutex`, mirror every event to a
//! plain line log, and can write a JSON snapshot that the metrics viewer
//! reads back. Summaries are recomputed from the raw record streams on each
//! request.

mod client;
mod server;

pub use client::{
    AgentActivity, AnalysisSession, ClientMetrics, ClientMetricsData, ClientSummary, ClientTotals,
    McpCallRecord, SessionStatus, ToolCallRecord,
};
pub use server::{
    ApiCallRecord, ErrorRecord, LatencyStats, ServerMetrics, ServerMetricsData, ServerSummary,
    ServerTotals,
};

use serde_json::{Map, Value};

/// Parameters attached to a record
pub type Parameters = Map<String, Value>;

/// File names inside the log directory
pub const SERVER_METRICS_LOG: &str = "server_metrics.log";
pub const SERVER_METRICS_JSON: &str = "server_metrics.json";
pub const CLIENT_METRICS_LOG: &str = "client_metrics.log";
pub const CLIENT_METRICS_JSON: &str = "client_metrics.json";

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0.
pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Last `n` items of a slice.
pub(crate) fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

/// Builds a [`Parameters`] map from string pairs, skipping unset values.
pub fn params<'a, I>(pairs: I) -> Parameters
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), Value::String(v.to_string()))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(2.005_1), 2.01);
    }

    #[test]
    fn test_percent_of_zero() {
        assert_eq!(percent(3, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail(&[1, 2, 3, 4], 2), vec![3, 4]);
        assert_eq!(tail(&[1], 5), vec![1]);
    }

    #[test]
    fn test_params_skips_unset() {
        let p = params([("symbol", Some("AAPL")), ("series_id", None)]);
        assert_eq!(p.len(), 1);
        assert_eq!(p["symbol"], "AAPL");
    }
}
