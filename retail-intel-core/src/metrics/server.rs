//! Server-side metrics: upstream API round trips

use super::{percent, round2, tail, Parameters, SERVER_METRICS_JSON, SERVER_METRICS_LOG};
use crate::config::{Config, MetricsConfig};
use crate::error::Result;
use crate::linelog::LineLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One upstream API round trip made by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub timestamp: DateTime<Utc>,
    pub api_name: String,
    pub tool_name: String,
    pub success: bool,
    pub response_time_ms: f64,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ApiCallRecord {
    /// Record a call that returned usable data
    pub fn success(api_name: &str, tool_name: &str, response_time_ms: f64, parameters: Parameters) -> Self {
        Self {
            timestamp: Utc::now(),
            api_name: api_name.to_string(),
            tool_name: tool_name.to_string(),
            success: true,
            response_time_ms: round2(response_time_ms.max(0.0)),
            parameters,
            error_message: None,
        }
    }

    /// Record a call that failed
    pub fn failure(
        api_name: &str,
        tool_name: &str,
        response_time_ms: f64,
        error_message: impl Into<String>,
        parameters: Parameters,
    ) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            ..Self::success(api_name, tool_name, response_time_ms, parameters)
        }
    }
}

/// A failed API call, kept separately for the error view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub api_name: String,
    pub tool_name: String,
    pub error_message: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Raw server metrics state; this is also the JSON snapshot format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetricsData {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub tool_calls: BTreeMap<String, u64>,
    pub api_call_counts: BTreeMap<String, u64>,
    pub api_calls: Vec<ApiCallRecord>,
    pub errors: Vec<ErrorRecord>,
    /// Latencies of successful calls per API
    pub response_times: BTreeMap<String, Vec<f64>>,
}

impl Default for ServerMetricsData {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            current_time: now,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            tool_calls: BTreeMap::new(),
            api_call_counts: BTreeMap::new(),
            api_calls: Vec::new(),
            errors: Vec::new(),
            response_times: BTreeMap::new(),
        }
    }
}

impl ServerMetricsData {
    fn record(&mut self, call: ApiCallRecord) {
        self.total_calls += 1;
        *self.tool_calls.entry(call.tool_name.clone()).or_default() += 1;
        *self.api_call_counts.entry(call.api_name.clone()).or_default() += 1;

        if call.success {
            self.successful_calls += 1;
            self.response_times
                .entry(call.api_name.clone())
                .or_default()
                .push(call.response_time_ms);
        } else {
            self.failed_calls += 1;
            self.errors.push(ErrorRecord {
                timestamp: call.timestamp,
                api_name: call.api_name.clone(),
                tool_name: call.tool_name.clone(),
                error_message: call
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
                parameters: call.parameters.clone(),
            });
        }

        self.api_calls.push(call);
    }

    /// Compute the summary view from the raw streams
    pub fn summary(&self, limits: &MetricsConfig) -> ServerSummary {
        let average_response_times = self
            .response_times
            .iter()
            .filter_map(|(api, times)| LatencyStats::from_samples(times).map(|s| (api.clone(), s)))
            .collect();

        ServerSummary {
            summary: ServerTotals {
                start_time: self.start_time,
                current_time: Utc::now(),
                total_api_calls: self.total_calls,
                successful_calls: self.successful_calls,
                failed_calls: self.failed_calls,
                success_rate_percent: round2(percent(self.successful_calls, self.total_calls)),
            },
            tool_usage: self.tool_calls.clone(),
            api_usage: self.api_call_counts.clone(),
            average_response_times,
            errors: tail(&self.errors, limits.recent_errors),
            detailed_calls: tail(&self.api_calls, limits.recent_calls),
        }
    }
}

/// Latency statistics for one API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub count: usize,
}

impl LatencyStats {
    fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sum: f64 = samples.iter().sum();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            avg_ms: round2(sum / samples.len() as f64),
            min_ms: round2(min),
            max_ms: round2(max),
            count: samples.len(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTotals {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub total_api_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub success_rate_percent: f64,
}

/// Summary view of the server metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    pub summary: ServerTotals,
    pub tool_usage: BTreeMap<String, u64>,
    pub api_usage: BTreeMap<String, u64>,
    pub average_response_times: BTreeMap<String, LatencyStats>,
    pub errors: Vec<ErrorRecord>,
    pub detailed_calls: Vec<ApiCallRecord>,
}

/// Server metrics collector
///
/// Shared between request handlers via `Arc`. Every `snapshot_every`-th API
/// call overwrites `server_metrics.json` in the log directory.
pub struct ServerMetrics {
    data: Mutex<ServerMetricsData>,
    limits: MetricsConfig,
    log: LineLog,
    snapshot_path: PathBuf,
}

impl ServerMetrics {
    pub fn new(log_dir: &Path, limits: MetricsConfig) -> Self {
        Self {
            data: Mutex::new(ServerMetricsData::default()),
            limits,
            log: LineLog::in_dir(log_dir, SERVER_METRICS_LOG),
            snapshot_path: log_dir.join(SERVER_METRICS_JSON),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.server_log_dir(), config.metrics.clone())
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    fn lock(&self) -> MutexGuard<'_, ServerMetricsData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_metric(&self, message: &str) {
        tracing::info!(target: "retail_intel::metrics", "{}", message);
        self.log.write(message);
    }

    /// Record one upstream API call
    pub fn track_api_call(&self, call: ApiCallRecord) {
        let message = format!(
            "API Call: {} via {} - {} ({:.2}ms)",
            call.api_name,
            call.tool_name,
            if call.success { "SUCCESS" } else { "FAILED" },
            call.response_time_ms
        );

        let due = {
            let mut data = self.lock();
            data.record(call);
            let every = self.limits.snapshot_every;
            every > 0 && data.total_calls % every == 0
        };

        self.log_metric(&message);

        if due {
            if let Err(e) = self.save_snapshot() {
                self.log_metric(&format!("Error saving metrics to file: {}", e));
            }
        }
    }

    /// Log an incoming tool call before it is dispatched
    pub fn track_tool_call(&self, tool_name: &str, parameters: &Parameters) {
        let params = serde_json::to_string(parameters).unwrap_or_else(|_| "{}".to_string());
        self.log_metric(&format!("Tool Call: {} with params: {}", tool_name, params));
    }

    pub fn summary(&self) -> ServerSummary {
        self.lock().summary(&self.limits)
    }

    /// Copy of the raw state
    pub fn snapshot(&self) -> ServerMetricsData {
        let mut data = self.lock().clone();
        data.current_time = Utc::now();
        data
    }

    /// Overwrite the JSON snapshot file
    pub fn save_snapshot(&self) -> Result<PathBuf> {
        let data = self.snapshot();
        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.snapshot_path, serde_json::to_string_pretty(&data)?)?;
        Ok(self.snapshot_path.clone())
    }

    pub fn reset(&self) {
        *self.lock() = ServerMetricsData::default();
        self.log_metric("Metrics reset");
    }
}
