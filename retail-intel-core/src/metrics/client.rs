//! Client-side metrics: analysis sessions, agent tool calls, transport calls

use super::{percent, round2, tail, Parameters, CLIENT_METRICS_JSON, CLIENT_METRICS_LOG};
use crate::config::{Config, MetricsConfig};
use crate::error::{Error, Result};
use crate::linelog::LineLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Maximum characters of the project description kept on a session
const DESCRIPTION_LIMIT: usize = 200;

/// One tool call made by an agent, as seen by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub agent_name: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub parameters: Parameters,
    pub response_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolCallRecord {
    pub fn new(tool_name: &str, agent_name: &str, parameters: Parameters) -> Self {
        Self {
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            agent_name: agent_name.to_string(),
            session_id: None,
            success: true,
            parameters,
            response_time_ms: 0.0,
            error_message: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }

    pub fn with_latency(mut self, response_time_ms: f64) -> Self {
        self.response_time_ms = round2(response_time_ms.max(0.0));
        self
    }

    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }
}

/// One transport round trip to the tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpCallRecord {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub response_time_ms: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Started,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Started => "started",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// One run of the analysis crew
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub project_description: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub agents_used: Vec<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub tool: String,
    pub success: bool,
}

/// Raw client metrics state; this is also the JSON snapshot format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetricsData {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub total_analyses: u64,
    pub total_tool_calls: u64,
    pub successful_tool_calls: u64,
    pub failed_tool_calls: u64,
    pub total_mcp_calls: u64,
    pub analysis_sessions: Vec<AnalysisSession>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_usage: BTreeMap<String, u64>,
    pub agent_activity: BTreeMap<String, Vec<AgentActivity>>,
    pub mcp_calls: Vec<McpCallRecord>,
    pub mcp_response_times: Vec<f64>,
}

impl Default for ClientMetricsData {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            current_time: now,
            total_analyses: 0,
            total_tool_calls: 0,
            successful_tool_calls: 0,
            failed_tool_calls: 0,
            total_mcp_calls: 0,
            analysis_sessions: Vec::new(),
            tool_calls: Vec::new(),
            tool_usage: BTreeMap::new(),
            agent_activity: BTreeMap::new(),
            mcp_calls: Vec::new(),
            mcp_response_times: Vec::new(),
        }
    }
}

impl ClientMetricsData {
    fn session_mut(&mut self, session_id: &str) -> Option<&mut AnalysisSession> {
        self.analysis_sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
    }

    fn unique_session_id(&self, now: DateTime<Utc>) -> String {
        let base = format!("session_{}", now.format("%Y%m%d_%H%M%S"));
        let taken = |id: &str| self.analysis_sessions.iter().any(|s| s.session_id == id);
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|id| !taken(id))
            .unwrap_or(base)
    }

    /// Compute the summary view from the raw streams
    pub fn summary(&self, limits: &MetricsConfig) -> ClientSummary {
        let avg_mcp = if self.mcp_response_times.is_empty() {
            0.0
        } else {
            self.mcp_response_times.iter().sum::<f64>() / self.mcp_response_times.len() as f64
        };

        let durations: Vec<f64> = self
            .analysis_sessions
            .iter()
            .filter_map(|s| s.duration_seconds)
            .collect();
        let avg_duration = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        ClientSummary {
            summary: ClientTotals {
                start_time: self.start_time,
                current_time: Utc::now(),
                total_analyses: self.total_analyses,
                total_tool_calls: self.total_tool_calls,
                successful_tool_calls: self.successful_tool_calls,
                failed_tool_calls: self.failed_tool_calls,
                tool_call_success_rate_percent: round2(percent(
                    self.successful_tool_calls,
                    self.total_tool_calls,
                )),
                total_mcp_calls: self.total_mcp_calls,
                average_mcp_response_time_ms: round2(avg_mcp),
                average_analysis_duration_seconds: round2(avg_duration),
            },
            tool_usage: self.tool_usage.clone(),
            agent_activity_summary: self
                .agent_activity
                .iter()
                .map(|(agent, activities)| (agent.clone(), activities.len()))
                .collect(),
            recent_sessions: tail(&self.analysis_sessions, limits.recent_sessions),
            recent_tool_calls: tail(&self.tool_calls, limits.recent_tool_calls),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTotals {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub total_analyses: u64,
    pub total_tool_calls: u64,
    pub successful_tool_calls: u64,
    pub failed_tool_calls: u64,
    pub tool_call_success_rate_percent: f64,
    pub total_mcp_calls: u64,
    pub average_mcp_response_time_ms: f64,
    pub average_analysis_duration_seconds: f64,
}

/// Summary view of the client metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSummary {
    pub summary: ClientTotals,
    pub tool_usage: BTreeMap<String, u64>,
    pub agent_activity_summary: BTreeMap<String, usize>,
    pub recent_sessions: Vec<AnalysisSession>,
    pub recent_tool_calls: Vec<ToolCallRecord>,
}

/// Client metrics collector
pub struct ClientMetrics {
    data: Mutex<ClientMetricsData>,
    limits: MetricsConfig,
    log: LineLog,
    snapshot_path: PathBuf,
}

impl ClientMetrics {
    pub fn new(log_dir: &Path, limits: MetricsConfig) -> Self {
        Self {
            data: Mutex::new(ClientMetricsData::default()),
            limits,
            log: LineLog::in_dir(log_dir, CLIENT_METRICS_LOG),
            snapshot_path: log_dir.join(CLIENT_METRICS_JSON),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.client_log_dir(), config.metrics.clone())
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    fn lock(&self) -> MutexGuard<'_, ClientMetricsData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new analysis session and return its id
    pub fn start_analysis_session(&self, project_description: &str) -> String {
        let now = Utc::now();
        let session_id = {
            let mut data = self.lock();
            let session_id = data.unique_session_id(now);
            data.analysis_sessions.push(AnalysisSession {
                session_id: session_id.clone(),
                timestamp: now,
                project_description: truncate_description(project_description),
                status: SessionStatus::Started,
                tool_calls: Vec::new(),
                agents_used: Vec::new(),
                duration_seconds: None,
                end_timestamp: None,
            });
            data.total_analyses += 1;
            session_id
        };

        self.log.write(&format!("Analysis session started: {}", session_id));
        tracing::info!(session_id = %session_id, "Analysis session started");
        session_id
    }

    /// Close a session, recording its status and duration
    ///
    /// A session that has already ended keeps its first status, duration and
    /// end time.
    pub fn end_analysis_session(&self, session_id: &str, success: bool) -> Result<()> {
        let (duration, status) = {
            let mut data = self.lock();
            let session = data
                .session_mut(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

            if session.status != SessionStatus::Started {
                tracing::warn!(
                    session_id,
                    status = session.status.as_str(),
                    "Analysis session already ended"
                );
                return Ok(());
            }

            let now = Utc::now();
            let elapsed = (now - session.timestamp).num_milliseconds().max(0) as f64 / 1000.0;
            session.duration_seconds = Some(round2(elapsed));
            session.status = if success {
                SessionStatus::Completed
            } else {
                SessionStatus::Failed
            };
            session.end_timestamp = Some(now);
            (elapsed, session.status)
        };

        self.log.write(&format!(
            "Analysis session ended: {} - Duration: {:.2}s - Status: {}",
            session_id,
            duration,
            status.as_str()
        ));
        tracing::info!(session_id, duration, status = status.as_str(), "Analysis session ended");
        Ok(())
    }

    /// Record one agent tool call, attaching it to its session if any
    pub fn track_tool_call(&self, record: ToolCallRecord) {
        let message = format!(
            "Tool Call: {} by {} - {}",
            record.tool_name,
            record.agent_name,
            if record.success { "SUCCESS" } else { "FAILED" }
        );

        {
            let mut data = self.lock();
            data.total_tool_calls += 1;
            if record.success {
                data.successful_tool_calls += 1;
            } else {
                data.failed_tool_calls += 1;
            }
            *data.tool_usage.entry(record.tool_name.clone()).or_default() += 1;
            data.agent_activity
                .entry(record.agent_name.clone())
                .or_default()
                .push(AgentActivity {
                    timestamp: record.timestamp,
                    action: "tool_call".to_string(),
                    tool: record.tool_name.clone(),
                    success: record.success,
                });

            if let Some(session_id) = record.session_id.clone() {
                if let Some(session) = data.session_mut(&session_id) {
                    session.tool_calls.push(record.clone());
                    if !session.agents_used.contains(&record.agent_name) {
                        session.agents_used.push(record.agent_name.clone());
                    }
                }
            }

            data.tool_calls.push(record);
        }

        self.log.write(&message);
    }

    /// Record one transport round trip
    pub fn track_mcp_call(
        &self,
        tool_name: &str,
        response_time_ms: f64,
        success: bool,
        error_message: Option<String>,
    ) {
        let response_time_ms = round2(response_time_ms.max(0.0));
        {
            let mut data = self.lock();
            data.mcp_calls.push(McpCallRecord {
                timestamp: Utc::now(),
                tool_name: tool_name.to_string(),
                response_time_ms,
                success,
                error_message,
            });
            data.total_mcp_calls += 1;
            data.mcp_response_times.push(response_time_ms);
        }

        self.log.write(&format!(
            "MCP Call: {} - {:.2}ms - {}",
            tool_name,
            response_time_ms,
            if success { "SUCCESS" } else { "FAILED" }
        ));
    }

    pub fn summary(&self) -> ClientSummary {
        self.lock().summary(&self.limits)
    }

    /// Copy of the raw state
    pub fn snapshot(&self) -> ClientMetricsData {
        let mut data = self.lock().clone();
        data.current_time = Utc::now();
        data
    }

    /// Overwrite the JSON snapshot file
    pub fn save_snapshot(&self) -> Result<PathBuf> {
        let data = self.snapshot();
        let result = (|| -> Result<()> {
            if let Some(parent) = self.snapshot_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.snapshot_path, serde_json::to_string_pretty(&data)?)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.log.write("Metrics saved to file");
                Ok(self.snapshot_path.clone())
            }
            Err(e) => {
                self.log.write(&format!("Error saving metrics to file: {}", e));
                Err(e)
            }
        }
    }

    pub fn reset(&self) {
        *self.lock() = ClientMetricsData::default();
        self.log.write("Metrics reset");
    }
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_LIMIT {
        let head: String = description.chars().take(DESCRIPTION_LIMIT).collect();
        format!("{}...", head)
    } else {
        description.to_string()
    }
}
