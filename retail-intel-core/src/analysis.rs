//! One end-to-end analysis run

use crate::agents::{create_llm_client, Crew, LlmClient, TaskGraph, TaskOutput};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::ClientMetrics;
use crate::toolbox::ToolBox;
use std::sync::Arc;

/// Reports shorter than this fall back to every task output joined
const MIN_REPORT_CHARS: usize = 200;

/// Result of [`RetailAnalyst::analyze_retail_project`]
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed {
        session_id: String,
        report: String,
        task_outputs: Vec<TaskOutput>,
    },
    Failed {
        session_id: String,
        message: String,
    },
}

impl AnalysisOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            AnalysisOutcome::Completed { session_id, .. } => session_id,
            AnalysisOutcome::Failed { session_id, .. } => session_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed { .. })
    }

    /// Text shown to the user
    pub fn report_text(&self) -> String {
        match self {
            AnalysisOutcome::Completed { report, .. } => report.clone(),
            AnalysisOutcome::Failed { message, .. } => format!("Error during analysis: {}", message),
        }
    }
}

/// Runs the specialist crew for a project description and tracks the session
pub struct RetailAnalyst {
    crew: Crew,
    tools: Arc<ToolBox>,
}

impl RetailAnalyst {
    pub fn new(crew: Crew, tools: Arc<ToolBox>) -> Self {
        Self { crew, tools }
    }

    /// Analyst wired to the configured LLM and tool server
    pub fn from_config(config: &Config, metrics: Arc<ClientMetrics>) -> Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);
        let tools = Arc::new(ToolBox::from_config(config, metrics)?);
        let crew = Crew::new(
            llm,
            tools.clone(),
            config.orchestration.mode,
            config.llm.max_iterations,
        );
        Ok(Self::new(crew, tools))
    }

    pub fn tools(&self) -> &Arc<ToolBox> {
        &self.tools
    }

    /// Analyze one project; failures are folded into the outcome
    pub fn analyze_retail_project(&self, project_description: &str) -> AnalysisOutcome {
        let metrics = self.tools.metrics();
        let session_id = metrics.start_analysis_session(project_description);
        self.tools.set_project_name(project_description);
        self.tools.set_session(Some(session_id.clone()));

        let graph = TaskGraph::for_project(project_description);
        let result = self.crew.kickoff(&graph);

        self.tools.set_session(None);
        if let Err(e) = metrics.end_analysis_session(&session_id, result.is_ok()) {
            tracing::warn!(error = %e, "Failed to close analysis session");
        }
        if let Err(e) = metrics.save_snapshot() {
            tracing::warn!(error = %e, "Failed to save client metrics");
        }

        match result {
            Ok(output) => {
                let mut report = output
                    .final_output()
                    .map(|task| task.raw.clone())
                    .unwrap_or_default();
                if report.chars().count() < MIN_REPORT_CHARS {
                    let joined = output.joined();
                    if !joined.trim().is_empty() {
                        report = joined;
                    }
                }
                AnalysisOutcome::Completed {
                    session_id,
                    report,
                    task_outputs: output.tasks,
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Analysis failed");
                AnalysisOutcome::Failed {
                    session_id,
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::crew::testing::ScriptedLlm;
    use crate::agents::{ChatMessage, ChatReply, FunctionSpec};
    use crate::config::{ExecutionMode, MetricsConfig};
    use crate::error::Error;
    use crate::metrics::SessionStatus;
    use crate::toolbox::testing::ScriptedTransport;
    use crate::toolbox::RetryPolicy;
    use tempfile::TempDir;

    fn analyst(llm: Arc<dyn LlmClient>, dir: &TempDir) -> RetailAnalyst {
        let metrics = Arc::new(ClientMetrics::new(dir.path(), MetricsConfig::default()));
        let tools = Arc::new(ToolBox::new(
            Arc::new(ScriptedTransport::always("{}")),
            metrics,
            RetryPolicy::new(3),
            dir.path().to_path_buf(),
        ));
        let crew = Crew::new(llm, tools.clone(), ExecutionMode::Sequential, 3);
        RetailAnalyst::new(crew, tools)
    }

    #[test]
    fn test_completed_run_tracks_session() {
        let dir = TempDir::new().unwrap();
        let analyst = analyst(Arc::new(ScriptedLlm::default()), &dir);

        let outcome = analyst.analyze_retail_project("Open 20 stores in Brazil");
        assert!(outcome.is_completed());

        // The synthesis text is short, so every task output is joined.
        let report = outcome.report_text();
        assert!(report.starts_with("report by Operations & Supply Chain Analyst"));
        assert!(report.ends_with("report by Project Analysis Coordinator"));

        let data = analyst.tools().metrics().snapshot();
        let session = &data.analysis_sessions[0];
        assert_eq!(session.session_id, outcome.session_id());
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.duration_seconds.is_some());
        assert_eq!(session.tool_calls.len(), 5);
        assert!(dir.path().join("client_metrics.json").exists());
    }

    struct LongReportLlm;

    impl LlmClient for LongReportLlm {
        fn chat(&self, _messages: &[ChatMessage], _tools: &[FunctionSpec]) -> Result<ChatReply> {
            Ok(ChatReply::text("x".repeat(250)))
        }
    }

    #[test]
    fn test_long_synthesis_is_the_report() {
        let dir = TempDir::new().unwrap();
        let analyst = analyst(Arc::new(LongReportLlm), &dir);

        match analyst.analyze_retail_project("Pop-up stores") {
            AnalysisOutcome::Completed {
                report,
                task_outputs,
                ..
            } => {
                assert_eq!(report, "x".repeat(250));
                assert_eq!(task_outputs.len(), 6);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    struct FailingLlm;

    impl LlmClient for FailingLlm {
        fn chat(&self, _messages: &[ChatMessage], _tools: &[FunctionSpec]) -> Result<ChatReply> {
            Err(Error::Llm("openai returned 401".to_string()))
        }
    }

    #[test]
    fn test_failed_run_marks_session_failed() {
        let dir = TempDir::new().unwrap();
        let analyst = analyst(Arc::new(FailingLlm), &dir);

        let outcome = analyst.analyze_retail_project("Anything");
        assert!(!outcome.is_completed());
        assert_eq!(
            outcome.report_text(),
            "Error during analysis: LLM error: openai returned 401"
        );

        let data = analyst.tools().metrics().snapshot();
        assert_eq!(data.analysis_sessions[0].status, SessionStatus::Failed);
    }
}
