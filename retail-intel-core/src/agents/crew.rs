//! Agent loop and crew execution
//!
//! Each task runs as a chat loop: the agent may request tool calls, which
//! are executed one at a time through the [`ToolBox`] and fed back, until
//! it answers in text or runs out of iterations. Leaf tasks run first
//! (sequentially or on scoped threads), then the tasks that read them.

use super::llm::{ChatMessage, FunctionSpec, LlmClient, ToolCallRequest};
use super::tasks::{TaskGraph, TaskSpec};
use super::AgentRole;
use crate::config::ExecutionMode;
use crate::error::{Error, Result};
use crate::toolbox::ToolBox;
use crate::tools::ToolKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const FINAL_ANSWER_PROMPT: &str = "You have reached the maximum number of tool calls. \
Using only the data gathered so far, provide your complete final answer now.";

/// Output of one finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub raw: String,
}

/// Outputs of every task, in graph order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
}

impl CrewOutput {
    /// Output of the last task in the graph
    pub fn final_output(&self) -> Option<&TaskOutput> {
        self.tasks.last()
    }

    /// Every task output, separated by blank lines
    pub fn joined(&self) -> String {
        self.tasks
            .iter()
            .map(|t| t.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Function schemas for `tools`, each with an `agent_name` argument
pub fn function_specs(tools: &[ToolKind]) -> Vec<FunctionSpec> {
    tools
        .iter()
        .map(|kind| {
            let mut parameters = kind.input_schema();
            if let Some(properties) = parameters
                .get_mut("properties")
                .and_then(Value::as_object_mut)
            {
                properties.insert(
                    "agent_name".to_string(),
                    json!({"type": "string", "description": "Your role name, for logging"}),
                );
            }
            FunctionSpec {
                name: kind.name().to_string(),
                description: format!("{}: {}", kind.display_name(), kind.description()),
                parameters,
            }
        })
        .collect()
}

pub struct Crew {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolBox>,
    mode: ExecutionMode,
    max_iterations: usize,
}

impl Crew {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolBox>,
        mode: ExecutionMode,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            tools,
            mode,
            max_iterations,
        }
    }

    /// Run every task of `graph` and collect the outputs in graph order
    pub fn kickoff(&self, graph: &TaskGraph) -> Result<CrewOutput> {
        graph.validate()?;
        let tasks = graph.tasks();
        let mut outputs: Vec<Option<TaskOutput>> = vec![None; tasks.len()];

        let leaves = graph.leaves();
        tracing::info!(mode = ?self.mode, tasks = tasks.len(), "Crew kickoff");

        let leaf_results: Vec<(usize, Result<TaskOutput>)> = match self.mode {
            ExecutionMode::Sequential => leaves
                .iter()
                .map(|&i| (i, self.run_task(&tasks[i], &[])))
                .collect(),
            ExecutionMode::Parallel => std::thread::scope(|scope| {
                let handles: Vec<_> = leaves
                    .iter()
                    .map(|&i| (i, scope.spawn(move || self.run_task(&tasks[i], &[]))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(i, handle)| {
                        let result = handle.join().unwrap_or_else(|_| {
                            Err(Error::Llm(format!("agent thread for task '{}' panicked", tasks[i].name)))
                        });
                        (i, result)
                    })
                    .collect()
            }),
        };
        for (i, result) in leaf_results {
            outputs[i] = Some(result?);
        }

        for i in graph.dependents() {
            let context: Vec<&TaskOutput> = tasks[i]
                .context
                .iter()
                .filter_map(|&dep| outputs[dep].as_ref())
                .collect();
            let output = self.run_task(&tasks[i], &context)?;
            outputs[i] = Some(output);
        }

        Ok(CrewOutput {
            tasks: outputs.into_iter().flatten().collect(),
        })
    }

    /// Drive one agent through one task
    pub fn run_task(&self, task: &TaskSpec, context: &[&TaskOutput]) -> Result<TaskOutput> {
        let role = task.agent;
        tracing::info!(task = task.name, agent = role.name(), "Task started");

        let functions = function_specs(role.tools());
        let mut messages = vec![
            ChatMessage::system(role.system_prompt()),
            ChatMessage::user(task_prompt(task, context)),
        ];

        for iteration in 0..self.max_iterations {
            let reply = self.llm.chat(&messages, &functions)?;
            if reply.tool_calls.is_empty() {
                tracing::info!(task = task.name, iteration, "Task finished");
                return Ok(finished(task, reply.content));
            }

            let calls = reply.tool_calls.clone();
            messages.push(ChatMessage::assistant(reply.content, reply.tool_calls));
            for call in &calls {
                let output = self.execute(role, call);
                messages.push(ChatMessage::tool(call.id.clone(), output));
            }
        }

        tracing::warn!(
            task = task.name,
            max_iterations = self.max_iterations,
            "Iteration limit reached, requesting final answer"
        );
        messages.push(ChatMessage::user(FINAL_ANSWER_PROMPT));
        let reply = self.llm.chat(&messages, &[])?;
        Ok(finished(task, reply.content))
    }

    /// Run one requested tool call; failures become text for the model
    fn execute(&self, role: AgentRole, call: &ToolCallRequest) -> String {
        let name = call.function.name.as_str();
        let kind = match ToolKind::from_name(name).filter(|k| role.tools().contains(k)) {
            Some(kind) => kind,
            None => return format!("Error: tool '{}' is not available to {}", name, role.name()),
        };

        let raw = if call.function.arguments.trim().is_empty() {
            "{}"
        } else {
            call.function.arguments.as_str()
        };
        let arguments: Map<String, Value> = match serde_json::from_str(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return format!("Error: arguments for {} must be a JSON object", name),
            Err(e) => return format!("Error: invalid arguments for {}: {}", name, e),
        };

        let agent = arguments
            .get("agent_name")
            .and_then(Value::as_str)
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(role.name())
            .to_string();

        tracing::debug!(tool = name, agent = %agent, "Executing tool call");
        self.tools.invoke(kind, &arguments, &agent)
    }
}

fn task_prompt(task: &TaskSpec, context: &[&TaskOutput]) -> String {
    let mut prompt = task.description.clone();
    if !context.is_empty() {
        prompt.push_str("\n\nThis is the context you're working with:\n");
        for output in context {
            prompt.push_str(&format!("\n### {}\n{}\n", output.agent, output.raw));
        }
    }
    prompt.push_str(&format!(
        "\n\nThis is the expected criteria for your final answer: {}",
        task.expected_output
    ));
    prompt
}

fn finished(task: &TaskSpec, content: Option<String>) -> TaskOutput {
    TaskOutput {
        task: task.name.to_string(),
        agent: task.agent.name().to_string(),
        raw: content.unwrap_or_default(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLlm;
    use super::*;
    use crate::agents::llm::ChatReply;
    use crate::config::MetricsConfig;
    use crate::metrics::ClientMetrics;
    use crate::toolbox::testing::ScriptedTransport;
    use crate::toolbox::RetryPolicy;
    use tempfile::TempDir;

    fn toolbox(dir: &TempDir) -> (Arc<ToolBox>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::always(r#"{"series_id":"GDP"}"#));
        let metrics = Arc::new(ClientMetrics::new(dir.path(), MetricsConfig::default()));
        let tools = ToolBox::new(
            transport.clone(),
            metrics,
            RetryPolicy::new(3),
            dir.path().to_path_buf(),
        );
        (Arc::new(tools), transport)
    }

    fn check_output(output: &CrewOutput) {
        assert_eq!(output.tasks.len(), 6);
        for (task, role) in output.tasks.iter().zip(AgentRole::SPECIALISTS) {
            assert_eq!(task.agent, role.name());
            assert_eq!(task.raw, format!("report by {}", role.name()));
        }
        let last = output.final_output().unwrap();
        assert_eq!(last.task, "synthesis");
        assert_eq!(last.raw, "report by Project Analysis Coordinator");
    }

    #[test]
    fn test_sequential_kickoff_runs_every_task() {
        let dir = TempDir::new().unwrap();
        let (tools, transport) = toolbox(&dir);
        let crew = Crew::new(Arc::new(ScriptedLlm::default()), tools.clone(), ExecutionMode::Sequential, 5);

        let output = crew.kickoff(&TaskGraph::for_project("Open stores in Brazil")).unwrap();
        check_output(&output);

        assert_eq!(transport.call_count(), 5);
        assert_eq!(tools.metrics().snapshot().total_tool_calls, 5);
    }

    #[test]
    fn test_parallel_kickoff_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let (tools, transport) = toolbox(&dir);
        let crew = Crew::new(Arc::new(ScriptedLlm::default()), tools, ExecutionMode::Parallel, 5);

        let output = crew.kickoff(&TaskGraph::for_project("Open stores in Brazil")).unwrap();
        check_output(&output);
        assert_eq!(transport.call_count(), 5);
    }

    #[test]
    fn test_coordinator_gets_no_tools_and_sees_context() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = toolbox(&dir);
        let llm = Arc::new(ScriptedLlm::default());
        let crew = Crew::new(llm.clone(), tools, ExecutionMode::Sequential, 5);

        let context = TaskOutput {
            task: "financial".to_string(),
            agent: "Financial & Sales Performance Analyst".to_string(),
            raw: "margins look thin".to_string(),
        };
        let graph = TaskGraph::for_project("x");
        let synthesis = &graph.tasks()[5];
        assert!(task_prompt(synthesis, &[&context]).contains("margins look thin"));

        crew.run_task(synthesis, &[&context]).unwrap();
        assert_eq!(*llm.turns.lock().unwrap(), vec![(2, 0)]);
    }

    struct LoopingLlm;

    impl LlmClient for LoopingLlm {
        fn chat(&self, _messages: &[ChatMessage], tools: &[FunctionSpec]) -> Result<ChatReply> {
            if tools.is_empty() {
                return Ok(ChatReply::text("forced answer"));
            }
            Ok(ChatReply::calls(vec![ToolCallRequest::new(
                "call",
                "rest_countries_api",
                &json!({"country": "Brazil", "region": ""}),
            )]))
        }
    }

    #[test]
    fn test_iteration_limit_forces_final_answer() {
        let dir = TempDir::new().unwrap();
        let (tools, transport) = toolbox(&dir);
        let crew = Crew::new(Arc::new(LoopingLlm), tools.clone(), ExecutionMode::Sequential, 5);

        let graph = TaskGraph::for_project("x");
        let output = crew.run_task(&graph.tasks()[0], &[]).unwrap();
        assert_eq!(output.raw, "forced answer");

        // The guard stops identical country lookups after three attempts.
        assert_eq!(transport.call_count(), 3);
        assert_eq!(tools.metrics().snapshot().total_tool_calls, 5);
    }

    #[test]
    fn test_unknown_function_is_reported_to_model() {
        let dir = TempDir::new().unwrap();
        let (tools, transport) = toolbox(&dir);
        let crew = Crew::new(Arc::new(LoopingLlm), tools, ExecutionMode::Sequential, 1);

        let call = ToolCallRequest::new("c", "weather_api", &json!({}));
        let text = crew.execute(AgentRole::Operations, &call);
        assert!(text.starts_with("Error: tool 'weather_api' is not available"));

        let call = ToolCallRequest::new("c", "fred_api", &json!({}));
        let text = crew.execute(AgentRole::Coordinator, &call);
        assert!(text.starts_with("Error: tool 'fred_api' is not available"));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_function_specs_include_agent_name() {
        let specs = function_specs(&ToolKind::ALL);
        assert_eq!(specs.len(), 5);
        for spec in &specs {
            assert!(spec.parameters["properties"]["agent_name"].is_object());
        }
        assert_eq!(specs[1].parameters["required"], json!(["country", "region"]));
    }

    #[test]
    fn test_joined_output_separates_tasks() {
        let task = |raw: &str| TaskOutput {
            task: "a".to_string(),
            agent: "Agent A".to_string(),
            raw: raw.to_string(),
        };
        let output = CrewOutput {
            tasks: vec![task("first"), task("second")],
        };
        assert_eq!(output.joined(), "first\n\nsecond");
    }
}
