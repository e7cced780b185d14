//! Chat-completions client with function calling

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as sent by the model
    #[serde(default)]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            id: id.into(),
            kind: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// One message in the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Assistant turn that requested tool calls
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Result of one tool call, answering `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A function the model may call
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

impl FunctionSpec {
    fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// The model's reply: text, tool calls, or both
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// LLM chat interface used by the agent loop
pub trait LlmClient: Send + Sync {
    fn chat(&self, messages: &[ChatMessage], tools: &[FunctionSpec]) -> Result<ChatReply>;
}

/// Create the default HTTP-backed chat client.
pub fn create_llm_client(llm: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    Ok(Box::new(HttpLlmClient::new(llm)?))
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

struct HttpLlmClient {
    model: String,
    temperature: f32,
    url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpLlmClient {
    fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

        if config.provider.requires_api_key() && api_key.is_none() {
            return Err(Error::Config(
                "llm.api_key (or OPENAI_API_KEY) is required".to_string(),
            ));
        }

        let timeout_secs = config.timeout_secs.max(1);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: format!("{}/v1/chat/completions", endpoint.trim_end_matches('/')),
            api_key,
            http,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = self.api_key.as_deref() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))?,
            );
        }
        Ok(headers)
    }

    async fn send(&self, body: Value) -> Result<ChatReply> {
        let resp = self
            .http
            .post(&self.url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("chat request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Llm(format!("chat read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "chat endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        parse_reply(&body)
    }
}

impl LlmClient for HttpLlmClient {
    fn chat(&self, messages: &[ChatMessage], tools: &[FunctionSpec]) -> Result<ChatReply> {
        // Agents may run on several threads at once; each call drives its
        // own runtime.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Llm(format!("failed to build tokio runtime: {e}")))?;
        let body = request_body(&self.model, self.temperature, messages, tools);
        runtime.block_on(self.send(body))
    }
}

fn request_body(model: &str, temperature: f32, messages: &[ChatMessage], tools: &[FunctionSpec]) -> Value {
    let mut body = json!({
        "model": model,
        "temperature": temperature,
        "messages": messages,
    });
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(FunctionSpec::to_wire).collect());
        body["tool_choice"] = json!("auto");
    }
    body
}

fn parse_reply(body: &str) -> Result<ChatReply> {
    let completion: ChatCompletion = serde_json::from_str(body)?;
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| Error::Llm("chat response missing choices[0].message".to_string()))?;
    Ok(ChatReply {
        content: message.content,
        tool_calls: message.tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    #[test]
    fn test_parse_text_reply() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Final report"},"finish_reason":"stop"}]}"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.content.as_deref(), Some("Final report"));
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_tool_call_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_1","type":"function","function":{"name":"fred_api","arguments":"{\"series_id\":\"GDP\"}"}}
        ]}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.content, None);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].function.name, "fred_api");
        let args: Value = serde_json::from_str(&reply.tool_calls[0].function.arguments).unwrap();
        assert_eq!(args["series_id"], "GDP");
    }

    #[test]
    fn test_parse_reply_without_choices_fails() {
        let err = parse_reply(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[test]
    fn test_request_body_shapes_messages_and_tools() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::assistant(
                None,
                vec![ToolCallRequest::new("call_1", "bigquery", &json!({"query": "SELECT 1"}))],
            ),
            ChatMessage::tool("call_1", "{}"),
        ];
        let tools = vec![FunctionSpec {
            name: "bigquery".to_string(),
            description: "Run SQL".to_string(),
            parameters: json!({"type": "object"}),
        }];

        let body = request_body("gpt-4o-mini", 0.7, &messages, &tools);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["tool_calls"][0]["type"], "function");
        assert!(body["messages"][1]["content"].is_null());
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "bigquery");
        assert_eq!(body["tool_choice"], "auto");

        let bare = request_body("m", 0.0, &messages[..1], &[]);
        assert!(bare.get("tools").is_none());
        assert!(bare["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(create_llm_client(&config), Err(Error::Config(_))));

        let ollama = LlmConfig {
            provider: LlmProvider::Ollama,
            ..LlmConfig::default()
        };
        assert!(create_llm_client(&ollama).is_ok());
    }
}
