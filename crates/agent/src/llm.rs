use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use tradebook_core::config::LlmConfig;

use crate::message::{Message, ToolCall};
use crate::tools::ToolDefinition;

/// Everything the engine sees for one reasoning step.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub owner_id: String,
    pub session_id: String,
}

/// Engine answer: final text, requested tool calls, or both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { content: String::new(), tool_calls }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI tool-call
/// format. Covers both hosted OpenAI and a local Ollama.
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    temperature: Option<f32>,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            base_url: config.effective_base_url(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(json!({"role": "system", "content": request.system_prompt}));
        messages.extend(request.messages.iter().map(message_to_openai));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "user": format!("{}:{}", request.owner_id, request.session_id),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(tool_to_openai).collect());
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);
        debug!(event_name = "agent.llm.request", url = %url, model = %self.model, "chat completion request");

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key.expose_secret());
        }

        let response = http.send().await.context("chat completion request failed")?;
        let status = response.status();
        let text = response.text().await.context("failed to read chat completion body")?;
        if !status.is_success() {
            bail!("chat completion returned HTTP {}: {}", status.as_u16(), text);
        }

        let value: Value = serde_json::from_str(&text).context("chat completion body is not JSON")?;
        parse_completion(&value)
    }
}

fn message_to_openai(message: &Message) -> Value {
    match message {
        Message::User { content } => json!({"role": "user", "content": content}),
        Message::Assistant { content, tool_calls } => {
            let mut value = json!({"role": "assistant"});
            value["content"] =
                if content.is_empty() { Value::Null } else { Value::String(content.clone()) };
            if !tool_calls.is_empty() {
                value["tool_calls"] = Value::Array(
                    tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.call_id,
                                "type": "function",
                                "function": {
                                    "name": call.tool_name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect(),
                );
            }
            value
        }
        Message::ToolResult { call_id, content, .. } => {
            json!({"role": "tool", "tool_call_id": call_id, "content": content})
        }
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn parse_completion(body: &Value) -> Result<Completion> {
    let message = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("chat completion has no choices[0].message"))?;

    let content = message.get("content").and_then(Value::as_str).unwrap_or_default().to_string();
    Ok(Completion { content, tool_calls: parse_tool_calls(message)? })
}

/// Arguments arrive as a JSON-encoded string; Ollama sometimes sends an object.
/// A call without a function name or with unparseable arguments fails the whole
/// completion rather than running a tool on guessed input.
fn parse_tool_calls(message: &Value) -> Result<Vec<ToolCall>> {
    let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    calls
        .iter()
        .enumerate()
        .map(|(index, call)| {
            let function = call.get("function");
            let tool_name = function
                .and_then(|function| function.get("name"))
                .and_then(Value::as_str)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| anyhow!("tool_calls[{index}] has no function name"))?
                .to_string();
            let call_id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let arguments = match function.and_then(|function| function.get("arguments")) {
                Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
                Some(Value::String(raw)) => serde_json::from_str(raw).with_context(|| {
                    format!("tool_calls[{index}] ({tool_name}) has unparseable arguments")
                })?,
                Some(value @ Value::Object(_)) => value.clone(),
                None | Some(Value::Null) => json!({}),
                Some(other) => {
                    bail!("tool_calls[{index}] ({tool_name}) has non-object arguments: {other}")
                }
            };
            Ok(ToolCall { call_id, tool_name, arguments })
        })
        .collect()
}
