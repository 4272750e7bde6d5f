//! LLM client for OpenAI-compatible chat completion endpoints with tool calling.
//!
//! The default endpoint is Gemini's OpenAI-compatible surface, but any server
//! speaking the `/chat/completions` protocol works.

use crate::config::LlmConfig;
use crate::error::{InsightsError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Function definition advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String, // JSON string
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: default_tool_type(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// Message in OpenAI chat format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    fn with_content(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content("assistant", content)
    }

    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }
}

/// One model turn: a final answer, a request to run tools, or a reply that
/// could not be interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    Answer(String),
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// Empty reply or malformed tool calls; the reason is fed back to the model
    Unparseable(String),
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: &[FunctionDefinition],
    ) -> Result<ModelTurn>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.0,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| InsightsError::Config("No LLM API key configured".to_string()))?;
        Ok(
            Self::new(api_key, config.model.clone(), config.base_url.clone())
                .with_temperature(config.temperature),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[LlmMessage], tools: &[FunctionDefinition]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|f| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": f.name,
                                "description": f.description,
                                "parameters": f.parameters,
                            }
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: &[FunctionDefinition],
    ) -> Result<ModelTurn> {
        let body = self.request_body(messages, tools);
        debug!("Calling {} with {} messages", self.model, messages.len());

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightsError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InsightsError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| InsightsError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        parse_turn(&response_json)
    }
}

/// Extract the first choice of a chat completion response.
///
/// API error payloads and responses without choices are errors. A message
/// that is empty or carries malformed tool calls is returned as
/// [`ModelTurn::Unparseable`] so the caller can ask the model again.
pub fn parse_turn(response_json: &Value) -> Result<ModelTurn> {
    if let Some(error) = response_json.get("error") {
        return Err(InsightsError::Llm(format!("LLM API error: {}", error)));
    }

    let message = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| InsightsError::Llm("No choices in LLM response".to_string()))?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .filter(|c| !c.trim().is_empty());

    let calls: Vec<ToolCall> = match message.get("tool_calls") {
        Some(Value::Array(raw)) if !raw.is_empty() => {
            match serde_json::from_value(Value::Array(raw.clone())) {
                Ok(calls) => calls,
                Err(e) => {
                    return Ok(ModelTurn::Unparseable(format!("malformed tool calls ({})", e)));
                }
            }
        }
        _ => Vec::new(),
    };

    if !calls.is_empty() {
        return Ok(ModelTurn::ToolCalls { content, calls });
    }

    Ok(match content {
        Some(answer) => ModelTurn::Answer(answer),
        None => ModelTurn::Unparseable("neither content nor tool calls".to_string()),
    })
}
