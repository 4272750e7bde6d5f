//! Tool-calling agent
//!
//! Relays between a tool-calling chat model and the query tool. The model
//! decides which queries to run and writes the answer; this loop only
//! forwards tool calls, feeds results back and enforces the turn budget.

use crate::agent::collaborator::Collaborator;
use crate::agent::memory::{ChatMessage, Role};
use crate::agent::tools::{QueryTool, QUERY_TOOL_NAME};
use crate::config::AgentLimits;
use crate::error::{InsightsError, Result};
use crate::llm::{ChatModel, LlmMessage, ModelTurn, ToolCall};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STOPPED_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

pub struct ToolCallingAgent {
    model: Arc<dyn ChatModel>,
    tool: Arc<QueryTool>,
    limits: AgentLimits,
}

impl ToolCallingAgent {
    pub fn new(model: Arc<dyn ChatModel>, tool: Arc<QueryTool>, limits: AgentLimits) -> Self {
        Self { model, tool, limits }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a retail data analyst. Answer the user's questions about the retail sales \
             datasets by querying them with the `{}` tool, then summarize what the results show.\n\
             Quote column names that contain spaces or punctuation with double quotes.\n\
             If a query fails, read the error, fix the SQL and try again.\n\n\
             Tables:\n{}",
            QUERY_TOOL_NAME,
            self.tool.catalog().describe()
        )
    }

    async fn run_loop(&self, input: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(LlmMessage::system(self.system_prompt()));
        messages.extend(history.iter().map(|m| match m.role {
            Role::User => LlmMessage::user(m.content.clone()),
            Role::Assistant => LlmMessage::assistant(m.content.clone()),
        }));
        messages.push(LlmMessage::user(input));

        let tools = vec![self.tool.spec().to_function_definition()];

        for iteration in 1..=self.limits.max_iterations {
            debug!("Agent iteration {}/{}", iteration, self.limits.max_iterations);
            let turn = self
                .model
                .complete(&messages, &tools)
                .await
                .map_err(|e| {
                    InsightsError::Reasoning(format!("model turn {} failed: {}", iteration, e))
                })?;
            match turn {
                ModelTurn::Answer(answer) => {
                    info!("🧠 Answer ready after {} iteration(s)", iteration);
                    return Ok(answer);
                }
                ModelTurn::ToolCalls { content, calls } => {
                    messages.push(LlmMessage::assistant_tool_calls(content, calls.clone()));
                    for call in &calls {
                        let output = self.dispatch(call);
                        messages.push(LlmMessage::tool(&call.id, output));
                    }
                }
                ModelTurn::Unparseable(reason) => {
                    warn!("Unparseable model turn {}: {}", iteration, reason);
                    messages.push(LlmMessage::user(format!(
                        "Invalid or empty response: {}. Call `{}` with a SQL query, or answer \
                         the question in plain text.",
                        reason, QUERY_TOOL_NAME
                    )));
                }
            }
        }

        warn!("Agent hit the iteration limit ({})", self.limits.max_iterations);
        Ok(STOPPED_MESSAGE.to_string())
    }

    /// Malformed calls are answered with text so the model can correct itself.
    fn dispatch(&self, call: &ToolCall) -> String {
        if call.function.name != QUERY_TOOL_NAME {
            warn!("Model asked for unknown tool '{}'", call.function.name);
            return format!(
                "{} is not a valid tool, try one of [{}].",
                call.function.name, QUERY_TOOL_NAME
            );
        }
        self.tool.call(&call.function.arguments)
    }
}

#[async_trait]
impl Collaborator for ToolCallingAgent {
    async fn invoke(&self, input: &str, history: &[ChatMessage]) -> Result<String> {
        let limit = self.limits.max_execution_time;
        match tokio::time::timeout(limit, self.run_loop(input, history)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Agent hit the time limit ({:?})", limit);
                Ok(STOPPED_MESSAGE.to_string())
            }
        }
    }
}
