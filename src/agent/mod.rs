//! Embedded agent runtime
//!
//! A bounded LLM loop that can call the gateway's own tools through an
//! in-process adapter. No state survives between MCP requests; every
//! invocation rebuilds the agent from the current request context. The
//! final model output is parsed once and validated against a JSON schema;
//! an `{error}` payload from the model is re-raised as the caller's fault.

pub mod openai;

pub use openai::OpenAiChatModel;

use crate::constants::{AGENT_MAX_STEPS, AGENT_RATE_LIMIT_REQUESTS, AGENT_RATE_LIMIT_WINDOW_SECS};
use crate::context::ServerContext;
use crate::mcp::dispatcher::apply_constraints;
use crate::tools::prepare::PreparedTool;
use crate::{GatewayError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;

// ============================================================================
// MODEL HANDLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on Role::Tool messages to pair the result with its call
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool call the model asked for
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool as described to the model
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Handle to the configured LLM. The gateway only needs one operation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage>;
}

// ============================================================================
// TOOL ADAPTATION
// ============================================================================

type AgentToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

/// A registry tool re-wrapped for the agent: context bound at wrap time,
/// constraints pre-injected on each call, errors folded into an `{error}`
/// payload the model can read.
#[derive(Clone)]
pub struct AgentTool {
    pub spec: ToolSpec,
    handler: AgentToolHandler,
}

impl AgentTool {
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Value> + Send + 'static,
    {
        Self {
            spec,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    pub async fn call(&self, args: Value) -> Value {
        (self.handler)(args).await
    }
}

/// Wrap prepared tools for agent use.
pub fn adapt_tools(prepared: &[PreparedTool<'_>], ctx: &ServerContext) -> Vec<AgentTool> {
    prepared
        .iter()
        .map(|prepared_tool| {
            let tool = prepared_tool.tool.clone();
            let spec = ToolSpec {
                name: tool.name.to_string(),
                description: tool.description.to_string(),
                parameters: prepared_tool.visible_schema.clone(),
            };
            let ctx = ctx.clone();
            let handler: AgentToolHandler = Arc::new(move |args: Value| {
                let tool = tool.clone();
                let ctx = ctx.clone();
                Box::pin(async move {
                    let merged =
                        apply_constraints(args, &ctx.constraints, &tool.input_schema);
                    match (tool.handler)(merged, ctx).await {
                        Ok(output) => {
                            let text = output
                                .into_content()
                                .into_iter()
                                .filter_map(|block| match block {
                                    crate::mcp::protocol::ContentBlock::Text { text } => {
                                        Some(text)
                                    }
                                    _ => None,
                                })
                                .collect::<Vec<_>>()
                                .join("\n");
                            Value::String(text)
                        }
                        Err(e) => json!({ "error": e.to_string() }),
                    }
                })
            });
            AgentTool { spec, handler }
        })
        .collect()
}

// ============================================================================
// THE LOOP
// ============================================================================

/// A tool call observed during an agent run
#[derive(Debug, Clone, serde::Serialize)]
pub struct CapturedToolCall {
    pub tool_name: String,
    pub args: Value,
}

#[derive(Debug)]
pub struct AgentOutcome {
    pub result: Value,
    pub tool_calls: Vec<CapturedToolCall>,
}

/// Run the embedded agent: at most `AGENT_MAX_STEPS` model calls, tool calls
/// executed and captured in between, final output validated against
/// `output_schema`.
pub async fn call_embedded_agent(
    model: &dyn ChatModel,
    system: &str,
    prompt: &str,
    tools: &[AgentTool],
    output_schema: &Value,
) -> Result<AgentOutcome> {
    let validator = jsonschema::validator_for(output_schema)
        .map_err(|e| GatewayError::internal(format!("Invalid agent output schema: {}", e)))?;

    let system = format!(
        "{}\n\nWhen you have your answer, respond with a single JSON object matching \
         the required output schema, and nothing else:\n{}",
        system, output_schema
    );

    let mut messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
    let specs: Vec<ToolSpec> = tools.iter().map(|t| t.spec.clone()).collect();
    let mut captured: Vec<CapturedToolCall> = Vec::new();

    for _step in 0..AGENT_MAX_STEPS {
        let reply = model
            .complete(ChatRequest {
                messages: messages.clone(),
                tools: specs.clone(),
            })
            .await?;

        if !reply.tool_calls.is_empty() {
            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                captured.push(CapturedToolCall {
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                });
                let result = match tools.iter().find(|t| t.spec.name == call.name) {
                    Some(tool) => tool.call(call.arguments.clone()).await,
                    None => json!({ "error": format!("Unknown tool: {}", call.name) }),
                };
                let rendered = match &result {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                messages.push(ChatMessage::tool_result(call.id.clone(), rendered));
            }
            continue;
        }

        let content = reply.content.unwrap_or_default();
        let parsed = parse_json_output(&content)?;

        // The model signalling bad user input wins over schema validation.
        if let Some(error) = parsed.get("error").and_then(|e| e.as_str()) {
            return Err(GatewayError::user_input(error.to_string()));
        }

        if !validator.is_valid(&parsed) {
            let details: Vec<String> = validator
                .iter_errors(&parsed)
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            return Err(GatewayError::user_input(format!(
                "Agent output failed validation:\n  - {}",
                details.join("\n  - ")
            )));
        }

        return Ok(AgentOutcome {
            result: parsed,
            tool_calls: captured,
        });
    }

    Err(GatewayError::internal(format!(
        "Agent did not produce a final answer within {} steps",
        AGENT_MAX_STEPS
    )))
}

/// Parse the model's final message as JSON, tolerating a markdown fence.
fn parse_json_output(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(trimmed).map_err(|e| {
        GatewayError::user_input(format!("Agent produced non-JSON output: {}", e))
    })
}

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Rate-limit key: hex of the first 16 bytes of SHA-256 of the access token.
pub fn rate_limit_key(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    format!("ratelimit:agent:{}", hex::encode(&digest[..16]))
}

/// One counter bump per chat request. Backend failures fail open; being over
/// the limit is the caller's problem.
pub async fn check_rate_limit(ctx: &ServerContext) -> Result<()> {
    let Some(kv) = &ctx.services.kv else {
        return Ok(());
    };
    let key = rate_limit_key(&ctx.access_token);
    let window = std::time::Duration::from_secs(AGENT_RATE_LIMIT_WINDOW_SECS as u64);
    match kv.increment(&key, window).await {
        Ok(count) if count > AGENT_RATE_LIMIT_REQUESTS => Err(GatewayError::user_input(
            "You have exceeded the rate limit for AI-powered requests. \
             Please wait a minute and try again.",
        )),
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!("rate limiter unavailable, failing open: {}", e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod agent_test;
