//! Stateless MCP dispatcher
//!
//! One JSON-RPC request in, one response out. Tool visibility and schemas
//! are projected per request from the caller's context; constraints from
//! the URL path are merged over the caller's arguments before a handler
//! runs (constraints win - that is the security boundary). Handler errors
//! never leave as protocol errors: they become `isError` tool results with
//! a human-readable explanation.

use super::protocol::*;
use super::{prompts, resources};
use crate::context::{Constraints, ServerContext};
use crate::tools::prepare::{PreparedTool, prepare};
use crate::tools::{InputSchema, ToolConfig};
use crate::{GatewayError, telemetry};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// A protocol-level failure, paired with the request id by `handle`.
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

/// Merge constraint values over caller-provided arguments, for every
/// constraint whose target field exists in the tool's full schema. The
/// caller's value, if any, is discarded. `projectSlug` falls back to the
/// `projectSlugOrId` field when the schema has only the latter.
pub fn apply_constraints(params: Value, constraints: &Constraints, schema: &InputSchema) -> Value {
    let mut merged = match params {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    if let Some(org) = &constraints.organization_slug
        && schema.contains("organizationSlug")
    {
        merged.insert("organizationSlug".to_string(), json!(org));
    }
    if let Some(project) = &constraints.project_slug {
        if schema.contains("projectSlug") {
            merged.insert("projectSlug".to_string(), json!(project));
        } else if schema.contains("projectSlugOrId") {
            merged.insert("projectSlugOrId".to_string(), json!(project));
        }
    }
    if let Some(region) = &constraints.region_url
        && schema.contains("regionUrl")
    {
        merged.insert("regionUrl".to_string(), json!(region));
    }

    Value::Object(merged)
}

/// Format a handler error into the text block the agent sees.
///
/// User-input errors are never logged. Configuration problems are logged at
/// warn. Upstream 5xx and unexpected errors get a logged event id that is
/// echoed into the message so users can reference it.
pub fn format_tool_error(err: &GatewayError) -> String {
    match err {
        GatewayError::UserInput(message) => format!(
            "**Input Error**\n\n{}\n\nYou may be able to resolve this by fixing the \
             input and calling the tool again.",
            message
        ),
        GatewayError::Config(message) => {
            tracing::warn!("configuration error in tool call: {}", message);
            format!("**Configuration Error**\n\n{}", message)
        }
        GatewayError::Network(network) => {
            tracing::warn!("network error in tool call: {}", network);
            format!("**Configuration Error**\n\n{}", network)
        }
        GatewayError::Api { status, message } => {
            if *status >= 500 {
                let event_id = uuid::Uuid::new_v4();
                tracing::error!(event_id = %event_id, status, "upstream server error: {}", message);
                format!(
                    "**Error**\n\nHTTP {}: {}\n\n**Event ID**: {}",
                    status, message, event_id
                )
            } else {
                format!("**Error**\n\nHTTP {}: {}", status, message)
            }
        }
        other => {
            let event_id = uuid::Uuid::new_v4();
            tracing::error!(event_id = %event_id, "tool call failed: {}", other);
            format!("**Error**\n\n{}\n\n**Event ID**: {}", other, event_id)
        }
    }
}

/// The stateless request handler. Holds only the immutable tool registry.
#[derive(Clone)]
pub struct Dispatcher {
    tools: Arc<Vec<ToolConfig>>,
    server_version: &'static str,
}

impl Dispatcher {
    pub fn new(tools: Vec<ToolConfig>) -> Self {
        Self {
            tools: Arc::new(tools),
            server_version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn tools(&self) -> &[ToolConfig] {
        &self.tools
    }

    /// Handle one JSON-RPC message. Notifications (no id) produce no
    /// response.
    pub async fn handle(
        &self,
        ctx: &ServerContext,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        let id = request.id.clone()?;

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(ctx, request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(ctx),
            "tools/call" => self.call_tool(ctx, request.params).await,
            "prompts/list" => Ok(serde_json::to_value(ListPromptsResult {
                prompts: prompts::list(),
            })
            .unwrap_or_default()),
            "prompts/get" => self.get_prompt(ctx, request.params),
            "resources/list" => Ok(serde_json::to_value(ListResourcesResult {
                resources: resources::list(),
            })
            .unwrap_or_default()),
            "resources/read" => self.read_resource(ctx, request.params).await,
            other => Err(RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {}", other),
            }),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, e.code, e.message),
        })
    }

    fn initialize(
        &self,
        ctx: &ServerContext,
        params: Value,
    ) -> std::result::Result<Value, RpcError> {
        let params: InitializeParams = serde_json::from_value(params).unwrap_or(InitializeParams {
            protocol_version: None,
            client_info: None,
            capabilities: Value::Null,
        });

        // Echo the client's revision when we speak it, otherwise offer the
        // newest one we do.
        let protocol_version = params
            .protocol_version
            .as_deref()
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(LATEST_PROTOCOL_VERSION)
            .to_string();

        if let Some(client) = &params.client_info {
            tracing::debug!(
                client_name = %client.name,
                client_version = client.version.as_deref().unwrap_or(""),
                user_id = ctx.user_id.as_deref().unwrap_or(""),
                "mcp initialize"
            );
        }

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(json!({})),
                prompts: Some(json!({})),
                resources: Some(json!({})),
            },
            server_info: Implementation {
                name: "sentry-mcp".to_string(),
                version: Some(self.server_version.to_string()),
            },
            instructions: Some(
                "Use these tools to inspect and triage Sentry issues on the user's behalf."
                    .to_string(),
            ),
        };
        Ok(serde_json::to_value(result).unwrap_or_default())
    }

    fn list_tools(&self, ctx: &ServerContext) -> std::result::Result<Value, RpcError> {
        let prepared = prepare(&self.tools, ctx);
        let tools = prepared
            .iter()
            .map(|p| ToolDescriptor {
                name: p.tool.name.to_string(),
                description: p.tool.description.to_string(),
                input_schema: p.visible_schema.clone(),
                annotations: Some(p.tool.annotations),
            })
            .collect();
        Ok(serde_json::to_value(ListToolsResult { tools }).unwrap_or_default())
    }

    async fn call_tool(
        &self,
        ctx: &ServerContext,
        params: Value,
    ) -> std::result::Result<Value, RpcError> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))?;

        let prepared = prepare(&self.tools, ctx);
        let Some(found) = prepared.iter().find(|p| p.tool.name == params.name) else {
            return Err(RpcError::invalid_params(format!(
                "Unknown tool: {}",
                params.name
            )));
        };

        let arguments = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };

        // Validate what the caller sent against what the caller was shown.
        if let Err(messages) = validate_arguments(&found.visible_schema, &arguments) {
            return Err(RpcError::invalid_params(format!(
                "Invalid arguments for {}:\n  - {}",
                params.name,
                messages.join("\n  - ")
            )));
        }

        let merged = apply_constraints(arguments, &ctx.constraints, &found.tool.input_schema);
        let result = self.run_tool(ctx, found, merged).await;
        Ok(serde_json::to_value(result).unwrap_or_default())
    }

    async fn run_tool(
        &self,
        ctx: &ServerContext,
        prepared: &PreparedTool<'_>,
        merged: Value,
    ) -> CallToolResult {
        let tool = prepared.tool;
        let span = tracing::info_span!(
            "tools/call",
            otel.name = format!("tools/call {}", tool.name),
            tool = tool.name,
            user_id = ctx.user_id.as_deref().unwrap_or(""),
            client_id = %ctx.client_id,
        );

        let handler = tool.handler.clone();
        let handler_ctx = ctx.clone();
        let tool_name = tool.name;
        async move {
            if let Some(arguments) = merged.as_object() {
                for (key, value) in arguments {
                    tracing::debug!(
                        "mcp.request.argument.{} = {}",
                        key,
                        serde_json::to_string(value).unwrap_or_default()
                    );
                }
            }

            let started = Instant::now();
            let outcome = handler(merged, handler_ctx).await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(output) => {
                    telemetry::record_tool_call(tool_name, "ok", elapsed);
                    CallToolResult {
                        content: output.into_content(),
                        is_error: false,
                    }
                }
                Err(e) => {
                    telemetry::record_tool_call(tool_name, "error", elapsed);
                    CallToolResult::error_text(format_tool_error(&e))
                }
            }
        }
        .instrument(span)
        .await
    }

    fn get_prompt(&self, ctx: &ServerContext, params: Value) -> std::result::Result<Value, RpcError> {
        let params: GetPromptParams = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))?;

        let span = tracing::info_span!(
            "prompts/get",
            otel.name = format!("prompts/get {}", params.name),
            prompt = %params.name,
            user_id = ctx.user_id.as_deref().unwrap_or(""),
            client_id = %ctx.client_id,
        );
        let _guard = span.enter();

        prompts::get(&params.name, &params.arguments)
            .map(|result| serde_json::to_value(result).unwrap_or_default())
            .map_err(|e| RpcError::invalid_params(e.to_string()))
    }

    async fn read_resource(
        &self,
        ctx: &ServerContext,
        params: Value,
    ) -> std::result::Result<Value, RpcError> {
        let params: ReadResourceParams = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))?;

        let span = tracing::info_span!(
            "resources/read",
            otel.name = format!("resources/read {}", params.uri),
            uri = %params.uri,
            user_id = ctx.user_id.as_deref().unwrap_or(""),
            client_id = %ctx.client_id,
        );

        let uri = params.uri.clone();
        async move {
            match resources::read(&uri).await {
                Ok(contents) => Ok(serde_json::to_value(ReadResourceResult {
                    contents: vec![contents],
                })
                .unwrap_or_default()),
                Err(e) => Err(RpcError::invalid_params(e.to_string())),
            }
        }
        .instrument(span)
        .await
    }
}

/// Validate caller arguments against the projected schema, collecting every
/// violation.
fn validate_arguments(schema: &Value, arguments: &Value) -> std::result::Result<(), Vec<String>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => return Err(vec![format!("schema compilation failed: {}", e)]),
    };
    if validator.is_valid(arguments) {
        return Ok(());
    }
    Err(validator
        .iter_errors(arguments)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect())
}

#[cfg(test)]
mod dispatcher_test;
