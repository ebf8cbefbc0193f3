//! Identity and orchestrator tools

use super::*;
use crate::agent;
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::Skill;
use crate::tools::prepare::prepare;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

pub fn tools() -> Vec<ToolConfig> {
    vec![whoami(), use_sentry()]
}

fn whoami() -> ToolConfig {
    ToolConfig {
        name: "whoami",
        description: "Identify the authenticated Sentry user.",
        input_schema: InputSchema::empty(),
        required_scopes: vec![],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|_params, ctx| async move {
            let client = UpstreamClient::for_context(&ctx);
            let user = client.get_authenticated_user().await?;

            Ok(format!(
                "You are **{}** (id: {}){}",
                user.name.as_deref().unwrap_or("unknown"),
                user.id_string(),
                user.email
                    .as_deref()
                    .map(|e| format!("\n**Email**: {}", e))
                    .unwrap_or_default()
            )
            .into())
        }),
    }
}

const ORCHESTRATOR_SYSTEM: &str = "You are an assistant operating Sentry on the user's \
behalf. Use the available tools to fulfil the request, then summarize what you found \
or did in markdown. Prefer a small number of precise tool calls. If the request \
cannot be completed with the available tools, respond with {\"error\": \"<why>\"}.";

/// Final output of the orchestrator agent
#[derive(Debug, Deserialize, JsonSchema)]
struct OrchestratorOutput {
    /// Markdown summary answering the user's request
    answer: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UseSentryInput {
    request: String,
}

fn use_sentry() -> ToolConfig {
    ToolConfig {
        name: "use_sentry",
        description: "Describe what you want in plain language and an embedded agent will \
                      drive the other Sentry tools to do it.",
        input_schema: InputSchema::new(vec![Field::string(
            "request",
            "What you want done, e.g. 'summarize the top crashes in acme/web this week'.",
        )]),
        required_scopes: vec![],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: UseSentryInput = parse_input(&params)?;

            if !ctx.agent_mode {
                return Err(GatewayError::user_input(
                    "use_sentry is only available when the MCP endpoint URL carries the \
                     agent=1 query flag.",
                ));
            }
            let Some(model) = ctx.services.chat_model.clone() else {
                return Err(GatewayError::config(
                    "use_sentry requires OPENAI_API_KEY to be configured.",
                ));
            };
            agent::check_rate_limit(&ctx).await?;

            // Hand the agent everything this session may use, minus itself.
            let registry = super::registry();
            let prepared: Vec<_> = prepare(&registry, &ctx)
                .into_iter()
                .filter(|p| p.tool.name != "use_sentry")
                .collect();
            let tools = agent::adapt_tools(&prepared, &ctx);

            let schema = serde_json::to_value(schemars::schema_for!(OrchestratorOutput))?;
            let outcome = agent::call_embedded_agent(
                model.as_ref(),
                ORCHESTRATOR_SYSTEM,
                &input.request,
                &tools,
                &schema,
            )
            .await?;

            let output: OrchestratorOutput = serde_json::from_value(outcome.result)
                .map_err(|e| GatewayError::internal(format!("bad agent output: {}", e)))?;

            let mut out = output.answer;
            if !outcome.tool_calls.is_empty() {
                out.push_str("\n\n---\n**Tools used**: ");
                let names: Vec<String> = outcome
                    .tool_calls
                    .iter()
                    .map(|call| {
                        format!(
                            "{}({})",
                            call.tool_name,
                            serde_json::to_string(&call.args).unwrap_or_else(|_| json!({}).to_string())
                        )
                    })
                    .collect();
                out.push_str(&names.join(", "));
            }
            Ok(out.into())
        }),
    }
}
