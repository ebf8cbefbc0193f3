//! Seer (autofix) tools

use super::*;
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::{Scope, Skill};
use serde::Deserialize;

pub fn tools() -> Vec<ToolConfig> {
    vec![begin_seer_issue_fix(), get_seer_issue_fix_status()]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BeginFixInput {
    organization_slug: String,
    issue_id: String,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn begin_seer_issue_fix() -> ToolConfig {
    ToolConfig {
        name: "begin_seer_issue_fix",
        description: "Start a Seer root-cause analysis and fix for an issue. Seer runs \
                      asynchronously; poll get_seer_issue_fix_status for progress.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string("issueId", "The issue id or short id to analyze."),
            Field::optional_string("eventId", "Analyze this specific event."),
            Field::optional_string("instruction", "Extra guidance for the analysis."),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventWrite],
        required_skills: vec![Skill::Seer],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: BeginFixInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let started = client
                .start_autofix(
                    &input.organization_slug,
                    &input.issue_id,
                    input.event_id.as_deref(),
                    input.instruction.as_deref(),
                )
                .await?;

            let run = started
                .run_id
                .map(|id| format!(" (run {})", id))
                .unwrap_or_default();
            Ok(format!(
                "# Seer analysis started{}\n\nIssue **{}** is being analyzed. \
                 Check progress with get_seer_issue_fix_status.",
                run, input.issue_id
            )
            .into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixStatusInput {
    organization_slug: String,
    issue_id: String,
    #[serde(default)]
    region_url: Option<String>,
}

fn get_seer_issue_fix_status() -> ToolConfig {
    ToolConfig {
        name: "get_seer_issue_fix_status",
        description: "Check the status of a Seer analysis for an issue.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string("issueId", "The issue id or short id."),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventRead],
        required_skills: vec![Skill::Seer],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FixStatusInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let state = client
                .get_autofix_state(&input.organization_slug, &input.issue_id)
                .await?;

            let Some(run) = state.autofix else {
                return Ok(format!(
                    "No Seer analysis found for issue **{}**. Start one with \
                     begin_seer_issue_fix.",
                    input.issue_id
                )
                .into());
            };

            let mut out = format!(
                "# Seer status for **{}**\n\n**Status**: {}\n",
                input.issue_id, run.status
            );
            for step in &run.steps {
                let title = step.get("title").and_then(|t| t.as_str()).unwrap_or("step");
                let status = step
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown");
                out.push_str(&format!("- {} [{}]\n", title, status));

                // Completed steps may carry Seer's conclusions.
                if let Some(insights) = step.get("insights").and_then(|i| i.as_array()) {
                    for insight in insights {
                        if let Some(text) = insight.get("insight").and_then(|t| t.as_str()) {
                            out.push_str(&format!("  - {}\n", text));
                        }
                    }
                }
            }
            Ok(out.into())
        }),
    }
}
