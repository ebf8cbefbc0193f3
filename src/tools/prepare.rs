//! Per-session tool projection
//!
//! Given the full registry and a request context, compute which tools the
//! session may see and what each tool's schema looks like with
//! constraint-bound fields hidden. Scope and skill gating happens here;
//! this is the authorization boundary for tool visibility.

use super::ToolConfig;
use crate::context::ServerContext;
use crate::permissions::{Scope, base_scopes};
use serde_json::Value;
use std::collections::BTreeSet;

/// A tool the current session is allowed to call, with the schema it is
/// allowed to see.
pub struct PreparedTool<'a> {
    pub tool: &'a ToolConfig,
    pub visible_schema: Value,
}

/// Effective scopes: the base set plus the required scopes of every tool
/// unlocked by a granted skill.
pub fn effective_scopes(tools: &[ToolConfig], ctx: &ServerContext) -> BTreeSet<Scope> {
    let mut scopes = base_scopes();
    scopes.extend(ctx.granted_scopes.iter().copied());
    for tool in tools {
        let unlocked = tool
            .required_skills
            .iter()
            .any(|skill| ctx.granted_skills.contains(skill));
        if unlocked {
            scopes.extend(tool.required_scopes.iter().copied());
        }
    }
    scopes
}

/// Fields hidden from a schema because a constraint pins them.
fn hidden_fields(ctx: &ServerContext) -> Vec<&'static str> {
    let mut hidden = Vec::new();
    if ctx.constraints.organization_slug.is_some() {
        hidden.push("organizationSlug");
    }
    if ctx.constraints.project_slug.is_some() {
        hidden.push("projectSlug");
        hidden.push("projectSlugOrId");
    }
    if ctx.constraints.region_url.is_some() {
        hidden.push("regionUrl");
    }
    hidden
}

/// Filter and project the registry for one session, preserving registry
/// order.
pub fn prepare<'a>(tools: &'a [ToolConfig], ctx: &ServerContext) -> Vec<PreparedTool<'a>> {
    let scopes = effective_scopes(tools, ctx);
    let hidden = hidden_fields(ctx);

    tools
        .iter()
        .filter(|tool| {
            tool.required_scopes
                .iter()
                .all(|scope| scopes.contains(scope))
        })
        .map(|tool| {
            // Only hide fields the tool actually declares.
            let applicable: Vec<&str> = hidden
                .iter()
                .copied()
                .filter(|name| tool.input_schema.contains(name))
                .collect();
            PreparedTool {
                tool,
                visible_schema: tool.input_schema.projected(&applicable),
            }
        })
        .collect()
}
