//! Tool registry
//!
//! Every operation the gateway exposes over MCP is a `ToolConfig`: a name,
//! a description, a typed-field input schema, the scopes and skills that
//! gate it, and an async handler. Definitions are immutable and assembled
//! once at startup; what a given session sees is a filtered projection
//! computed per request (see `prepare`).

pub mod docs;
pub mod issues;
pub mod meta;
pub mod orgs;
pub mod prepare;
pub mod projects;
pub mod releases;
pub mod search;
pub mod seer;
pub mod teams;

use crate::context::ServerContext;
use crate::mcp::protocol::{ContentBlock, ToolAnnotations};
use crate::permissions::{Scope, Skill};
use crate::upstream::UpstreamClient;
use crate::{GatewayError, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

/// What a handler returns: a plain markdown string or explicit content parts.
pub enum ToolOutput {
    Text(String),
    Content(Vec<ContentBlock>),
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<Vec<ContentBlock>> for ToolOutput {
    fn from(content: Vec<ContentBlock>) -> Self {
        ToolOutput::Content(content)
    }
}

impl ToolOutput {
    /// Normalize into content blocks for the wire.
    pub fn into_content(self) -> Vec<ContentBlock> {
        match self {
            ToolOutput::Text(text) => vec![ContentBlock::text(text)],
            ToolOutput::Content(content) => content,
        }
    }
}

pub type ToolHandler =
    Arc<dyn Fn(Value, ServerContext) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

/// One typed field in a tool's input schema
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub required: bool,
    pub schema: Value,
}

impl Field {
    pub fn string(name: &'static str, description: &str) -> Self {
        Self {
            name,
            required: true,
            schema: json!({ "type": "string", "description": description }),
        }
    }

    pub fn optional_string(name: &'static str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::string(name, description)
        }
    }

    pub fn integer(name: &'static str, description: &str) -> Self {
        Self {
            name,
            required: false,
            schema: json!({ "type": "integer", "description": description }),
        }
    }

    pub fn string_array(name: &'static str, description: &str) -> Self {
        Self {
            name,
            required: false,
            schema: json!({
                "type": "array",
                "items": { "type": "string" },
                "description": description,
            }),
        }
    }

    pub fn enumeration(
        name: &'static str,
        description: &str,
        values: &[&str],
        required: bool,
    ) -> Self {
        Self {
            name,
            required,
            schema: json!({
                "type": "string",
                "enum": values,
                "description": description,
            }),
        }
    }
}

/// A tool's full input schema as an ordered typed-field map
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: Vec<Field>,
}

impl InputSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// The complete JSON schema, used for constraint merging.
    pub fn to_json(&self) -> Value {
        self.projected(&[])
    }

    /// A view of the schema with `hidden` fields removed. This is what the
    /// client sees and what its arguments are validated against. Unknown
    /// properties are tolerated: constraint-bound fields are absent from
    /// the projection but may still arrive from over-eager callers, and
    /// the dispatcher overwrites them anyway.
    pub fn projected(&self, hidden: &[&str]) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            if hidden.contains(&field.name) {
                continue;
            }
            properties.insert(field.name.to_string(), field.schema.clone());
            if field.required {
                required.push(Value::String(field.name.to_string()));
            }
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        })
    }
}

/// Immutable definition of one tool, created at startup
#[derive(Clone)]
pub struct ToolConfig {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: InputSchema,
    pub required_scopes: Vec<Scope>,
    pub required_skills: Vec<Skill>,
    pub annotations: ToolAnnotations,
    pub handler: ToolHandler,
}

impl std::fmt::Debug for ToolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolConfig")
            .field("name", &self.name)
            .field("required_scopes", &self.required_scopes)
            .field("required_skills", &self.required_skills)
            .finish_non_exhaustive()
    }
}

/// Wrap an async closure into the boxed handler form.
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value, ServerContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolOutput>> + Send + 'static,
{
    Arc::new(move |params, ctx| Box::pin(f(params, ctx)))
}

/// The full tool set, in the order tools are advertised.
pub fn registry() -> Vec<ToolConfig> {
    let mut tools = Vec::new();
    tools.extend(meta::tools());
    tools.extend(orgs::tools());
    tools.extend(teams::tools());
    tools.extend(projects::tools());
    tools.extend(releases::tools());
    tools.extend(issues::tools());
    tools.extend(search::tools());
    tools.extend(seer::tools());
    tools.extend(docs::tools());
    tools
}

// ============================================================================
// SHARED HANDLER HELPERS
// ============================================================================

/// Parse merged tool arguments into a typed input struct. A mismatch is the
/// caller's fault, not ours.
pub(crate) fn parse_input<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| GatewayError::user_input(format!("Invalid arguments: {}", e)))
}

/// Upstream client for a handler, honoring an explicit region override.
pub(crate) fn client_for(ctx: &ServerContext, region_url: Option<&str>) -> UpstreamClient {
    match region_url {
        Some(region) if !region.is_empty() => {
            UpstreamClient::new(region, Some(ctx.access_token.clone()))
        }
        _ => UpstreamClient::for_context(ctx),
    }
}

// Common schema fields. Constraint-bound names are fixed: the preparer and
// the dispatcher key off them.

pub(crate) fn org_field() -> Field {
    Field::string(
        "organizationSlug",
        "The organization's slug. Find it with the find_organizations tool.",
    )
}

pub(crate) fn project_field() -> Field {
    Field::string("projectSlug", "The project's slug.")
}

pub(crate) fn optional_project_field() -> Field {
    Field::optional_string("projectSlug", "The project's slug, to narrow results.")
}

pub(crate) fn project_slug_or_id_field() -> Field {
    Field::optional_string(
        "projectSlugOrId",
        "The project's slug or numeric id, to narrow results.",
    )
}

pub(crate) fn region_field() -> Field {
    Field::optional_string(
        "regionUrl",
        "The organization's region URL (from find_organizations).",
    )
}
