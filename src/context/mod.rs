//! Per-request server context and the task-local store that carries it
//!
//! Every MCP request resolves one immutable `ServerContext` at entry. Tool
//! handlers receive it explicitly; code that cannot be threaded (tools
//! re-wrapped for the embedded agent, prompt handlers) reads it back from
//! the task-local store. Concurrent requests are isolated by construction,
//! nested scopes stack, and outside any scope the empty context is observed.

use crate::model::ProjectCapabilities;
use crate::permissions::{Scope, Skill};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;

/// Org/project/region restriction derived from the URL path and verified
/// against the upstream. Overrides user-supplied parameters of the same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub organization_slug: Option<String>,
    pub project_slug: Option<String>,
    pub region_url: Option<String>,
    pub project_capabilities: Option<ProjectCapabilities>,
}

impl Constraints {
    /// Build constraints from the `/mcp/{org}/{project}` path segments.
    ///
    /// A project without an organization is rejected upstream of this call
    /// by routing; the constructor still guards the invariant.
    pub fn from_path(org: Option<String>, project: Option<String>) -> Self {
        let organization_slug = org.filter(|s| !s.is_empty());
        let project_slug = if organization_slug.is_some() {
            project.filter(|s| !s.is_empty())
        } else {
            None
        };
        Self {
            organization_slug,
            project_slug,
            region_url: None,
            project_capabilities: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.organization_slug.is_none() && self.project_slug.is_none()
    }
}

/// Shared process services reachable from tool handlers. Both are optional:
/// a context built without them simply has the dependent features disabled.
#[derive(Clone, Default)]
pub struct Services {
    pub kv: Option<std::sync::Arc<dyn crate::storage::KvStore>>,
    pub chat_model: Option<std::sync::Arc<dyn crate::agent::ChatModel>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("kv", &self.kv.is_some())
            .field("chat_model", &self.chat_model.is_some())
            .finish()
    }
}

/// Everything a tool handler may need about the current request.
///
/// Created at the entry of every MCP request, immutable thereafter.
#[derive(Debug, Clone, Default)]
pub struct ServerContext {
    pub user_id: Option<String>,
    pub client_id: String,
    /// Upstream access token for this request
    pub access_token: String,
    /// Upstream hostname (or a region URL once constraints are verified)
    pub upstream_host: String,
    /// Public URL of this gateway's MCP endpoint
    pub mcp_url: Option<String>,
    pub granted_scopes: BTreeSet<Scope>,
    pub granted_skills: BTreeSet<Skill>,
    pub constraints: Constraints,
    pub mcp_client_name: Option<String>,
    pub mcp_client_version: Option<String>,
    pub mcp_protocol_version: Option<String>,
    /// Set when the request carried the `agent=1` query flag
    pub agent_mode: bool,
    /// Process-wide services (rate counter, embedded-agent model)
    pub services: Services,
}

impl ServerContext {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.granted_scopes.contains(&scope)
    }

    pub fn has_skill(&self, skill: Skill) -> bool {
        self.granted_skills.contains(&skill)
    }

    /// Host to aim upstream calls at: the verified region URL when one is
    /// known, the configured host otherwise.
    pub fn api_host(&self) -> &str {
        self.constraints
            .region_url
            .as_deref()
            .unwrap_or(&self.upstream_host)
    }
}

tokio::task_local! {
    static SERVER_CONTEXT: ServerContext;
}

/// Execute `fut` with `ctx` observable from any code it reaches.
pub async fn run<F>(ctx: ServerContext, fut: F) -> F::Output
where
    F: Future,
{
    SERVER_CONTEXT.scope(ctx, fut).await
}

/// The context of the current request, or the empty context outside any
/// `run` scope.
pub fn current() -> ServerContext {
    SERVER_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Whether a request context is currently in scope.
pub fn in_request() -> bool {
    SERVER_CONTEXT.try_with(|_| ()).is_ok()
}
