//! Data model for the gateway
//!
//! Upstream REST payloads plus the records the gateway itself issues and
//! stores. Deserializing an upstream response into its typed struct is the
//! per-endpoint response validation: a serde failure is an internal error,
//! distinct from an upstream API error.

use crate::permissions::{Scope, Skill};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// UPSTREAM PAYLOADS
// ============================================================================

/// The authenticated upstream user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: serde_json::Value,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// Upstream ids arrive as either strings or numbers.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A storage region on the SaaS deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionsResponse {
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationLinks {
    #[serde(default)]
    pub region_url: Option<String>,
    #[serde(default)]
    pub organization_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: serde_json::Value,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub links: Option<OrganizationLinks>,
}

impl Organization {
    pub fn region_url(&self) -> Option<&str> {
        self.links.as_ref()?.region_url.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: serde_json::Value,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub has_profiles: Option<bool>,
    #[serde(default)]
    pub has_replays: Option<bool>,
    #[serde(default)]
    pub has_logs: Option<bool>,
    #[serde(default)]
    pub first_transaction_event: Option<bool>,
}

/// Feature availability derived from a verified project.
///
/// Missing upstream fields default to false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCapabilities {
    pub profiles: bool,
    pub replays: bool,
    pub logs: bool,
    pub traces: bool,
}

impl From<&Project> for ProjectCapabilities {
    fn from(project: &Project) -> Self {
        Self {
            profiles: project.has_profiles == Some(true),
            replays: project.has_replays == Some(true),
            logs: project.has_logs == Some(true),
            traces: project.first_transaction_event == Some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: serde_json::Value,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientKeyDsn {
    pub public: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientKey {
    pub id: serde_json::Value,
    #[serde(default)]
    pub name: Option<String>,
    pub dsn: ClientKeyDsn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version: String,
    #[serde(default)]
    pub short_version: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub new_groups: Option<u64>,
    #[serde(default)]
    pub projects: Vec<ReleaseProject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseProject {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDef {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub total_values: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: serde_json::Value,
    pub short_id: String,
    pub title: String,
    #[serde(default)]
    pub culprit: Option<String>,
    pub status: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub count: Option<serde_json::Value>,
    #[serde(default)]
    pub user_count: Option<u64>,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<serde_json::Value>,
}

/// An individual error event. Entries carry arbitrary interface payloads
/// (exception, breadcrumbs, request) so they stay untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(alias = "eventID")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub tags: Vec<EventTag>,
    #[serde(default)]
    pub entries: Vec<serde_json::Value>,
    #[serde(default)]
    pub contexts: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAttachment {
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default, rename = "type")]
    pub attachment_type: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A downloaded attachment: metadata plus the raw payload.
#[derive(Debug, Clone)]
pub struct AttachmentDownload {
    pub metadata: EventAttachment,
    pub filename: String,
    pub bytes: bytes::Bytes,
}

/// State of a Seer autofix run. Step payloads stay untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutofixState {
    #[serde(default)]
    pub autofix: Option<AutofixRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofixRun {
    #[serde(default)]
    pub run_id: Option<serde_json::Value>,
    pub status: String,
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutofixStartResponse {
    #[serde(default)]
    pub run_id: Option<serde_json::Value>,
}

/// The result page of an events/spans/logs search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSearchResponse {
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Error body the upstream uses for most 4xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub detail: String,
}

// ============================================================================
// GATEWAY RECORDS
// ============================================================================

/// A dynamically registered MCP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub id: String,
    pub secret: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything bound to an issued MCP token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGrant {
    pub user_id: String,
    pub user_name: Option<String>,
    pub client_id: String,
    /// Upstream access token acted with on the user's behalf
    pub access_token: String,
    /// The scope string the MCP client originally requested
    pub scope: String,
    pub granted_scopes: BTreeSet<Scope>,
    pub granted_skills: BTreeSet<Skill>,
    pub issued_at: DateTime<Utc>,
}

/// One-time authorization code pending exchange at /oauth/token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub grant: AuthGrant,
    pub created_at: DateTime<Utc>,
}

/// The original MCP-client authorize request, carried opaquely through the
/// upstream round trip as the `state` parameter (base64 JSON). Must survive
/// the trip intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTransitState {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Cached result of a successful constraint verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedConstraints {
    pub region_url: Option<String>,
    pub project_capabilities: Option<ProjectCapabilities>,
    pub cached_at: DateTime<Utc>,
}
