//! Typed client for the upstream error-tracking REST API
//!
//! One instance per request, cheap to construct. All requests go to
//! `https://{host}/api/0{path}`; a host override retargets a clone at a
//! region-specific host discovered at runtime. Servers that answer HTML
//! where JSON is expected, and DNS/TCP failures, are mapped to the
//! gateway's error taxonomy rather than surfacing as raw transport errors.

pub mod query;
pub mod urls;

use crate::constants::API_PREFIX;
use crate::context::ServerContext;
use crate::error::NetworkError;
use crate::model::*;
use crate::{GatewayError, Result};
use query::{Dataset, SearchParams};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Message substituted for the upstream's multi-project-access errors
const MULTI_PROJECT_ACCESS_MESSAGE: &str =
    "You do not have access to query across multiple projects. Please select a project for your query.";

/// Parameters for `list_issues`
#[derive(Debug, Clone, Default)]
pub struct ListIssuesParams {
    pub organization_slug: String,
    pub project_slug: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<IssueSortBy>,
}

/// Issue list ordering. Serialized in a dedicated `sort` query parameter,
/// never embedded in the search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSortBy {
    User,
    Freq,
    Date,
    New,
}

impl IssueSortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSortBy::User => "user",
            IssueSortBy::Freq => "freq",
            IssueSortBy::Date => "date",
            IssueSortBy::New => "new",
        }
    }
}

impl std::str::FromStr for IssueSortBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(IssueSortBy::User),
            "freq" => Ok(IssueSortBy::Freq),
            "date" => Ok(IssueSortBy::Date),
            "new" => Ok(IssueSortBy::New),
            other => Err(format!("unknown sort: {}", other)),
        }
    }
}

/// Fields accepted by `update_project`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Fields accepted by `update_issue`
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "assignedTo")]
    pub assigned_to: Option<String>,
}

/// REST client for one request's worth of upstream calls
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    host: String,
    access_token: Option<String>,
    multi_region: bool,
}

impl UpstreamClient {
    /// Create a client aimed at `host` (a hostname, or a full URL for
    /// region-specific targets). Multi-region organization discovery is
    /// enabled automatically for SaaS hosts.
    pub fn new(host: impl Into<String>, access_token: Option<String>) -> Self {
        let host = host.into();
        let multi_region = urls::is_saas_host(&host);
        Self {
            http: reqwest::Client::new(),
            host,
            access_token,
            multi_region,
        }
    }

    /// Override the multi-region discovery decision.
    pub fn with_multi_region(mut self, enabled: bool) -> Self {
        self.multi_region = enabled;
        self
    }

    /// Client for the current request's context, aimed at the verified
    /// region when one is known.
    pub fn for_context(ctx: &ServerContext) -> Self {
        let token = if ctx.access_token.is_empty() {
            None
        } else {
            Some(ctx.access_token.clone())
        };
        Self::new(ctx.api_host(), token)
    }

    /// A clone of this client retargeted at another host.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        let host = host.into();
        let multi_region = urls::is_saas_host(&host);
        Self {
            http: self.http.clone(),
            host,
            access_token: self.access_token.clone(),
            multi_region,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn base_url(&self) -> String {
        if self.host.contains("://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host)
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url(), API_PREFIX, path)
    }

    // ------------------------------------------------------------------
    // Core request plumbing
    // ------------------------------------------------------------------

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<reqwest::Response> {
        let url = self.api_url(path);
        let mut request = self
            .http
            .request(method, &url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.access_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| GatewayError::Network(NetworkError::classify(&url, e)))
    }

    /// Issue a request and decode the JSON response.
    ///
    /// The response is only parsed after the content-type guard passes;
    /// deserialization into `T` is the per-endpoint validation, and a
    /// failure there is an internal error rather than an API error.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let response = self.send(method, path, body).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let is_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"));

        if !is_json {
            let text = response.text().await.unwrap_or_default();
            let status_text = status.canonical_reason().unwrap_or("Unknown");
            if looks_like_html(&text) {
                return Err(GatewayError::internal(format!(
                    "Expected JSON response but received HTML ({} {}). \
                     This may indicate you're not authenticated, the URL is incorrect, \
                     or there's a server issue.",
                    status.as_u16(),
                    status_text
                )));
            }
            return Err(GatewayError::internal(format!(
                "Expected JSON response but received {} ({} {})",
                content_type.as_deref().unwrap_or("unknown content type"),
                status.as_u16(),
                status_text
            )));
        }

        let text = response.text().await.unwrap_or_default();
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::internal(format!("Invalid JSON from upstream: {}", e)))?;
        serde_json::from_value(value).map_err(|e| {
            GatewayError::internal(format!("Unexpected response shape from {}: {}", path, e))
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(Method::GET, path, None).await
    }

    async fn get_bytes(&self, path: &str) -> Result<bytes::Bytes> {
        let response = self.send(Method::GET, path, None).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        let url = self.api_url(path);
        response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(NetworkError::classify(&url, e)))
    }

    // ------------------------------------------------------------------
    // Users and organizations
    // ------------------------------------------------------------------

    pub async fn get_authenticated_user(&self) -> Result<User> {
        self.get_json("/auth/").await
    }

    /// List every organization the user can see.
    ///
    /// On the SaaS deployment, organizations are sharded per region: fetch
    /// the region list, then fan out one `/organizations/` call per region
    /// in parallel and concatenate. A 404 from the regions endpoint (older
    /// self-hosted builds answering on a sentry.io-like host) falls back to
    /// the single-host call, as does any non-SaaS host.
    pub async fn list_organizations(&self) -> Result<Vec<Organization>> {
        if !self.multi_region {
            return self.get_json("/organizations/").await;
        }

        let regions: RegionsResponse = match self.get_json("/users/me/regions/").await {
            Ok(regions) => regions,
            Err(GatewayError::Api { status: 404, .. }) => {
                return self.get_json("/organizations/").await;
            }
            Err(e) => return Err(e),
        };

        let fetches = regions.regions.iter().map(|region| {
            let client = self.with_host(&region.url);
            async move { client.get_json::<Vec<Organization>>("/organizations/").await }
        });
        let per_region = futures::future::try_join_all(fetches).await?;
        Ok(per_region.into_iter().flatten().collect())
    }

    pub async fn get_organization(&self, slug: &str) -> Result<Organization> {
        self.get_json(&format!("/organizations/{}/", slug)).await
    }

    // ------------------------------------------------------------------
    // Teams and projects
    // ------------------------------------------------------------------

    pub async fn list_teams(&self, org: &str) -> Result<Vec<Team>> {
        self.get_json(&format!("/organizations/{}/teams/", org)).await
    }

    pub async fn create_team(&self, org: &str, name: &str) -> Result<Team> {
        self.request_json(
            Method::POST,
            &format!("/organizations/{}/teams/", org),
            Some(&json!({ "name": name })),
        )
        .await
    }

    pub async fn list_projects(&self, org: &str) -> Result<Vec<Project>> {
        self.get_json(&format!("/organizations/{}/projects/", org))
            .await
    }

    pub async fn get_project(&self, org: &str, project: &str) -> Result<Project> {
        self.get_json(&format!("/projects/{}/{}/", org, project))
            .await
    }

    pub async fn create_project(
        &self,
        org: &str,
        team: &str,
        name: &str,
        platform: Option<&str>,
    ) -> Result<Project> {
        let mut body = json!({ "name": name });
        if let Some(platform) = platform {
            body["platform"] = json!(platform);
        }
        self.request_json(
            Method::POST,
            &format!("/teams/{}/{}/projects/", org, team),
            Some(&body),
        )
        .await
    }

    pub async fn update_project(
        &self,
        org: &str,
        project: &str,
        update: &ProjectUpdate,
    ) -> Result<Project> {
        self.request_json(
            Method::PUT,
            &format!("/projects/{}/{}/", org, project),
            Some(&serde_json::to_value(update)?),
        )
        .await
    }

    pub async fn add_team_to_project(&self, org: &str, project: &str, team: &str) -> Result<()> {
        let _: Value = self
            .request_json(
                Method::POST,
                &format!("/projects/{}/{}/teams/{}/", org, project, team),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn create_client_key(
        &self,
        org: &str,
        project: &str,
        name: Option<&str>,
    ) -> Result<ClientKey> {
        let body = match name {
            Some(name) => json!({ "name": name }),
            None => json!({}),
        };
        self.request_json(
            Method::POST,
            &format!("/projects/{}/{}/keys/", org, project),
            Some(&body),
        )
        .await
    }

    pub async fn list_client_keys(&self, org: &str, project: &str) -> Result<Vec<ClientKey>> {
        self.get_json(&format!("/projects/{}/{}/keys/", org, project))
            .await
    }

    // ------------------------------------------------------------------
    // Releases and tags
    // ------------------------------------------------------------------

    pub async fn list_releases(
        &self,
        org: &str,
        project: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<Release>> {
        let path = match project {
            Some(project) => format!("/projects/{}/{}/releases/", org, project),
            None => format!("/organizations/{}/releases/", org),
        };
        let path = match search {
            Some(search) => format!("{}?query={}", path, urlencoding::encode(search)),
            None => path,
        };
        self.get_json(&path).await
    }

    pub async fn list_tags(
        &self,
        org: &str,
        dataset: &str,
        project: Option<&str>,
    ) -> Result<Vec<TagDef>> {
        let mut path = format!(
            "/organizations/{}/tags/?dataset={}",
            org,
            urlencoding::encode(dataset)
        );
        if let Some(project) = project {
            path.push_str(&format!("&project={}", urlencoding::encode(project)));
        }
        self.get_json(&path).await
    }

    // ------------------------------------------------------------------
    // Issues and events
    // ------------------------------------------------------------------

    pub async fn list_issues(&self, params: &ListIssuesParams) -> Result<Vec<Issue>> {
        let base = match &params.project_slug {
            Some(project) => format!(
                "/projects/{}/{}/issues/",
                params.organization_slug, project
            ),
            None => format!("/organizations/{}/issues/", params.organization_slug),
        };
        let encoded = {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            if let Some(query) = &params.query {
                serializer.append_pair("query", query);
            }
            // Ordering goes in its own parameter, never into the search query.
            if let Some(sort_by) = params.sort_by {
                serializer.append_pair("sort", sort_by.as_str());
            }
            serializer.finish()
        };
        let path = if encoded.is_empty() {
            base
        } else {
            format!("{}?{}", base, encoded)
        };
        self.get_json(&path).await
    }

    pub async fn get_issue(&self, org: &str, issue_id: &str) -> Result<Issue> {
        self.get_json(&format!("/organizations/{}/issues/{}/", org, issue_id))
            .await
    }

    pub async fn update_issue(
        &self,
        org: &str,
        issue_id: &str,
        update: &IssueUpdate,
    ) -> Result<Issue> {
        self.request_json(
            Method::PUT,
            &format!("/organizations/{}/issues/{}/", org, issue_id),
            Some(&serde_json::to_value(update)?),
        )
        .await
    }

    pub async fn get_event_for_issue(
        &self,
        org: &str,
        issue_id: &str,
        event_id: &str,
    ) -> Result<Event> {
        self.get_json(&format!(
            "/organizations/{}/issues/{}/events/{}/",
            org, issue_id, event_id
        ))
        .await
    }

    pub async fn get_latest_event_for_issue(&self, org: &str, issue_id: &str) -> Result<Event> {
        self.get_json(&format!(
            "/organizations/{}/issues/{}/events/latest/",
            org, issue_id
        ))
        .await
    }

    pub async fn list_event_attachments(
        &self,
        org: &str,
        project: &str,
        event_id: &str,
    ) -> Result<Vec<EventAttachment>> {
        self.get_json(&format!(
            "/projects/{}/{}/events/{}/attachments/",
            org, project, event_id
        ))
        .await
    }

    pub async fn get_event_attachment(
        &self,
        org: &str,
        project: &str,
        event_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDownload> {
        let metadata: EventAttachment = self
            .get_json(&format!(
                "/projects/{}/{}/events/{}/attachments/{}/",
                org, project, event_id, attachment_id
            ))
            .await?;
        let bytes = self
            .get_bytes(&format!(
                "/projects/{}/{}/events/{}/attachments/{}/?download=1",
                org, project, event_id, attachment_id
            ))
            .await?;
        let filename = metadata.name.clone();
        Ok(AttachmentDownload {
            metadata,
            filename,
            bytes,
        })
    }

    // ------------------------------------------------------------------
    // Event search
    // ------------------------------------------------------------------

    /// Search the errors dataset (Discover).
    pub async fn search_errors(
        &self,
        org: &str,
        params: &SearchParams,
    ) -> Result<EventsSearchResponse> {
        self.search_events(org, params, Dataset::Errors).await
    }

    /// Search the spans dataset (EAP, sampled).
    pub async fn search_spans(
        &self,
        org: &str,
        params: &SearchParams,
    ) -> Result<EventsSearchResponse> {
        self.search_events(org, params, Dataset::Spans).await
    }

    /// Search any dataset, routing to the matching query builder.
    pub async fn search_events(
        &self,
        org: &str,
        params: &SearchParams,
        dataset: Dataset,
    ) -> Result<EventsSearchResponse> {
        let encoded = match dataset {
            Dataset::Errors => query::build_discover_api_query(params),
            other => query::build_eap_api_query(params, other),
        };
        self.get_json(&format!("/organizations/{}/events/?{}", org, encoded))
            .await
    }

    // ------------------------------------------------------------------
    // Seer
    // ------------------------------------------------------------------

    pub async fn start_autofix(
        &self,
        org: &str,
        issue_id: &str,
        event_id: Option<&str>,
        instruction: Option<&str>,
    ) -> Result<AutofixStartResponse> {
        let mut body = json!({});
        if let Some(event_id) = event_id {
            body["event_id"] = json!(event_id);
        }
        if let Some(instruction) = instruction {
            body["instruction"] = json!(instruction);
        }
        self.request_json(
            Method::POST,
            &format!("/organizations/{}/issues/{}/autofix/", org, issue_id),
            Some(&body),
        )
        .await
    }

    pub async fn get_autofix_state(&self, org: &str, issue_id: &str) -> Result<AutofixState> {
        self.get_json(&format!(
            "/organizations/{}/issues/{}/autofix/",
            org, issue_id
        ))
        .await
    }
}

/// Map a non-2xx upstream response to the error taxonomy.
fn api_error(status: StatusCode, body: &str) -> GatewayError {
    let status_code = status.as_u16();

    if let Ok(detail) = serde_json::from_str::<ApiErrorDetail>(body) {
        let message = if detail.detail.contains("multi project stream feature")
            || detail.detail.contains("view events from multiple projects")
        {
            MULTI_PROJECT_ACCESS_MESSAGE.to_string()
        } else {
            detail.detail
        };
        return GatewayError::api(status_code, message);
    }

    if looks_like_html(body) {
        return GatewayError::api(status_code, "Server error: Received HTML instead of JSON");
    }

    GatewayError::api(
        status_code,
        format!(
            "API request failed: {} {}\n{}",
            status_code,
            status.canonical_reason().unwrap_or("Unknown"),
            body
        ),
    )
}

fn looks_like_html(body: &str) -> bool {
    let trimmed = body.trim_start();
    let lower = trimmed
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    lower.starts_with("<!doctype") || lower.starts_with("<html")
}

#[cfg(test)]
mod query_test;
