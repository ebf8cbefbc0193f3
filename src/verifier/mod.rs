//! Constraint verification against the upstream
//!
//! The `/mcp/{org}/{project}` path narrows a request to one organization and
//! optionally one project. Before any tool runs, the narrowing is verified:
//! the organization must exist (and tells us its region), and project access
//! must hold (and tells us the project's capability flags). Verified results
//! may be cached per user/host/org/project; the cache fails open in both
//! directions because capability filtering is an optimization, not the
//! authorization boundary.

use crate::constants::{CONSTRAINT_CACHE_PREFIX, CONSTRAINT_CACHE_TTL_SECS, PROJECT_LOOKUP_TIMEOUT_SECS};
use crate::context::Constraints;
use crate::model::{CachedConstraints, ProjectCapabilities};
use crate::storage::KvStore;
use crate::upstream::UpstreamClient;
use crate::GatewayError;
use std::sync::Arc;
use std::time::Duration;

/// A rejected constraint verification, ready to become an HTTP response.
#[derive(Debug, Clone)]
pub struct VerificationFailure {
    pub status: u16,
    pub message: String,
    pub event_id: Option<String>,
}

impl VerificationFailure {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            event_id: None,
        }
    }

    fn logged(status: u16, message: impl Into<String>, source: &GatewayError) -> Self {
        let event_id = uuid::Uuid::new_v4().to_string();
        let message = message.into();
        tracing::error!(event_id = %event_id, error = %source, "{}", message);
        Self {
            status,
            message,
            event_id: Some(event_id),
        }
    }
}

/// Inputs the verifier needs beyond the requested constraints.
pub struct VerifyOptions<'a> {
    pub access_token: &'a str,
    pub user_id: Option<&'a str>,
    pub host: &'a str,
    pub cache: Option<Arc<dyn KvStore>>,
}

pub struct ConstraintVerifier;

impl ConstraintVerifier {
    /// Verify the requested org/project narrowing and return the completed
    /// constraints (region URL and project capabilities filled in).
    pub async fn verify(
        requested: &Constraints,
        opts: VerifyOptions<'_>,
    ) -> std::result::Result<Constraints, VerificationFailure> {
        let Some(org) = requested.organization_slug.as_deref() else {
            return Ok(Constraints::default());
        };

        if opts.access_token.is_empty() {
            return Err(VerificationFailure::new(
                401,
                "Missing access token for constraint verification",
            ));
        }

        let project = requested.project_slug.as_deref();

        // Cache lookup applies only to fully-narrowed (org + project)
        // requests; a hit skips the upstream entirely.
        let cache_key = match (project, opts.user_id) {
            (Some(project), Some(user_id)) => Some(format!(
                "{}:{}:{}:{}:{}",
                CONSTRAINT_CACHE_PREFIX, user_id, opts.host, org, project
            )),
            _ => None,
        };
        if let (Some(key), Some(cache)) = (&cache_key, &opts.cache)
            && let Some(cached) = read_cache(cache.as_ref(), key).await
        {
            return Ok(Constraints {
                organization_slug: Some(org.to_string()),
                project_slug: project.map(str::to_string),
                region_url: cached.region_url,
                project_capabilities: cached.project_capabilities,
            });
        }

        let client = UpstreamClient::new(opts.host, Some(opts.access_token.to_string()));
        let organization = match client.get_organization(org).await {
            Ok(organization) => organization,
            Err(GatewayError::Api { status: 404, .. }) => {
                return Err(VerificationFailure::new(
                    404,
                    format!("Organization '{}' not found", org),
                ));
            }
            Err(GatewayError::Api { status, message }) => {
                return Err(VerificationFailure::new(status, message));
            }
            Err(other) => {
                return Err(VerificationFailure::logged(
                    502,
                    "Failed to verify organization",
                    &other,
                ));
            }
        };

        let region_url = organization.region_url().map(str::to_string);
        let mut constraints = Constraints {
            organization_slug: Some(org.to_string()),
            project_slug: project.map(str::to_string),
            region_url: region_url.clone(),
            project_capabilities: None,
        };

        let Some(project) = project else {
            return Ok(constraints);
        };

        // The project lookup goes to the org's region and carries its own
        // deadline. A timeout degrades to unknown capabilities instead of
        // failing the request; scope and skill gating still applies.
        let region_client = match &region_url {
            Some(region) => client.with_host(region.clone()),
            None => client.clone(),
        };
        let lookup = tokio::time::timeout(
            Duration::from_secs(PROJECT_LOOKUP_TIMEOUT_SECS),
            region_client.get_project(org, project),
        )
        .await;

        match lookup {
            Err(_elapsed) => {
                tracing::warn!(
                    organization = org,
                    project = project,
                    "project capability lookup timed out; proceeding without capabilities"
                );
            }
            Ok(Err(GatewayError::Api { status: 404, .. })) => {
                return Err(VerificationFailure::new(
                    404,
                    format!("Project '{}' not found in organization '{}'", project, org),
                ));
            }
            Ok(Err(GatewayError::Api { status, message })) => {
                return Err(VerificationFailure::new(status, message));
            }
            Ok(Err(other)) => {
                return Err(VerificationFailure::logged(
                    502,
                    "Failed to verify project",
                    &other,
                ));
            }
            Ok(Ok(project_info)) => {
                constraints.project_capabilities = Some(ProjectCapabilities::from(&project_info));
            }
        }

        // Only fully-successful lookups are cached: a timed-out project call
        // must stay a miss so the next request can still resolve
        // capabilities, rather than pinning "unknown" for the whole TTL.
        if constraints.project_capabilities.is_some()
            && let (Some(key), Some(cache)) = (cache_key, opts.cache)
        {
            let entry = CachedConstraints {
                region_url,
                project_capabilities: constraints.project_capabilities,
                cached_at: chrono::Utc::now(),
            };
            // Fire and forget: the response never waits on a cache write.
            tokio::spawn(async move {
                if let Ok(serialized) = serde_json::to_string(&entry) {
                    let ttl = Duration::from_secs(CONSTRAINT_CACHE_TTL_SECS as u64);
                    if let Err(e) = cache.put(&key, serialized, Some(ttl)).await {
                        tracing::debug!("constraint cache write failed: {}", e);
                    }
                }
            });
        }

        Ok(constraints)
    }
}

/// Cache reads tolerate any failure by reporting a miss.
async fn read_cache(cache: &dyn KvStore, key: &str) -> Option<CachedConstraints> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("discarding malformed constraint cache entry: {}", e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("constraint cache read failed: {}", e);
            None
        }
    }
}
