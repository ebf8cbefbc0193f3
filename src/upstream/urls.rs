//! Web-UI URL builders
//!
//! Tool results link back to the product UI. SaaS organizations get their
//! org-subdomain form; self-hosted installs get the `/organizations/{org}`
//! form. Regional API hosts (us.sentry.io) always resolve back to the root
//! sentry.io domain.

use url::form_urlencoded;

/// Whether a host belongs to the SaaS deployment.
pub fn is_saas_host(host: &str) -> bool {
    let host = host_only(host);
    host == "sentry.io" || host.ends_with(".sentry.io")
}

/// Strip any scheme and path so region URLs can be used where a hostname is
/// expected.
pub fn host_only(host: &str) -> &str {
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.split('/').next().unwrap_or(host)
}

/// Base URL for a given organization's UI pages.
pub fn organization_url(host: &str, org: &str) -> String {
    org_base(host, org)
}

fn org_base(host: &str, org: &str) -> String {
    if is_saas_host(host) {
        format!("https://{}.sentry.io", org)
    } else {
        format!("https://{}/organizations/{}", host_only(host), org)
    }
}

/// Link to one issue.
pub fn issue_url(host: &str, org: &str, short_id: &str) -> String {
    format!("{}/issues/{}", org_base(host, org), short_id)
}

/// Link to one trace in the explorer.
pub fn trace_url(host: &str, org: &str, trace_id: &str) -> String {
    format!("{}/explore/traces/trace/{}", org_base(host, org), trace_id)
}

/// Link to the issues list, optionally filtered.
pub fn issues_search_url(
    host: &str,
    org: &str,
    query: Option<&str>,
    project_slug_or_id: Option<&str>,
) -> String {
    let base = format!("{}/issues/", org_base(host, org));
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if let Some(project) = project_slug_or_id {
        serializer.append_pair("project", project);
    }
    if let Some(query) = query {
        serializer.append_pair("query", query);
    }
    let params = serializer.finish();
    if params.is_empty() {
        base
    } else {
        format!("{}?{}", base, params)
    }
}

/// Link to the events explorer for a search, routed to the discover or EAP
/// layout by dataset.
pub fn events_explorer_url(
    host: &str,
    org: &str,
    query: &str,
    dataset: super::query::Dataset,
    project_slug_or_id: Option<&str>,
    fields: Option<&[String]>,
) -> String {
    match dataset {
        super::query::Dataset::Errors => {
            build_discover_url(host, org, query, project_slug_or_id, fields)
        }
        other => build_eap_url(host, org, query, other, project_slug_or_id, fields),
    }
}

/// Non-aggregate (sample) explorer layout, used for the errors dataset.
pub fn build_discover_url(
    host: &str,
    org: &str,
    query: &str,
    project_slug_or_id: Option<&str>,
    fields: Option<&[String]>,
) -> String {
    explorer_url(host, org, query, "errors", project_slug_or_id, fields)
}

/// Aggregate-capable explorer layout, used for spans and logs.
pub fn build_eap_url(
    host: &str,
    org: &str,
    query: &str,
    dataset: super::query::Dataset,
    project_slug_or_id: Option<&str>,
    fields: Option<&[String]>,
) -> String {
    explorer_url(
        host,
        org,
        query,
        &dataset.to_string(),
        project_slug_or_id,
        fields,
    )
}

fn explorer_url(
    host: &str,
    org: &str,
    query: &str,
    dataset: &str,
    project_slug_or_id: Option<&str>,
    fields: Option<&[String]>,
) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("query", query);
    serializer.append_pair("dataset", dataset);
    serializer.append_pair("layout", "table");
    if let Some(project) = project_slug_or_id {
        serializer.append_pair("project", project);
    }
    if let Some(fields) = fields {
        for field in fields {
            serializer.append_pair("field", field);
        }
    }
    format!("{}/explore/?{}", org_base(host, org), serializer.finish())
}
