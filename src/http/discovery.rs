//! Discovery endpoints: robots.txt, llms.txt, RFC 9728 metadata, the SSE
//! deprecation stub, health, and metrics.

use crate::auth::request_origin;
use crate::constants::{ROBOTS_TXT, SSE_GONE_BODY};
use axum::{
    Json,
    extract::Path as AxumPath,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

pub async fn robots_txt() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ROBOTS_TXT,
    )
}

pub fn llms_txt_body(origin: &str) -> String {
    format!(
        "# Sentry MCP\n\n\
         This service implements the Model Context Protocol (MCP) for interacting \
         with Sentry, the error tracking and performance monitoring platform.\n\n\
         - MCP endpoint: {origin}/mcp\n\
         - Scope the session to one organization: {origin}/mcp/{{organization}}\n\
         - Scope it further to one project: {origin}/mcp/{{organization}}/{{project}}\n\n\
         Authentication uses OAuth; your MCP client will be walked through it on \
         first connect.\n\n\
         ## Example configuration\n\n\
         ```json\n\
         {{\n  \"mcpServers\": {{\n    \"sentry\": {{\n      \"url\": \"{origin}/mcp\"\n    }}\n  }}\n}}\n\
         ```\n\n\
         Or with a stdio-based client:\n\n\
         ```\n\
         npx mcp-remote@latest {origin}/mcp\n\
         ```\n"
    )
}

pub async fn llms_txt(headers: HeaderMap) -> impl IntoResponse {
    let origin = request_origin(&headers);
    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        llms_txt_body(&origin),
    )
}

/// The root serves the llms.txt body to markdown-preferring agents and a
/// minimal landing page to everyone else (the product SPA is deployed
/// separately).
pub async fn root(headers: HeaderMap) -> Response {
    let accepts_markdown = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/markdown"));
    let origin = request_origin(&headers);

    if accepts_markdown {
        return (
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            llms_txt_body(&origin),
        )
            .into_response();
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Sentry MCP</title></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 80px auto;">
<h1>Sentry MCP</h1>
<p>This is an MCP gateway for Sentry. Point your MCP client at
<code>{origin}/mcp</code> to get started, or fetch <a href="/llms.txt">llms.txt</a>
for machine-readable instructions.</p>
</body>
</html>"#
    );
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

/// 410 for the removed SSE transport, body served verbatim.
pub async fn sse_gone() -> impl IntoResponse {
    (
        StatusCode::GONE,
        [(header::CONTENT_TYPE, "application/json")],
        SSE_GONE_BODY,
    )
}

/// RFC 9728 protected-resource metadata. The resource echoes the request
/// path under this origin; dynamic subpaths are supported and query
/// strings never appear (the router strips them from the path).
pub async fn protected_resource_root(headers: HeaderMap) -> Json<Value> {
    let origin = request_origin(&headers);
    Json(json!({
        "resource": origin,
        "authorization_servers": [origin],
    }))
}

pub async fn protected_resource(
    headers: HeaderMap,
    AxumPath(path): AxumPath<String>,
) -> Json<Value> {
    let origin = request_origin(&headers);
    Json(json!({
        "resource": format!("{}/{}", origin, path),
        "authorization_servers": [origin],
    }))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn metrics() -> Response {
    match crate::telemetry::get_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
