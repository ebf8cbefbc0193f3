//! Edge middleware: client-IP extraction, security headers, CSRF origin
//! check, and the bot filter.
//!
//! Order matters and is fixed in the router: IP extraction runs first,
//! then security headers, then CSRF, then the bot filter. Server-to-server
//! surfaces (token endpoint, registration, MCP, discovery) are exempt from
//! the browser-facing checks.

use crate::auth::request_origin;
use crate::constants::{BOT_ALLOW_LIST, BOT_DENY_LIST, MIN_BROWSER_UA_LENGTH};
use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Paths that must stay reachable cross-origin and from non-browser
/// clients.
fn is_exempt_path(path: &str) -> bool {
    path == "/oauth/token"
        || path == "/oauth/register"
        || path == "/mcp"
        || path.starts_with("/mcp/")
        || path.starts_with("/.well-known/")
        || path == "/robots.txt"
        || path == "/llms.txt"
        || path == "/healthz"
        || path == "/metrics"
}

/// Resolve the real client IP from proxy headers and attach it to request
/// extensions for telemetry.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

pub async fn client_ip_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers();
    let ip = headers
        .get("x-real-ip")
        .or_else(|| headers.get("cf-connecting-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|list| list.split(',').next())
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty());

    if let Some(ip) = &ip {
        tracing::debug!(client_ip = %ip, "resolved client ip");
    }
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}

/// Same-origin check for browser-facing routes. Requests with no Origin
/// header pass: server-to-server OAuth and MCP traffic does not send one.
pub async fn csrf_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if is_exempt_path(path) {
        return next.run(request).await;
    }

    let Some(origin) = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    let own_origin = request_origin(request.headers());
    // The scheme a TLS-terminating proxy reports may differ from what the
    // browser sent; compare on the host part as well.
    let matches = origin == own_origin
        || origin.split("://").nth(1) == own_origin.split("://").nth(1);
    if !matches {
        tracing::warn!(origin = %origin, expected = %own_origin, "cross-origin request rejected");
        return (StatusCode::FORBIDDEN, "Cross-origin request rejected").into_response();
    }
    next.run(request).await
}

/// Classify a user agent. Allowed bots pass, denied bots and anything that
/// does not look like a browser gets a 403 on browser-facing routes.
pub fn is_denied_user_agent(user_agent: Option<&str>) -> bool {
    let Some(ua) = user_agent else {
        return true;
    };
    let lower = ua.to_lowercase();

    if BOT_ALLOW_LIST.iter().any(|bot| lower.contains(bot)) {
        return false;
    }
    if BOT_DENY_LIST.iter().any(|bot| lower.contains(bot)) {
        return true;
    }
    if ua.len() < MIN_BROWSER_UA_LENGTH {
        return true;
    }

    let browser_signature = ua.starts_with("Mozilla/")
        && (ua.contains("Gecko/")
            || ua.contains("WebKit/")
            || ua.contains("Chrome/")
            || ua.contains("Safari/"));
    !browser_signature
}

pub async fn bot_filter_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if is_exempt_path(path) {
        return next.run(request).await;
    }

    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    if is_denied_user_agent(user_agent) {
        tracing::debug!(user_agent = user_agent.unwrap_or(""), "bot request rejected");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }
    next.run(request).await
}

/// Request metrics, recorded after the handler runs.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    crate::telemetry::record_http_request(&path, &method, response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_user_agents_pass() {
        let chrome = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                      (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0";
        assert!(!is_denied_user_agent(Some(chrome)));
        assert!(!is_denied_user_agent(Some(firefox)));
    }

    #[test]
    fn test_allow_listed_bots_pass() {
        assert!(!is_denied_user_agent(Some(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        )));
        assert!(!is_denied_user_agent(Some("PostmanRuntime/7.36.0")));
    }

    #[test]
    fn test_generic_clients_are_denied() {
        assert!(is_denied_user_agent(Some("curl/8.4.0")));
        assert!(is_denied_user_agent(Some("python-requests/2.31.0")));
        assert!(is_denied_user_agent(Some("Go-http-client/1.1")));
        assert!(is_denied_user_agent(Some("okhttp/4.12.0")));
    }

    #[test]
    fn test_short_or_missing_ua_is_denied() {
        assert!(is_denied_user_agent(None));
        assert!(is_denied_user_agent(Some("x")));
        assert!(is_denied_user_agent(Some("abc/1.0")));
    }

    #[test]
    fn test_non_browser_signature_is_denied() {
        // Long enough, but no browser engine markers.
        assert!(is_denied_user_agent(Some("CustomAgent/2.0 (internal tool)")));
    }

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt_path("/mcp"));
        assert!(is_exempt_path("/mcp/acme/web"));
        assert!(is_exempt_path("/oauth/token"));
        assert!(is_exempt_path("/oauth/register"));
        assert!(is_exempt_path("/.well-known/oauth-protected-resource/mcp"));
        assert!(is_exempt_path("/robots.txt"));
        assert!(is_exempt_path("/llms.txt"));
        assert!(!is_exempt_path("/oauth/authorize"));
        assert!(!is_exempt_path("/"));
    }
}
