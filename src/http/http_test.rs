use super::*;
use crate::constants::SSE_GONE_BODY;
use crate::model::AuthGrant;
use crate::permissions::{base_scopes, base_skills};
use axum::body::Body;
use axum::http::{Request, header};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

fn test_config(upstream_host: &str) -> Config {
    Config {
        upstream_host: upstream_host.to_string(),
        upstream_client_id: "upstream-client".to_string(),
        upstream_client_secret: "upstream-secret".to_string(),
        cookie_secret: "0123456789abcdef0123456789abcdef".to_string(),
        ..Default::default()
    }
}

fn test_app(upstream_host: &str) -> (Router, AppState) {
    let state = AppState::new(test_config(upstream_host));
    (build_router(state.clone()), state)
}

async fn seed_grant(state: &AppState, token: &str) {
    state
        .grants
        .save_grant(
            token,
            &AuthGrant {
                user_id: "u1".to_string(),
                user_name: Some("Jane".to_string()),
                client_id: "client-a".to_string(),
                access_token: "T".to_string(),
                scope: "org:read".to_string(),
                granted_scopes: base_scopes(),
                granted_skills: base_skills(),
                issued_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ========================================
// DISCOVERY
// ========================================

#[tokio::test]
async fn test_protected_resource_metadata_echoes_path() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/oauth-protected-resource/mcp")
                .header(header::HOST, "mcp.sentry.dev")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "resource": "https://mcp.sentry.dev/mcp",
            "authorization_servers": ["https://mcp.sentry.dev"],
        })
    );
}

#[tokio::test]
async fn test_protected_resource_metadata_strips_query() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/oauth-protected-resource/mcp/sentry/mcp-server?experimental=1")
                .header(header::HOST, "mcp.sentry.dev")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "resource": "https://mcp.sentry.dev/mcp/sentry/mcp-server",
            "authorization_servers": ["https://mcp.sentry.dev"],
        })
    );
}

#[tokio::test]
async fn test_sse_deprecation_stub() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_string(response).await, SSE_GONE_BODY);
}

#[tokio::test]
async fn test_robots_and_llms_txt() {
    let (app, _) = test_app("sentry.io");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/robots.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Disallow: /oauth/"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/llms.txt")
                .header(header::HOST, "mcp.sentry.dev")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("https://mcp.sentry.dev/mcp"));
}

#[tokio::test]
async fn test_root_serves_markdown_when_asked() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::HOST, "mcp.sentry.dev")
                .header(header::ACCEPT, "text/markdown")
                .header(header::USER_AGENT, BROWSER_UA)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .contains("text/markdown")
    );
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/robots.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert_eq!(
        headers["strict-transport-security"],
        "max-age=31536000; includeSubDomains"
    );
}

// ========================================
// CSRF AND BOT FILTER
// ========================================

#[tokio::test]
async fn test_cross_origin_posts_to_exempt_paths_are_not_rejected() {
    let (app, _) = test_app("sentry.io");
    for path in ["/oauth/token", "/oauth/register", "/mcp"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::HOST, "mcp.sentry.dev")
                    .header(header::ORIGIN, "https://elsewhere.example")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(
            response.status(),
            StatusCode::FORBIDDEN,
            "{} must be reachable cross-origin",
            path
        );
    }
}

#[tokio::test]
async fn test_cors_preflight_on_mcp() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/mcp")
                .header(header::ORIGIN, "https://chat.example")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "authorization, content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success(), "{}", response.status());
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let methods = response.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"), "{}", methods);
}

#[tokio::test]
async fn test_cors_headers_on_cross_origin_responses() {
    let (app, _) = test_app("sentry.io");
    // A browser-based client must be able to read these responses.
    for (method, uri) in [
        ("POST", "/mcp"),
        ("POST", "/oauth/token"),
        ("GET", "/.well-known/oauth-protected-resource/mcp"),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::HOST, "mcp.sentry.dev")
                    .header(header::ORIGIN, "https://chat.example")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*",
            "{} {}",
            method,
            uri
        );
    }
}

#[tokio::test]
async fn test_cross_origin_authorize_post_is_rejected() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header(header::HOST, "mcp.sentry.dev")
                .header(header::ORIGIN, "https://attacker.example")
                .header(header::USER_AGENT, BROWSER_UA)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("state=x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(
        response.status().is_client_error() || response.status().is_server_error(),
        "expected 4xx/5xx, got {}",
        response.status()
    );
}

#[tokio::test]
async fn test_same_origin_request_with_origin_header_passes_csrf() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize?client_id=x&redirect_uri=y&response_type=code")
                .header(header::HOST, "mcp.sentry.dev")
                .header(header::ORIGIN, "https://mcp.sentry.dev")
                .header(header::USER_AGENT, BROWSER_UA)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // Reaches the handler (which 400s on the unknown client), not the CSRF 403.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generic_clients_are_blocked_from_browser_routes() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize?client_id=x&redirect_uri=y&response_type=code")
                .header(header::USER_AGENT, "curl/8.4.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The same client is fine on the MCP surface.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(header::USER_AGENT, "curl/8.4.0")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::FORBIDDEN);
}

// ========================================
// MCP ENDPOINT
// ========================================

fn mcp_request(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, "mcp.sentry.dev")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_mcp_requires_bearer_token() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(mcp_request(
            "/mcp",
            None,
            serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.contains("oauth-protected-resource"));
}

#[tokio::test]
async fn test_mcp_rejects_unknown_token() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(mcp_request(
            "/mcp",
            Some("nope"),
            serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "Invalid or expired token");
}

#[tokio::test]
async fn test_mcp_ping_round_trip() {
    let (app, state) = test_app("sentry.io");
    seed_grant(&state, "mcp-token").await;

    let response = app
        .oneshot(mcp_request(
            "/mcp",
            Some("mcp-token"),
            serde_json::json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(parsed["id"], 7);
    assert_eq!(parsed["result"], serde_json::json!({}));
}

#[tokio::test]
async fn test_mcp_parse_error() {
    let (app, state) = test_app("sentry.io");
    seed_grant(&state, "mcp-token").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(header::AUTHORIZATION, "Bearer mcp-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(parsed["error"]["code"], -32700);
}

#[tokio::test]
async fn test_mcp_constraint_failure_maps_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/0/organizations/ghost/"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "nope"})),
        )
        .mount(&server)
        .await;

    let (app, state) = test_app(&server.uri());
    seed_grant(&state, "mcp-token").await;

    let response = app
        .oneshot(mcp_request(
            "/mcp/ghost",
            Some("mcp-token"),
            serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, "Organization 'ghost' not found");
}

/// Happy-path tool call under an org constraint: the URL narrows the session
/// to `acme`, the verifier resolves the region, and the injected slug drives
/// the upstream call to the regional host.
#[tokio::test]
async fn test_tool_call_under_constraint_injects_org() {
    let server = MockServer::start().await;
    let region = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1", "slug": "acme", "name": "Acme",
            "links": {"regionUrl": region.uri()}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "10", "slug": "web", "name": "Web", "platform": "javascript"}
        ])))
        .expect(1)
        .mount(&region)
        .await;

    let (app, state) = test_app(&server.uri());
    seed_grant(&state, "mcp-token").await;

    let response = app
        .oneshot(mcp_request(
            "/mcp/acme",
            Some("mcp-token"),
            serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "find_projects", "arguments": {}}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let result = &parsed["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["type"], "text");
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("web"), "{}", text);
}

/// The caller-supplied organization is discarded in favor of the URL
/// constraint: no request ever goes out for `evil`.
#[tokio::test]
async fn test_constraint_overrides_user_supplied_org() {
    let server = MockServer::start().await;
    let region = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1", "slug": "acme", "name": "Acme",
            "links": {"regionUrl": region.uri()}
        })))
        .mount(&server)
        .await;
    // Only the acme path exists; a call for `evil` would 404 and fail the
    // assertion below.
    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "10", "slug": "web", "name": "Web"}
        ])))
        .expect(1)
        .mount(&region)
        .await;

    let (app, state) = test_app(&server.uri());
    seed_grant(&state, "mcp-token").await;

    let response = app
        .oneshot(mcp_request(
            "/mcp/acme",
            Some("mcp-token"),
            serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "find_projects", "arguments": {"organizationSlug": "evil"}}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(parsed["result"]["isError"], false);
}

#[tokio::test]
async fn test_mcp_get_is_method_not_allowed() {
    let (app, _) = test_app("sentry.io");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_notification_returns_accepted() {
    let (app, state) = test_app("sentry.io");
    seed_grant(&state, "mcp-token").await;

    let response = app
        .oneshot(mcp_request(
            "/mcp",
            Some("mcp-token"),
            serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_agent_flag_reaches_handler_context() {
    let (app, state) = test_app("sentry.io");
    seed_grant(&state, "mcp-token").await;

    // use_sentry refuses without agent=1; with the flag (and no model
    // configured) it fails differently, proving the flag flows through.
    let call = serde_json::json!({
        "jsonrpc": "2.0", "id": 1, "method": "tools/call",
        "params": {"name": "use_sentry", "arguments": {"request": "do things"}}
    });

    let response = app
        .clone()
        .oneshot(mcp_request("/mcp", Some("mcp-token"), call.clone()))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let text = parsed["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("agent=1"), "{}", text);

    let response = app
        .oneshot(mcp_request("/mcp?agent=1", Some("mcp-token"), call))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let text = parsed["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("**Configuration Error**"), "{}", text);
}
