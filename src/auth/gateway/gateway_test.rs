use super::*;
use crate::permissions::{base_scopes, base_skills};
use crate::storage::MemoryStore;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tower::ServiceExt;

const COOKIE_SECRET: &str = "0123456789abcdef0123456789abcdef";

fn test_state() -> (OAuthGatewayState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        upstream_host: "sentry.io".to_string(),
        upstream_client_id: "upstream-client".to_string(),
        upstream_client_secret: "upstream-secret".to_string(),
        cookie_secret: COOKIE_SECRET.to_string(),
        ..Default::default()
    };
    (
        OAuthGatewayState {
            config: Arc::new(config),
            store: store.clone(),
        },
        store,
    )
}

async fn register_client(router: &axum::Router, name: &str) -> String {
    let body = serde_json::json!({
        "client_name": name,
        "redirect_uris": ["https://example.com/callback"],
    });
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    parsed["client_id"].as_str().unwrap().to_string()
}

fn transit_for(client_id: &str) -> String {
    let transit = crate::model::OAuthTransitState {
        client_id: client_id.to_string(),
        redirect_uri: "https://example.com/callback".to_string(),
        scope: None,
        state: Some("client-nonce".to_string()),
        code_challenge: None,
        code_challenge_method: None,
        permissions: vec![],
    };
    URL_SAFE_NO_PAD.encode(serde_json::to_string(&transit).unwrap())
}

fn approval_cookie_for(client_id: &str) -> String {
    let mut approved = super::super::cookie::ApprovedClients::default();
    approved.add(client_id);
    format!(
        "{}={}",
        crate::constants::APPROVED_CLIENTS_COOKIE,
        approved.encode(COOKIE_SECRET)
    )
}

// ========================================
// REGISTRATION
// ========================================

#[tokio::test]
async fn test_register_and_render_approval_page() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);
    let client_id = register_client(&router, "Example MCP Client").await;

    let uri = format!(
        "/oauth/authorize?client_id={}&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback&response_type=code",
        client_id
    );
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Example MCP Client"));
    assert!(html.contains("name=\"state\""));
    assert!(html.contains("issue_triage"));
    assert!(html.contains("project_management"));
}

#[tokio::test]
async fn test_register_rejects_bad_redirect_uris() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);

    for uri in [
        "http://example.com/callback",
        "https://example.com/cb#fragment",
        "not-a-url",
    ] {
        let body = serde_json::json!({"client_name": "X", "redirect_uris": [uri]});
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/oauth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
    }

    // Loopback http is fine for development clients.
    let body = serde_json::json!({"client_name": "X", "redirect_uris": ["http://localhost:8123/cb"]});
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ========================================
// AUTHORIZE
// ========================================

#[tokio::test]
async fn test_authorize_rejects_unknown_client_and_bad_redirect() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);
    let client_id = register_client(&router, "Client").await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize?client_id=ghost&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback&response_type=code")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/oauth/authorize?client_id={}&redirect_uri=https%3A%2F%2Fevil.example%2Fcb&response_type=code",
                    client_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_approval_post_redirects_upstream_with_state() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);
    let client_id = register_client(&router, "Client").await;

    let form = format!(
        "state={}&permission=issue_triage",
        transit_for(&client_id)
    );
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://sentry.io/oauth/authorize/"), "{}", location);
    assert!(location.contains("client_id=upstream-client"));
    assert!(location.contains("state="));
    // The full upstream scope set is always requested.
    assert!(location.contains("event%3Awrite") || location.contains("event:write"));

    // The browser is remembered.
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with(crate::constants::APPROVED_CLIENTS_COOKIE));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn test_approval_post_with_bad_state_is_rejected() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/authorize")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("state=garbage&permission=issue_triage"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_approved_browser_skips_dialog() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);
    let client_id = register_client(&router, "Client").await;

    let uri = format!(
        "/oauth/authorize?client_id={}&redirect_uri=https%3A%2F%2Fexample.com%2Fcallback&response_type=code",
        client_id
    );
    let response = router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, approval_cookie_for(&client_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Straight to the upstream, no dialog.
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://sentry.io/oauth/authorize/"));
}

// ========================================
// CALLBACK
// ========================================

#[tokio::test]
async fn test_callback_rejects_bad_state() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/oauth/callback?code=abc&state=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("Invalid state"));
}

#[tokio::test]
async fn test_cookie_for_one_client_does_not_approve_another() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);
    let client_a = register_client(&router, "Client A").await;
    let client_b = register_client(&router, "Client B").await;

    // Cookie minted for A, state referencing B.
    let response = router
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/oauth/callback?code=abc&state={}",
                    transit_for(&client_b)
                ))
                .header(header::COOKIE, approval_cookie_for(&client_a))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(
        String::from_utf8_lossy(&bytes).contains("Authorization failed: Client not approved")
    );
}

// ========================================
// TOKEN
// ========================================

fn sample_grant(client_id: &str) -> crate::model::AuthGrant {
    crate::model::AuthGrant {
        user_id: "12345".to_string(),
        user_name: Some("Jane".to_string()),
        client_id: client_id.to_string(),
        access_token: "upstream-token".to_string(),
        scope: "org:read".to_string(),
        granted_scopes: base_scopes(),
        granted_skills: base_skills(),
        issued_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_token_exchange_with_pkce() {
    let (state, store) = test_state();
    let router = create_oauth_routes(state);

    let verifier = "correct-horse-battery-staple-and-then-some";
    use sha2::{Digest, Sha256};
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

    store
        .save_pending(&crate::model::PendingAuthorization {
            code: "auth-code-1".to_string(),
            client_id: "client-a".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
            code_challenge: Some(challenge),
            code_challenge_method: Some("S256".to_string()),
            grant: sample_grant("client-a"),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let form = format!(
        "grant_type=authorization_code&code=auth-code-1&client_id=client-a&code_verifier={}",
        verifier
    );
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let access_token = parsed["access_token"].as_str().unwrap();
    assert_eq!(parsed["token_type"], "Bearer");

    // The MCP token is bound to the upstream grant.
    let grant = store.get_grant(access_token).await.unwrap().unwrap();
    assert_eq!(grant.user_id, "12345");
    assert_eq!(grant.access_token, "upstream-token");

    // Codes are one-time use.
    let replay = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "grant_type=authorization_code&code=auth-code-1&client_id=client-a",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_rejects_wrong_pkce_verifier() {
    let (state, store) = test_state();
    let router = create_oauth_routes(state);

    use sha2::{Digest, Sha256};
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(b"the-real-verifier"));
    store
        .save_pending(&crate::model::PendingAuthorization {
            code: "auth-code-2".to_string(),
            client_id: "client-a".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
            code_challenge: Some(challenge),
            code_challenge_method: Some("S256".to_string()),
            grant: sample_grant("client-a"),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "grant_type=authorization_code&code=auth-code-2&client_id=client-a&code_verifier=wrong",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_rejects_unsupported_grant_type() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("grant_type=client_credentials"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========================================
// METADATA
// ========================================

#[tokio::test]
async fn test_authorization_server_metadata() {
    let (state, _) = test_state();
    let router = create_oauth_routes(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/.well-known/oauth-authorization-server")
                .header(header::HOST, "mcp.sentry.dev")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["issuer"], "https://mcp.sentry.dev");
    assert_eq!(
        parsed["authorization_endpoint"],
        "https://mcp.sentry.dev/oauth/authorize"
    );
}
