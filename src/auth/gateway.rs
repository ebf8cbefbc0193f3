//! Federated OAuth gateway
//!
//! The gateway is a thin authorization server in front of the upstream's:
//! it registers MCP clients dynamically, shows the approval dialog (at most
//! once per browser per client), then federates the authorization code flow
//! upstream. The original MCP-client request rides along as the opaque
//! `state` parameter and is reconstructed at the callback, where the MCP
//! token is bound to the upstream user and access token.

use super::cookie::{ApprovedClients, cookie_value};
use crate::config::Config;
use crate::constants::{APPROVED_CLIENTS_COOKIE, UPSTREAM_OAUTH_SCOPES};
use crate::model::{AuthGrant, OAuthTransitState, PendingAuthorization, RegisteredClient};
use crate::permissions::{
    PERMISSION_ISSUE_TRIAGE, PERMISSION_PROJECT_MANAGEMENT, scopes_from_permissions,
    skills_from_permissions,
};
use crate::storage::GrantStore;
use crate::upstream::UpstreamClient;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope as OAuthScope,
    TokenResponse as _, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Issued MCP access tokens are valid this long
const TOKEN_EXPIRY_SECS: i64 = 8 * 60 * 60;

/// Shared state for the OAuth routes
#[derive(Clone)]
pub struct OAuthGatewayState {
    pub config: Arc<Config>,
    pub store: Arc<dyn GrantStore>,
}

pub fn create_oauth_routes(state: OAuthGatewayState) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(handle_metadata),
        )
        .route("/oauth/register", post(handle_register))
        .route(
            "/oauth/authorize",
            get(handle_authorize_get).post(handle_authorize_post),
        )
        .route("/oauth/callback", get(handle_callback))
        .route("/oauth/token", post(handle_token))
        .with_state(state)
}

/// Origin of this deployment as the client sees it, honoring proxy headers.
pub fn request_origin(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", proto, host)
}

// ============================================================================
// TRANSIT STATE
// ============================================================================

fn encode_transit(transit: &OAuthTransitState) -> String {
    let json = serde_json::to_string(transit).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json.as_bytes())
}

fn decode_transit(raw: &str) -> Option<OAuthTransitState> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

// ============================================================================
// DISCOVERY
// ============================================================================

async fn handle_metadata(headers: HeaderMap) -> impl IntoResponse {
    let origin = request_origin(&headers);
    Json(json!({
        "issuer": origin,
        "authorization_endpoint": format!("{}/oauth/authorize", origin),
        "token_endpoint": format!("{}/oauth/token", origin),
        "registration_endpoint": format!("{}/oauth/register", origin),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code"],
        "token_endpoint_auth_methods_supported": ["none", "client_secret_post"],
        "code_challenge_methods_supported": ["S256"],
    }))
}

// ============================================================================
// DYNAMIC CLIENT REGISTRATION
// ============================================================================

#[derive(Debug, Deserialize)]
struct ClientRegistrationRequest {
    client_name: String,
    redirect_uris: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ClientRegistrationResponse {
    client_id: String,
    client_secret: String,
    client_name: String,
    redirect_uris: Vec<String>,
    grant_types: Vec<String>,
    response_types: Vec<String>,
    token_endpoint_auth_method: String,
    client_id_issued_at: i64,
    client_secret_expires_at: i64,
}

fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.is_empty() || uri.len() > 2048 {
        return false;
    }
    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };
    // HTTPS, or loopback for local development clients. Fragments are
    // forbidden by OAuth 2.1.
    let host = parsed.host_str().unwrap_or("");
    let loopback = host == "localhost" || host == "127.0.0.1" || host == "[::1]";
    let scheme_ok = parsed.scheme() == "https" || (parsed.scheme() == "http" && loopback);
    scheme_ok && parsed.fragment().is_none()
}

async fn handle_register(
    State(state): State<OAuthGatewayState>,
    Json(req): Json<ClientRegistrationRequest>,
) -> Response {
    if req.client_name.is_empty() || req.client_name.len() > 100 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_client_metadata", "error_description": "client_name must be between 1 and 100 characters"})),
        )
            .into_response();
    }
    if req.redirect_uris.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_redirect_uri", "error_description": "redirect_uris is required"})),
        )
            .into_response();
    }
    for uri in &req.redirect_uris {
        if !is_valid_redirect_uri(uri) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_redirect_uri", "error_description": format!("Invalid redirect URI: {}", uri)})),
            )
                .into_response();
        }
    }

    let client = RegisteredClient {
        id: Uuid::new_v4().to_string(),
        secret: Some(generate_secret()),
        name: req.client_name.clone(),
        redirect_uris: req.redirect_uris.clone(),
        created_at: Utc::now(),
    };
    if let Err(e) = state.store.save_client(&client).await {
        tracing::error!("failed to save registered client: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "server_error"})),
        )
            .into_response();
    }

    Json(ClientRegistrationResponse {
        client_id: client.id,
        client_secret: client.secret.unwrap_or_default(),
        client_name: client.name,
        redirect_uris: client.redirect_uris,
        grant_types: vec!["authorization_code".to_string()],
        response_types: vec!["code".to_string()],
        token_endpoint_auth_method: "none".to_string(),
        client_id_issued_at: Utc::now().timestamp(),
        client_secret_expires_at: 0,
    })
    .into_response()
}

// ============================================================================
// AUTHORIZE
// ============================================================================

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    client_id: String,
    redirect_uri: String,
    #[serde(default)]
    response_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    code_challenge: Option<String>,
    #[serde(default)]
    code_challenge_method: Option<String>,
}

/// 302 Found. `axum::response::Redirect` only offers 303/307/308; the OAuth
/// flow redirects with a plain 302.
fn found(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to redirect").into_response()
        })
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: sans-serif; max-width: 480px; margin: 80px auto;">
<h1>{title}</h1>
<p>{message}</p>
</body>
</html>"#
    );
    (status, Html(html)).into_response()
}

async fn handle_authorize_get(
    State(state): State<OAuthGatewayState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let client = match state.store.get_client(&params.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return error_page(
                StatusCode::BAD_REQUEST,
                "Invalid request",
                "Unknown client. Register the client before requesting authorization.",
            );
        }
        Err(e) => {
            tracing::error!("failed to load client: {}", e);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error",
                "Could not process the authorization request.",
            );
        }
    };

    if !client.redirect_uris.contains(&params.redirect_uri) {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid redirect URI",
            "The redirect URI does not match the client registration.",
        );
    }
    if params.response_type.as_deref() != Some("code") {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "Only the authorization code flow is supported.",
        );
    }

    let transit = OAuthTransitState {
        client_id: params.client_id.clone(),
        redirect_uri: params.redirect_uri.clone(),
        scope: params.scope.clone(),
        state: params.state.clone(),
        code_challenge: params.code_challenge.clone(),
        code_challenge_method: params.code_challenge_method.clone(),
        permissions: Vec::new(),
    };

    // A browser that already approved this client skips the dialog.
    let approved = approved_clients_from(&headers, &state.config.cookie_secret);
    if approved.contains(&params.client_id) {
        return redirect_upstream(&state.config, &headers, transit);
    }

    Html(approval_page(&client.name, &encode_transit(&transit))).into_response()
}

/// Render the approval dialog. The original request rides in the hidden
/// `state` field; the permission checkboxes become the granted bundles.
fn approval_page(client_name: &str, transit: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Authorize {client_name}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            max-width: 500px;
            margin: 50px auto;
            padding: 20px;
            background-color: #f5f5f5;
        }}
        .consent-box {{
            background: white;
            border-radius: 8px;
            padding: 30px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{ font-size: 22px; color: #333; }}
        .client-name {{ font-size: 18px; font-weight: bold; color: #6c5fc7; }}
        label {{ display: block; margin: 12px 0; }}
        .always {{ color: #666; font-size: 14px; }}
        button {{
            width: 100%;
            margin-top: 24px;
            padding: 12px;
            font-size: 16px;
            border: none;
            border-radius: 4px;
            background-color: #6c5fc7;
            color: white;
            cursor: pointer;
        }}
    </style>
</head>
<body>
    <div class="consent-box">
        <h1>Authorization Request</h1>
        <p><span class="client-name">{client_name}</span> wants to access your Sentry account.</p>
        <p class="always">It will always be able to view organizations, projects, teams,
        releases, and error events on your behalf.</p>
        <form method="POST" action="/oauth/authorize">
            <input type="hidden" name="state" value="{transit}">
            <label>
                <input type="checkbox" name="permission" value="{triage}" checked>
                Resolve, ignore, and assign issues
            </label>
            <label>
                <input type="checkbox" name="permission" value="{project}">
                Create and modify projects, teams, and DSNs
            </label>
            <button type="submit">Approve</button>
        </form>
    </div>
</body>
</html>"#,
        client_name = client_name,
        transit = transit,
        triage = PERMISSION_ISSUE_TRIAGE,
        project = PERMISSION_PROJECT_MANAGEMENT,
    )
}

async fn handle_authorize_post(
    State(state): State<OAuthGatewayState>,
    headers: HeaderMap,
    axum::extract::Form(fields): axum::extract::Form<Vec<(String, String)>>,
) -> Response {
    let mut transit_raw: Option<String> = None;
    let mut permissions: Vec<String> = Vec::new();
    for (key, value) in fields {
        match key.as_str() {
            "state" => transit_raw = Some(value),
            "permission" => permissions.push(value),
            _ => {}
        }
    }

    let Some(mut transit) = transit_raw.as_deref().and_then(decode_transit) else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "The authorization request is missing or malformed. Please restart the flow.",
        );
    };
    transit.permissions = permissions;

    // Re-validate against the registration; the form is attacker-writable.
    match state.store.get_client(&transit.client_id).await {
        Ok(Some(client)) if client.redirect_uris.contains(&transit.redirect_uri) => {}
        _ => {
            return error_page(
                StatusCode::BAD_REQUEST,
                "Invalid request",
                "Unknown client or redirect URI. Please restart the flow.",
            );
        }
    }

    // Remember the approval for this browser.
    let mut approved = approved_clients_from(&headers, &state.config.cookie_secret);
    approved.add(transit.client_id.clone());
    let cookie = format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=31536000",
        APPROVED_CLIENTS_COOKIE,
        approved.encode(&state.config.cookie_secret)
    );

    let mut response = redirect_upstream(&state.config, &headers, transit);
    if let Ok(value) = cookie.parse() {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn approved_clients_from(headers: &HeaderMap, secret: &str) -> ApprovedClients {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| cookie_value(cookies, APPROVED_CLIENTS_COOKIE))
        .and_then(|value| ApprovedClients::decode(value, secret))
        .unwrap_or_default()
}

/// 302 to the upstream authorize endpoint. The full upstream scope set is
/// always requested; what the MCP client may use is narrowed separately by
/// the granted permissions.
fn redirect_upstream(config: &Config, headers: &HeaderMap, transit: OAuthTransitState) -> Response {
    let origin = request_origin(headers);
    let auth_url = format!("https://{}/oauth/authorize/", config.upstream_host);
    let redirect_uri = format!("{}/oauth/callback", origin);

    let client = match build_upstream_client(config, &auth_url, &redirect_uri) {
        Ok(client) => client,
        Err(message) => {
            tracing::error!("upstream OAuth client misconfigured: {}", message);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error",
                "The gateway's upstream OAuth configuration is invalid.",
            );
        }
    };

    let transit_state = encode_transit(&transit);
    let (url, _) = client
        .authorize_url(|| CsrfToken::new(transit_state))
        .add_scopes(
            UPSTREAM_OAUTH_SCOPES
                .iter()
                .map(|s| OAuthScope::new(s.to_string())),
        )
        .url();

    found(url.as_str())
}

type UpstreamOAuthClient = oauth2::basic::BasicClient<
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

// The oauth2 typestate does not allow extracting a helper per endpoint, so
// the whole client is assembled in one place.
fn build_upstream_client(
    config: &Config,
    auth_url: &str,
    redirect_uri: &str,
) -> std::result::Result<UpstreamOAuthClient, String> {
    let token_url = format!("https://{}/oauth/token/", config.upstream_host);
    Ok(
        BasicClient::new(ClientId::new(config.upstream_client_id.clone()))
            .set_client_secret(ClientSecret::new(config.upstream_client_secret.clone()))
            .set_auth_uri(AuthUrl::new(auth_url.to_string()).map_err(|e| e.to_string())?)
            .set_token_uri(TokenUrl::new(token_url).map_err(|e| e.to_string())?)
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.to_string()).map_err(|e| e.to_string())?,
            ),
    )
}

// ============================================================================
// CALLBACK
// ============================================================================

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

async fn handle_callback(
    State(state): State<OAuthGatewayState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = &params.error {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Authorization failed",
            params.error_description.as_deref().unwrap_or(error),
        );
    }

    let Some(transit) = params.state.as_deref().and_then(decode_transit) else {
        return error_page(StatusCode::BAD_REQUEST, "Invalid state", "Invalid state");
    };

    if transit.redirect_uri.is_empty() {
        return error_page(StatusCode::BAD_REQUEST, "No redirect URL", "No redirect URL");
    }
    match state.store.get_client(&transit.client_id).await {
        Ok(Some(client)) if client.redirect_uris.contains(&transit.redirect_uri) => {}
        _ => {
            return error_page(
                StatusCode::BAD_REQUEST,
                "Invalid redirect URL",
                "Invalid redirect URL",
            );
        }
    }

    // The approval cookie must cover the client named in the state; a cookie
    // minted for one client is worthless for another.
    let approved = approved_clients_from(&headers, &state.config.cookie_secret);
    if !approved.contains(&transit.client_id) {
        return error_page(
            StatusCode::FORBIDDEN,
            "Authorization failed",
            "Authorization failed: Client not approved",
        );
    }

    let Some(code) = params.code else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "Missing authorization code",
        );
    };

    let origin = request_origin(&headers);
    let auth_url = format!("https://{}/oauth/authorize/", state.config.upstream_host);
    let redirect_uri = format!("{}/oauth/callback", origin);
    let oauth_client = match build_upstream_client(&state.config, &auth_url, &redirect_uri) {
        Ok(client) => client,
        Err(message) => {
            tracing::error!("upstream OAuth client misconfigured: {}", message);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error",
                "The gateway's upstream OAuth configuration is invalid.",
            );
        }
    };

    // Redirects are disabled on the exchange client so an authorization
    // code cannot be replayed through one.
    let http_client = match reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("failed to build token exchange client: {}", e);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error",
                "Could not contact the upstream.",
            );
        }
    };

    let token_result = match oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .request_async(&http_client)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("upstream token exchange failed: {}", e);
            return error_page(
                StatusCode::BAD_GATEWAY,
                "Authorization failed",
                "Token exchange with the upstream failed. Please restart the flow.",
            );
        }
    };
    let upstream_token = token_result.access_token().secret().clone();

    let upstream_user = match UpstreamClient::new(
        state.config.upstream_host.clone(),
        Some(upstream_token.clone()),
    )
    .get_authenticated_user()
    .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("failed to resolve upstream user: {}", e);
            return error_page(
                StatusCode::BAD_GATEWAY,
                "Authorization failed",
                "Could not resolve the authenticated user.",
            );
        }
    };

    let permissions = transit.permissions.clone();
    let grant = AuthGrant {
        user_id: upstream_user.id_string(),
        user_name: upstream_user.name.clone(),
        client_id: transit.client_id.clone(),
        access_token: upstream_token,
        scope: transit.scope.clone().unwrap_or_default(),
        granted_scopes: scopes_from_permissions(Some(&permissions)),
        granted_skills: skills_from_permissions(Some(&permissions)),
        issued_at: Utc::now(),
    };

    match complete_authorization(state.store.as_ref(), &transit, grant).await {
        Ok(redirect_to) => found(&redirect_to),
        Err(e) => {
            tracing::error!("failed to complete authorization: {}", e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error",
                "Could not complete the authorization.",
            )
        }
    }
}

/// Bind the grant to a one-time code and build the redirect that carries it
/// back to the MCP client.
async fn complete_authorization(
    store: &dyn GrantStore,
    transit: &OAuthTransitState,
    grant: AuthGrant,
) -> crate::Result<String> {
    let code = generate_secret();
    store
        .save_pending(&PendingAuthorization {
            code: code.clone(),
            client_id: transit.client_id.clone(),
            redirect_uri: transit.redirect_uri.clone(),
            code_challenge: transit.code_challenge.clone(),
            code_challenge_method: transit.code_challenge_method.clone(),
            grant,
            created_at: Utc::now(),
        })
        .await?;

    let mut redirect_to = format!(
        "{}{}code={}",
        transit.redirect_uri,
        if transit.redirect_uri.contains('?') { "&" } else { "?" },
        urlencoding::encode(&code)
    );
    if let Some(client_state) = &transit.state {
        redirect_to.push_str(&format!("&state={}", urlencoding::encode(client_state)));
    }
    Ok(redirect_to)
}

// ============================================================================
// TOKEN
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenRequest {
    grant_type: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    code_verifier: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponseBody {
    access_token: String,
    token_type: String,
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn token_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(json!({"error": error, "error_description": description})),
    )
        .into_response()
}

async fn handle_token(
    State(state): State<OAuthGatewayState>,
    axum::extract::Form(req): axum::extract::Form<TokenRequest>,
) -> Response {
    if req.grant_type != "authorization_code" {
        return token_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            &format!("Unsupported grant_type: {}", req.grant_type),
        );
    }
    let Some(code) = req.code else {
        return token_error(StatusCode::BAD_REQUEST, "invalid_request", "code is required");
    };

    let pending = match state.store.take_pending(&code).await {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            return token_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "authorization code not found",
            );
        }
        Err(e) => {
            tracing::error!("failed to load authorization code: {}", e);
            return token_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "");
        }
    };

    if let Some(client_id) = &req.client_id
        && client_id != &pending.client_id
    {
        return token_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "client_id mismatch",
        );
    }
    if let Some(redirect_uri) = &req.redirect_uri
        && redirect_uri != &pending.redirect_uri
    {
        return token_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "redirect_uri mismatch",
        );
    }

    // PKCE: verify S256(code_verifier) against the stored challenge.
    if let Some(stored_challenge) = &pending.code_challenge {
        let Some(code_verifier) = req.code_verifier else {
            return token_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "code_verifier is required",
            );
        };
        use sha2::{Digest, Sha256};
        use subtle::ConstantTimeEq;
        let hash = Sha256::digest(code_verifier.as_bytes());
        let computed = URL_SAFE_NO_PAD.encode(hash);
        if computed
            .as_bytes()
            .ct_eq(stored_challenge.as_bytes())
            .unwrap_u8()
            == 0
        {
            return token_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "PKCE validation failed",
            );
        }
    }

    let access_token = generate_secret();
    let scope = pending.grant.scope.clone();
    if let Err(e) = state.store.save_grant(&access_token, &pending.grant).await {
        tracing::error!("failed to save grant: {}", e);
        return token_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "");
    }

    Json(TokenResponseBody {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: TOKEN_EXPIRY_SECS,
        scope: if scope.is_empty() { None } else { Some(scope) },
    })
    .into_response()
}

/// Generate a URL-safe secret (client secrets, authorization codes, tokens).
pub fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod gateway_test;
