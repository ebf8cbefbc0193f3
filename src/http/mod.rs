//! HTTP server for the gateway
//!
//! Composes the edge middleware, the OAuth routes, the discovery
//! endpoints, and the stateless MCP endpoint into one axum app.

pub mod discovery;
pub mod middleware;

use crate::agent::{ChatModel, OpenAiChatModel};
use crate::auth::{OAuthGatewayState, create_oauth_routes, request_origin};
use crate::config::Config;
use crate::context::{Constraints, ServerContext, Services};
use crate::mcp::Dispatcher;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use crate::storage::{GrantStore, KvStore, MemoryStore};
use crate::verifier::{ConstraintVerifier, VerifyOptions};
use crate::{GatewayError, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub grants: Arc<dyn GrantStore>,
    pub kv: Arc<dyn KvStore>,
    pub dispatcher: Dispatcher,
    pub chat_model: Option<Arc<dyn ChatModel>>,
}

impl AppState {
    /// Wire up the default in-memory deployment.
    pub fn new(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let chat_model = OpenAiChatModel::from_config(&config)
            .map(|model| Arc::new(model) as Arc<dyn ChatModel>);
        Self {
            config: Arc::new(config),
            grants: store.clone(),
            kv: store,
            dispatcher: Dispatcher::new(crate::tools::registry()),
            chat_model,
        }
    }
}

/// Start the HTTP server.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))?;

    let state = AppState::new(config);
    let app = build_router(state);

    tracing::info!("Starting MCP gateway on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| GatewayError::internal(format!("Server error: {}", e)))?;
    Ok(())
}

/// Build the router with all endpoints and the middleware stack.
pub fn build_router(state: AppState) -> Router {
    let oauth_state = OAuthGatewayState {
        config: state.config.clone(),
        store: state.grants.clone(),
    };

    let app_routes = Router::new()
        .route("/", get(discovery::root))
        .route("/robots.txt", get(discovery::robots_txt))
        .route("/llms.txt", get(discovery::llms_txt))
        .route("/healthz", get(discovery::healthz))
        .route("/metrics", get(discovery::metrics))
        .route("/sse", any(discovery::sse_gone))
        .route(
            "/.well-known/oauth-protected-resource",
            get(discovery::protected_resource_root),
        )
        .route(
            "/.well-known/oauth-protected-resource/{*path}",
            get(discovery::protected_resource),
        )
        .route("/mcp", post(handle_mcp_root).get(mcp_method_not_allowed))
        .route("/mcp/{org}", post(handle_mcp_org))
        .route("/mcp/{org}/{project}", post(handle_mcp_org_project))
        .with_state(state);

    app_routes
        .merge(create_oauth_routes(oauth_state))
        // Execution order: CORS (answers preflights), client IP, security
        // headers, CSRF, bot filter.
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer())
                .layer(axum::middleware::from_fn(middleware::client_ip_middleware))
                .layer(axum::middleware::from_fn(
                    middleware::security_headers_middleware,
                ))
                .layer(axum::middleware::from_fn(middleware::csrf_middleware))
                .layer(axum::middleware::from_fn(middleware::bot_filter_middleware))
                .layer(axum::middleware::from_fn(middleware::metrics_middleware)),
        )
}

/// CORS for the cross-origin surfaces. Browser-based MCP clients fetch the
/// MCP endpoint, the token and registration endpoints, and the discovery
/// documents from arbitrary origins; tokens travel in the Authorization
/// header, never in cookies, so no credentialed CORS is involved. The
/// browser-facing OAuth pages stay protected by the CSRF origin check,
/// which runs regardless of these response headers.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .expose_headers([header::WWW_AUTHENTICATE])
}

// ============================================================================
// MCP ENDPOINT
// ============================================================================

async fn mcp_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        "The MCP endpoint is POST-only; this deployment is stateless.",
    )
        .into_response()
}

async fn handle_mcp_root(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    serve_mcp(state, headers, None, None, query, body).await
}

async fn handle_mcp_org(
    State(state): State<AppState>,
    AxumPath(org): AxumPath<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    serve_mcp(state, headers, Some(org), None, query, body).await
}

async fn handle_mcp_org_project(
    State(state): State<AppState>,
    AxumPath((org, project)): AxumPath<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    serve_mcp(state, headers, Some(org), Some(project), query, body).await
}

async fn serve_mcp(
    state: AppState,
    headers: HeaderMap,
    org: Option<String>,
    project: Option<String>,
    query: HashMap<String, String>,
    body: Bytes,
) -> Response {
    let origin = request_origin(&headers);

    // Bearer auth against the grant store.
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));
    let Some(token) = token else {
        return unauthorized(&origin, "Unauthorized");
    };
    let grant = match state.grants.get_grant(token).await {
        Ok(Some(grant)) => grant,
        Ok(None) => return unauthorized(&origin, "Invalid or expired token"),
        Err(e) => {
            tracing::error!("grant lookup failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    // Parse the JSON-RPC envelope before doing any upstream work.
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let response =
                JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
            return Json(response).into_response();
        }
    };

    // Verify the URL-path narrowing against the upstream.
    let requested = Constraints::from_path(org, project);
    let verified = match ConstraintVerifier::verify(
        &requested,
        VerifyOptions {
            access_token: &grant.access_token,
            user_id: Some(&grant.user_id),
            host: &state.config.upstream_host,
            cache: Some(state.kv.clone()),
        },
    )
    .await
    {
        Ok(constraints) => constraints,
        Err(failure) => {
            let status = StatusCode::from_u16(failure.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, failure.message).into_response();
        }
    };

    let ctx = ServerContext {
        user_id: Some(grant.user_id.clone()),
        client_id: grant.client_id.clone(),
        access_token: grant.access_token.clone(),
        upstream_host: state.config.upstream_host.clone(),
        mcp_url: Some(format!("{}/mcp", origin)),
        granted_scopes: grant.granted_scopes.clone(),
        granted_skills: grant.granted_skills.clone(),
        constraints: verified,
        mcp_client_name: None,
        mcp_client_version: None,
        mcp_protocol_version: headers
            .get("mcp-protocol-version")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        agent_mode: query.get("agent").map(|v| v == "1").unwrap_or(false),
        services: Services {
            kv: Some(state.kv.clone()),
            chat_model: state.chat_model.clone(),
        },
    };

    let dispatcher = state.dispatcher.clone();
    let handler_ctx = ctx.clone();
    let response = crate::context::run(ctx, async move {
        dispatcher.handle(&handler_ctx, request).await
    })
    .await;

    match response {
        Some(response) => Json(response).into_response(),
        // Notifications get no body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn unauthorized(origin: &str, message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            format!(
                "Bearer realm=\"Sentry MCP\", \
                 resource_metadata=\"{}/.well-known/oauth-protected-resource/mcp\"",
                origin
            ),
        )],
        message,
    )
        .into_response()
}

#[cfg(test)]
mod http_test;
