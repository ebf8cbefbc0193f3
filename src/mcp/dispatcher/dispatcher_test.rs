use super::*;
use crate::context::{Constraints, ServerContext};
use crate::permissions::{Skill, base_scopes, base_skills};
use crate::tools::{Field, InputSchema, optional_project_field, org_field, project_slug_or_id_field, region_field, registry};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_ctx() -> ServerContext {
    ServerContext {
        user_id: Some("u1".to_string()),
        client_id: "client-a".to_string(),
        access_token: "T".to_string(),
        upstream_host: "sentry.io".to_string(),
        granted_scopes: base_scopes(),
        granted_skills: base_skills(),
        ..Default::default()
    }
}

fn rpc(method: &str, params: serde_json::Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: method.to_string(),
        params,
    }
}

// ========================================
// CONSTRAINT MERGING
// ========================================

#[test]
fn test_apply_constraints_overrides_user_values() {
    let schema = InputSchema::new(vec![org_field(), optional_project_field(), region_field()]);
    let constraints = Constraints {
        organization_slug: Some("acme".to_string()),
        project_slug: Some("web".to_string()),
        region_url: Some("https://us.sentry.io".to_string()),
        project_capabilities: None,
    };

    let merged = apply_constraints(
        json!({"organizationSlug": "evil", "projectSlug": "evil-project", "query": "is:unresolved"}),
        &constraints,
        &schema,
    );

    assert_eq!(merged["organizationSlug"], "acme");
    assert_eq!(merged["projectSlug"], "web");
    assert_eq!(merged["regionUrl"], "https://us.sentry.io");
    // Unconstrained caller values survive.
    assert_eq!(merged["query"], "is:unresolved");
}

#[test]
fn test_apply_constraints_project_alias() {
    // Schema has only projectSlugOrId: the project constraint lands there.
    let schema = InputSchema::new(vec![org_field(), project_slug_or_id_field()]);
    let constraints = Constraints {
        organization_slug: Some("acme".to_string()),
        project_slug: Some("web".to_string()),
        region_url: None,
        project_capabilities: None,
    };

    let merged = apply_constraints(json!({"projectSlugOrId": "1234"}), &constraints, &schema);
    assert_eq!(merged["projectSlugOrId"], "web");
    assert!(merged.get("projectSlug").is_none());
}

#[test]
fn test_apply_constraints_only_touches_declared_fields() {
    let schema = InputSchema::new(vec![Field::string("query", "q")]);
    let constraints = Constraints {
        organization_slug: Some("acme".to_string()),
        project_slug: Some("web".to_string()),
        region_url: Some("https://us.sentry.io".to_string()),
        project_capabilities: None,
    };

    let merged = apply_constraints(json!({"query": "x"}), &constraints, &schema);
    assert!(merged.get("organizationSlug").is_none());
    assert!(merged.get("projectSlug").is_none());
    assert!(merged.get("regionUrl").is_none());
}

#[test]
fn test_apply_constraints_on_non_object_params() {
    let schema = InputSchema::new(vec![org_field()]);
    let constraints = Constraints {
        organization_slug: Some("acme".to_string()),
        ..Default::default()
    };
    let merged = apply_constraints(json!(null), &constraints, &schema);
    assert_eq!(merged["organizationSlug"], "acme");
}

// ========================================
// ERROR FORMATTING
// ========================================

#[test]
fn test_format_user_input_error() {
    let text = format_tool_error(&GatewayError::user_input("bad sort field"));
    assert!(text.starts_with("**Input Error**"));
    assert!(text.contains("bad sort field"));
    assert!(!text.contains("Event ID"));
}

#[test]
fn test_format_config_error() {
    let text = format_tool_error(&GatewayError::config("OPENAI_API_KEY missing"));
    assert!(text.starts_with("**Configuration Error**"));
}

#[test]
fn test_format_api_error_client_side() {
    let text = format_tool_error(&GatewayError::api(404, "Organization not found"));
    assert!(text.starts_with("**Error**"));
    assert!(text.contains("HTTP 404"));
    assert!(!text.contains("Event ID"));
}

#[test]
fn test_format_api_error_server_side_has_event_id() {
    let text = format_tool_error(&GatewayError::api(502, "upstream exploded"));
    assert!(text.starts_with("**Error**"));
    assert!(text.contains("HTTP 502"));
    assert!(text.contains("**Event ID**"));
}

#[test]
fn test_format_unknown_error_has_event_id() {
    let text = format_tool_error(&GatewayError::internal("surprising"));
    assert!(text.starts_with("**Error**"));
    assert!(text.contains("**Event ID**"));
}

// ========================================
// DISPATCH
// ========================================

#[tokio::test]
async fn test_initialize_echoes_supported_version() {
    let dispatcher = Dispatcher::new(registry());
    let ctx = base_ctx();

    let response = dispatcher
        .handle(
            &ctx,
            rpc("initialize", json!({"protocolVersion": "2025-03-26"})),
        )
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], "sentry-mcp");

    let response = dispatcher
        .handle(
            &ctx,
            rpc("initialize", json!({"protocolVersion": "1999-01-01"})),
        )
        .await
        .unwrap();
    assert_eq!(
        response.result.unwrap()["protocolVersion"],
        LATEST_PROTOCOL_VERSION
    );
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let dispatcher = Dispatcher::new(registry());
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: None,
        method: "notifications/initialized".to_string(),
        params: json!({}),
    };
    assert!(dispatcher.handle(&base_ctx(), request).await.is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let dispatcher = Dispatcher::new(registry());
    let response = dispatcher
        .handle(&base_ctx(), rpc("tools/destroy", json!({})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_tool_is_protocol_error() {
    let dispatcher = Dispatcher::new(registry());
    let response = dispatcher
        .handle(
            &base_ctx(),
            rpc("tools/call", json!({"name": "rm_rf", "arguments": {}})),
        )
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert!(error.message.contains("Unknown tool"));
}

#[tokio::test]
async fn test_invalid_arguments_are_protocol_error() {
    let dispatcher = Dispatcher::new(registry());
    // find_teams requires organizationSlug and no constraint provides it.
    let response = dispatcher
        .handle(
            &base_ctx(),
            rpc("tools/call", json!({"name": "find_teams", "arguments": {}})),
        )
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert!(error.message.contains("organizationSlug"), "{}", error.message);
}

#[tokio::test]
async fn test_tools_list_reflects_constraints() {
    let dispatcher = Dispatcher::new(registry());
    let mut ctx = base_ctx();
    ctx.constraints.organization_slug = Some("acme".to_string());

    let response = dispatcher.handle(&ctx, rpc("tools/list", json!({}))).await.unwrap();
    let result = response.result.unwrap();
    let tools = result["tools"].as_array().unwrap();
    assert!(!tools.is_empty());

    for tool in tools {
        assert!(
            tool["inputSchema"]["properties"]
                .get("organizationSlug")
                .is_none(),
            "{} still advertises organizationSlug",
            tool["name"]
        );
    }
}

#[tokio::test]
async fn test_tool_call_success_wraps_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/teams/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "1", "slug": "platform", "name": "Platform"}
        ])))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(registry());
    let mut ctx = base_ctx();
    ctx.upstream_host = server.uri();

    let response = dispatcher
        .handle(
            &ctx,
            rpc(
                "tools/call",
                json!({"name": "find_teams", "arguments": {"organizationSlug": "acme"}}),
            ),
        )
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("platform"));
    assert_eq!(result["content"][0]["type"], "text");
}

#[tokio::test]
async fn test_handler_error_becomes_is_error_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/teams/"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "database is on fire"})),
        )
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(registry());
    let mut ctx = base_ctx();
    ctx.upstream_host = server.uri();

    let response = dispatcher
        .handle(
            &ctx,
            rpc(
                "tools/call",
                json!({"name": "find_teams", "arguments": {"organizationSlug": "acme"}}),
            ),
        )
        .await
        .unwrap();

    // Errors surface as successful responses with isError, never as
    // protocol errors.
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("**Error**"), "{}", text);
    assert!(text.contains("HTTP 500"));
    assert!(text.contains("**Event ID**"));
}

#[tokio::test]
async fn test_prompts_flow() {
    let dispatcher = Dispatcher::new(registry());
    let ctx = base_ctx();

    let response = dispatcher.handle(&ctx, rpc("prompts/list", json!({}))).await.unwrap();
    let prompts = response.result.unwrap()["prompts"].as_array().unwrap().len();
    assert_eq!(prompts, 2);

    let response = dispatcher
        .handle(
            &ctx,
            rpc(
                "prompts/get",
                json!({"name": "fix_issue_with_seer", "arguments": {"organizationSlug": "acme", "issueId": "PROJ-1"}}),
            ),
        )
        .await
        .unwrap();
    let text = response.result.unwrap()["messages"][0]["content"]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("PROJ-1"));
}

#[tokio::test]
async fn test_resources_list() {
    let dispatcher = Dispatcher::new(registry());
    let response = dispatcher
        .handle(&base_ctx(), rpc("resources/list", json!({})))
        .await
        .unwrap();
    let resources = response.result.unwrap()["resources"].as_array().unwrap().len();
    assert!(resources > 5);
}

#[tokio::test]
async fn test_ping() {
    let dispatcher = Dispatcher::new(registry());
    let response = dispatcher.handle(&base_ctx(), rpc("ping", json!({}))).await.unwrap();
    assert_eq!(response.result.unwrap(), json!({}));
}
