use super::*;
use crate::context::Services;
use crate::permissions::{base_scopes, base_skills};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;

/// A model double that replays scripted replies and records every request
/// it sees.
struct ScriptedModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(replies: Vec<ChatMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn assistant(content: &str) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    fn assistant_tool_call(id: &str, name: &str, arguments: Value) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
            tool_call_id: None,
        }
    }

    fn recorded(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> crate::Result<ChatMessage> {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| GatewayError::internal("scripted model ran out of replies"))
    }
}

fn echo_tool() -> AgentTool {
    AgentTool::new(
        ToolSpec {
            name: "echo".to_string(),
            description: "Echo the input back.".to_string(),
            parameters: json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        },
        |args| async move {
            Value::String(format!(
                "echo: {}",
                args.get("text").and_then(|t| t.as_str()).unwrap_or("")
            ))
        },
    )
}

fn answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"answer": {"type": "string"}},
        "required": ["answer"],
    })
}

// ========================================
// THE LOOP
// ========================================

#[tokio::test]
async fn test_direct_answer() {
    let model = ScriptedModel::new(vec![ScriptedModel::assistant(r#"{"answer": "42"}"#)]);
    let outcome = call_embedded_agent(&model, "be helpful", "what is it", &[], &answer_schema())
        .await
        .unwrap();
    assert_eq!(outcome.result["answer"], "42");
    assert!(outcome.tool_calls.is_empty());
}

#[tokio::test]
async fn test_tool_calls_are_executed_and_captured() {
    let model = ScriptedModel::new(vec![
        ScriptedModel::assistant_tool_call("call-1", "echo", json!({"text": "hi"})),
        ScriptedModel::assistant(r#"{"answer": "done"}"#),
    ]);
    let tools = vec![echo_tool()];

    let outcome = call_embedded_agent(&model, "sys", "prompt", &tools, &answer_schema())
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].tool_name, "echo");
    assert_eq!(outcome.tool_calls[0].args, json!({"text": "hi"}));

    // The tool result was fed back to the model as a tool message.
    let requests = model.recorded();
    let second = &requests[1];
    let tool_message = second
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result message");
    assert_eq!(tool_message.content.as_deref(), Some("echo: hi"));
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call-1"));
}

#[tokio::test]
async fn test_unknown_tool_call_yields_error_payload() {
    let model = ScriptedModel::new(vec![
        ScriptedModel::assistant_tool_call("call-1", "missing_tool", json!({})),
        ScriptedModel::assistant(r#"{"answer": "recovered"}"#),
    ]);
    let outcome = call_embedded_agent(&model, "sys", "prompt", &[], &answer_schema())
        .await
        .unwrap();
    assert_eq!(outcome.result["answer"], "recovered");

    let requests = model.recorded();
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(tool_message.content.as_ref().unwrap().contains("Unknown tool"));
}

#[tokio::test]
async fn test_error_field_becomes_user_input_error() {
    let model = ScriptedModel::new(vec![ScriptedModel::assistant(
        r#"{"error": "I cannot answer that with the available data"}"#,
    )]);
    let err = call_embedded_agent(&model, "sys", "prompt", &[], &answer_schema())
        .await
        .unwrap_err();
    match err {
        GatewayError::UserInput(message) => {
            assert_eq!(message, "I cannot answer that with the available data");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_schema_violation_becomes_user_input_error() {
    let model = ScriptedModel::new(vec![ScriptedModel::assistant(r#"{"wrong_key": true}"#)]);
    let err = call_embedded_agent(&model, "sys", "prompt", &[], &answer_schema())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UserInput(_)));
    assert!(err.to_string().contains("failed validation"));
}

#[tokio::test]
async fn test_step_cap_is_enforced() {
    // The model loops on tool calls forever; the runtime must cut it off.
    let replies: Vec<ChatMessage> = (0..10)
        .map(|i| {
            ScriptedModel::assistant_tool_call(&format!("call-{}", i), "echo", json!({"text": "x"}))
        })
        .collect();
    let model = ScriptedModel::new(replies);
    let tools = vec![echo_tool()];

    let err = call_embedded_agent(&model, "sys", "prompt", &tools, &answer_schema())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("5 steps"), "{}", err);
    assert_eq!(model.recorded().len(), crate::constants::AGENT_MAX_STEPS);
}

#[tokio::test]
async fn test_fenced_json_is_accepted() {
    let model = ScriptedModel::new(vec![ScriptedModel::assistant(
        "```json\n{\"answer\": \"fenced\"}\n```",
    )]);
    let outcome = call_embedded_agent(&model, "sys", "prompt", &[], &answer_schema())
        .await
        .unwrap();
    assert_eq!(outcome.result["answer"], "fenced");
}

// ========================================
// RATE LIMITING
// ========================================

#[test]
fn test_rate_limit_key_shape() {
    let key = rate_limit_key("secret-token");
    assert!(key.starts_with("ratelimit:agent:"));
    // 16 bytes of digest, hex-encoded.
    assert_eq!(key.len(), "ratelimit:agent:".len() + 32);
    // Deterministic per token, distinct across tokens.
    assert_eq!(key, rate_limit_key("secret-token"));
    assert_ne!(key, rate_limit_key("other-token"));
}

#[tokio::test]
async fn test_rate_limit_enforced_via_kv() {
    use crate::storage::{KvStore, MemoryStore};
    let kv: std::sync::Arc<dyn KvStore> = std::sync::Arc::new(MemoryStore::new());
    let ctx = ServerContext {
        access_token: "T".to_string(),
        services: Services {
            kv: Some(kv),
            chat_model: None,
        },
        ..Default::default()
    };

    for _ in 0..crate::constants::AGENT_RATE_LIMIT_REQUESTS {
        check_rate_limit(&ctx).await.unwrap();
    }
    let err = check_rate_limit(&ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::UserInput(_)));
}

#[tokio::test]
async fn test_rate_limit_fails_open_without_backend() {
    let ctx = ServerContext::default();
    check_rate_limit(&ctx).await.unwrap();
}

// ========================================
// TRANSLATION RETRY (search_events)
// ========================================

#[tokio::test]
async fn test_search_events_retries_with_failure_feedback() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/0/organizations/acme/events/"))
        .and(query_param("query", "is:unresolved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"issue": "PROJ-1", "title": "Boom", "project": "web",
                       "timestamp": "2025-06-01T00:00:00Z", "trace": "abc"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // First attempt is SQL, second is a proper Sentry query.
    let model = std::sync::Arc::new(ScriptedModel::new(vec![
        ScriptedModel::assistant(r#"{"query": "SELECT * FROM issues", "sort": "-timestamp"}"#),
        ScriptedModel::assistant(r#"{"query": "is:unresolved", "sort": "-timestamp"}"#),
    ]));

    let ctx = ServerContext {
        user_id: Some("u1".to_string()),
        client_id: "client-a".to_string(),
        access_token: "T".to_string(),
        upstream_host: server.uri(),
        granted_scopes: base_scopes(),
        granted_skills: base_skills(),
        services: Services {
            kv: None,
            chat_model: Some(model.clone()),
        },
        ..Default::default()
    };

    let registry = crate::tools::registry();
    let search_events = registry
        .iter()
        .find(|t| t.name == "search_events")
        .expect("search_events registered");

    let output = (search_events.handler)(
        json!({
            "organizationSlug": "acme",
            "naturalLanguageQuery": "unresolved issues",
        }),
        ctx,
    )
    .await
    .unwrap();

    let text = match output {
        crate::tools::ToolOutput::Text(text) => text,
        _ => panic!("expected text output"),
    };
    assert!(text.contains("PROJ-1"), "{}", text);
    assert!(text.contains("is:unresolved"));

    // The second prompt carried the first failure verbatim.
    let requests = model.recorded();
    assert_eq!(requests.len(), 2);
    let retry_prompt = requests[1].messages[1].content.as_deref().unwrap();
    assert!(
        retry_prompt.contains("Previous attempt failed with: "),
        "{}",
        retry_prompt
    );
    assert!(retry_prompt.contains("Please correct the query."));
    assert!(retry_prompt.contains("SELECT * FROM issues"));
}
