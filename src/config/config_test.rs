use super::*;

fn test_config() -> Config {
    Config {
        upstream_host: "sentry.io".to_string(),
        upstream_client_id: "client-id".to_string(),
        upstream_client_secret: "client-secret".to_string(),
        cookie_secret: "0123456789abcdef0123456789abcdef".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_validate_rejects_url_host() {
    let mut config = test_config();
    config.upstream_host = "https://sentry.io".to_string();
    assert!(config.validate().is_err());

    config.upstream_host = "sentry.io/api".to_string();
    assert!(config.validate().is_err());

    config.upstream_host = "eu.sentry.io".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_reasoning_effort() {
    let mut config = test_config();
    config.openai_reasoning_effort = Some("maximum".to_string());
    assert!(config.validate().is_err());

    config.openai_reasoning_effort = Some("high".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_reasoning_effort_defaults() {
    let mut config = test_config();

    // Explicit value wins.
    config.openai_reasoning_effort = Some("medium".to_string());
    assert_eq!(config.resolved_reasoning_effort(), Some("medium"));

    // Empty string disables the parameter even for o-series models.
    config.openai_reasoning_effort = Some(String::new());
    config.openai_model = "o3-mini".to_string();
    assert_eq!(config.resolved_reasoning_effort(), None);

    // Unset defaults to low for o1-/o3- models only.
    config.openai_reasoning_effort = None;
    assert_eq!(config.resolved_reasoning_effort(), Some("low"));

    config.openai_model = "gpt-5".to_string();
    assert_eq!(config.resolved_reasoning_effort(), None);
}

#[test]
fn test_agent_enabled() {
    let mut config = test_config();
    assert!(!config.agent_enabled());
    config.openai_api_key = Some("sk-test".to_string());
    assert!(config.agent_enabled());
}

#[test]
fn test_base_url_is_programmatic_only() {
    let config = test_config().with_openai_base_url("http://localhost:11434/v1");
    assert_eq!(
        config.openai_base_url.as_deref(),
        Some("http://localhost:11434/v1")
    );

    // The builder is the only path; serialization never carries it.
    let json = serde_json::to_value(&config).unwrap();
    assert!(json.get("openai_base_url").is_none());
}
