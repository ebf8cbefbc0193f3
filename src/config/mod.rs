//! Configuration management for the gateway
//!
//! All deployment configuration comes from environment variables; there is
//! no config file. `OPENAI_BASE_URL` is deliberately not readable from the
//! environment and can only be set programmatically.

use crate::constants::*;
use crate::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Complete gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream hostname (never a URL)
    pub upstream_host: String,

    /// OAuth client id registered with the upstream
    pub upstream_client_id: String,

    /// OAuth client secret registered with the upstream
    pub upstream_client_secret: String,

    /// Secret used to sign browser cookies
    pub cookie_secret: String,

    /// HTTP bind host
    pub http_host: String,

    /// HTTP bind port
    pub http_port: u16,

    /// OpenAI API key; embedded agents are disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    /// Model for the embedded agents
    pub openai_model: String,

    /// Reasoning effort override. `None` means "use the model default",
    /// an empty string disables the parameter entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_reasoning_effort: Option<String>,

    /// Alternate OpenAI-compatible endpoint. Programmatic only; there is no
    /// environment variable for this on purpose.
    #[serde(skip)]
    pub openai_base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_host: DEFAULT_UPSTREAM_HOST.to_string(),
            upstream_client_id: String::new(),
            upstream_client_secret: String::new(),
            cookie_secret: String::new(),
            http_host: "127.0.0.1".to_string(),
            http_port: 8788,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_reasoning_effort: None,
            openai_base_url: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Missing credentials are an error; missing OpenAI settings merely
    /// disable the embedded agents.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            upstream_host: env::var(ENV_UPSTREAM_HOST)
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_HOST.to_string()),
            upstream_client_id: env::var(ENV_UPSTREAM_CLIENT_ID).map_err(|_| {
                GatewayError::config(format!("{} must be set", ENV_UPSTREAM_CLIENT_ID))
            })?,
            upstream_client_secret: env::var(ENV_UPSTREAM_CLIENT_SECRET).map_err(|_| {
                GatewayError::config(format!("{} must be set", ENV_UPSTREAM_CLIENT_SECRET))
            })?,
            cookie_secret: env::var(ENV_COOKIE_SECRET)
                .map_err(|_| GatewayError::config(format!("{} must be set", ENV_COOKIE_SECRET)))?,
            http_host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            http_port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8788),
            openai_api_key: env::var(ENV_OPENAI_API_KEY).ok().filter(|k| !k.is_empty()),
            openai_model: env::var(ENV_OPENAI_MODEL)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_reasoning_effort: env::var(ENV_OPENAI_REASONING_EFFORT).ok(),
            openai_base_url: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Point the embedded agents at an alternate OpenAI-compatible endpoint.
    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = Some(base_url.into());
        self
    }

    /// Whether the embedded agents are available.
    pub fn agent_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Resolve the reasoning effort to send, if any.
    ///
    /// Explicit empty string disables the parameter. When unset, `o1-` and
    /// `o3-` models default to `low`; other models send nothing.
    pub fn resolved_reasoning_effort(&self) -> Option<&str> {
        match self.openai_reasoning_effort.as_deref() {
            Some("") => None,
            Some(effort) => Some(effort),
            None => {
                if self.openai_model.starts_with("o1-") || self.openai_model.starts_with("o3-") {
                    Some("low")
                } else {
                    None
                }
            }
        }
    }

    /// Validate structural requirements.
    pub fn validate(&self) -> Result<()> {
        if self.upstream_host.is_empty() {
            return Err(GatewayError::config("upstream host must not be empty"));
        }
        if self.upstream_host.contains("://") || self.upstream_host.contains('/') {
            return Err(GatewayError::config(format!(
                "{} must be a hostname, not a URL: {}",
                ENV_UPSTREAM_HOST, self.upstream_host
            )));
        }
        if let Some(effort) = self.openai_reasoning_effort.as_deref()
            && !effort.is_empty()
            && !matches!(effort, "low" | "medium" | "high")
        {
            return Err(GatewayError::config(format!(
                "{} must be low, medium, high, or empty: {}",
                ENV_OPENAI_REASONING_EFFORT, effort
            )));
        }
        if self.cookie_secret.len() < 16 && !self.cookie_secret.is_empty() {
            return Err(GatewayError::config(
                "cookie secret must be at least 16 bytes",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod config_test;
