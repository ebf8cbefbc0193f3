//! Resource registry
//!
//! Platform documentation exposed over `resources/list` / `resources/read`.
//! Resources are addressed by a template URI; the dispatcher substitutes
//! the concrete platform before a read.

use super::protocol::{EmbeddedResource, ResourceDescriptor};
use crate::{GatewayError, Result};

/// Documentation origin
pub const DOCS_BASE_URL: &str = "https://docs.sentry.io";

/// Template URI advertised for platform docs
pub const PLATFORM_DOC_TEMPLATE: &str = "https://docs.sentry.io/platforms/{platform}/";

/// Platforms with first-class SDK documentation
pub const PLATFORMS: &[&str] = &[
    "javascript",
    "node",
    "python",
    "ruby",
    "java",
    "go",
    "rust",
    "php",
    "dotnet",
    "android",
    "apple",
    "react-native",
    "unity",
    "flutter",
    "elixir",
];

pub fn list() -> Vec<ResourceDescriptor> {
    PLATFORMS
        .iter()
        .map(|platform| ResourceDescriptor {
            uri: PLATFORM_DOC_TEMPLATE.replace("{platform}", platform),
            name: format!("sentry-docs-platform-{}", platform),
            description: Some(format!(
                "Sentry SDK setup and configuration guide for {}",
                platform
            )),
            mime_type: Some("text/markdown".to_string()),
        })
        .collect()
}

/// Resolve a requested URI against the registry. Template URIs are accepted
/// with any known platform substituted.
pub fn resolve(uri: &str) -> Result<&'static str> {
    for platform in PLATFORMS {
        let concrete = PLATFORM_DOC_TEMPLATE.replace("{platform}", platform);
        if uri == concrete {
            return Ok(platform);
        }
    }
    Err(GatewayError::user_input(format!(
        "Unknown resource URI: {}",
        uri
    )))
}

/// Fetch a platform guide as markdown.
pub async fn read(uri: &str) -> Result<EmbeddedResource> {
    let platform = resolve(uri)?;
    let url = format!("{}/platforms/{}/", DOCS_BASE_URL, platform);
    let body = fetch_doc_markdown(&url).await?;
    Ok(EmbeddedResource {
        uri: uri.to_string(),
        mime_type: Some("text/markdown".to_string()),
        text: Some(body),
    })
}

/// Fetch a documentation page, preferring the markdown rendition the docs
/// site serves next to each page.
pub async fn fetch_doc_markdown(url: &str) -> Result<String> {
    let markdown_url = format!("{}.md", url.trim_end_matches('/'));
    let client = reqwest::Client::new();

    for candidate in [markdown_url, url.to_string()] {
        let response = client.get(&candidate).send().await.map_err(|e| {
            GatewayError::Network(crate::error::NetworkError::classify(&candidate, e))
        })?;
        if response.status().is_success() {
            return response.text().await.map_err(|e| {
                GatewayError::Network(crate::error::NetworkError::classify(&candidate, e))
            });
        }
    }
    Err(GatewayError::api(404, format!("Documentation not found at {}", url)))
}
