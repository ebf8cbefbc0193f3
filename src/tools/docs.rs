//! Documentation tools

use super::*;
use crate::mcp::protocol::ToolAnnotations;
use crate::mcp::resources;
use crate::permissions::Skill;
use serde::Deserialize;

pub fn tools() -> Vec<ToolConfig> {
    vec![search_docs(), get_doc()]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchDocsInput {
    query: String,
    #[serde(default)]
    platform: Option<String>,
}

fn search_docs() -> ToolConfig {
    ToolConfig {
        name: "search_docs",
        description: "Search the Sentry documentation for SDK setup and product guides. \
                      Returns doc paths to fetch with get_doc.",
        input_schema: InputSchema::new(vec![
            Field::string("query", "What to look for, e.g. 'rate limiting' or 'source maps'."),
            Field::optional_string("platform", "Narrow results to one SDK platform."),
        ]),
        required_scopes: vec![],
        required_skills: vec![Skill::Docs],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, _ctx| async move {
            let input: SearchDocsInput = parse_input(&params)?;
            let needle = input.query.to_lowercase();

            let matches: Vec<_> = resources::list()
                .into_iter()
                .filter(|resource| {
                    let platform_ok = input
                        .platform
                        .as_deref()
                        .map(|p| resource.uri.contains(&format!("/platforms/{}/", p)))
                        .unwrap_or(true);
                    let description = resource.description.clone().unwrap_or_default();
                    platform_ok
                        && (needle.is_empty()
                            || description.to_lowercase().contains(&needle)
                            || resource.uri.to_lowercase().contains(&needle))
                })
                .collect();

            if matches.is_empty() {
                return Ok(format!(
                    "No documentation matched `{}`. Try a platform name such as \
                     `python` or `javascript`, then fetch the guide with get_doc.",
                    input.query
                )
                .into());
            }

            let mut out = format!("# Documentation matching `{}`\n\n", input.query);
            for resource in matches {
                out.push_str(&format!(
                    "- {} - {}\n",
                    resource.uri,
                    resource.description.unwrap_or_default()
                ));
            }
            out.push_str("\nFetch any of these with get_doc.\n");
            Ok(out.into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetDocInput {
    path: String,
}

fn get_doc() -> ToolConfig {
    ToolConfig {
        name: "get_doc",
        description: "Fetch a Sentry documentation page as markdown, by full URL or by \
                      path under docs.sentry.io.",
        input_schema: InputSchema::new(vec![Field::string(
            "path",
            "Doc path (e.g. /platforms/python/) or full docs.sentry.io URL.",
        )]),
        required_scopes: vec![],
        required_skills: vec![Skill::Docs],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, _ctx| async move {
            let input: GetDocInput = parse_input(&params)?;

            let url = if input.path.starts_with("https://") {
                if !input.path.starts_with(resources::DOCS_BASE_URL) {
                    return Err(GatewayError::user_input(format!(
                        "Only {} URLs can be fetched.",
                        resources::DOCS_BASE_URL
                    )));
                }
                input.path.clone()
            } else {
                format!(
                    "{}/{}",
                    resources::DOCS_BASE_URL,
                    input.path.trim_start_matches('/')
                )
            };

            let body = resources::fetch_doc_markdown(&url).await?;
            Ok(format!("# {}\n\n{}", url, body).into())
        }),
    }
}
