//! Issue tools

use super::*;
use crate::mcp::protocol::{ContentBlock, ToolAnnotations};
use crate::model::{Event, Issue};
use crate::permissions::{Scope, Skill};
use crate::upstream::urls;
use crate::upstream::{IssueSortBy, IssueUpdate, ListIssuesParams};
use base64::Engine;
use itertools::Itertools;
use serde::Deserialize;

pub fn tools() -> Vec<ToolConfig> {
    vec![
        find_issues(),
        get_issue_details(),
        update_issue(),
        get_event_attachment(),
    ]
}

fn format_issue_line(host: &str, org: &str, issue: &Issue) -> String {
    let mut line = format!(
        "- **{}** [{}]: {}",
        issue.short_id,
        issue.status,
        issue.title
    );
    if let Some(count) = &issue.count {
        line.push_str(&format!(" ({} events)", count));
    }
    line.push_str(&format!(
        "\n  {}",
        urls::issue_url(host, org, &issue.short_id)
    ));
    line.push('\n');
    line
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindIssuesInput {
    organization_slug: String,
    #[serde(default)]
    project_slug: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn find_issues() -> ToolConfig {
    ToolConfig {
        name: "find_issues",
        description: "List issues in an organization using Sentry issue-search syntax \
                      (e.g. `is:unresolved level:error`).",
        input_schema: InputSchema::new(vec![
            org_field(),
            optional_project_field(),
            Field::optional_string("query", "Issue search query, e.g. `is:unresolved`."),
            Field::enumeration(
                "sortBy",
                "Result ordering.",
                &["user", "freq", "date", "new"],
                false,
            ),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FindIssuesInput = parse_input(&params)?;
            let sort_by = input
                .sort_by
                .as_deref()
                .map(|s| {
                    s.parse::<IssueSortBy>()
                        .map_err(|e| GatewayError::user_input(e))
                })
                .transpose()?;

            let client = client_for(&ctx, input.region_url.as_deref());
            let issues = client
                .list_issues(&ListIssuesParams {
                    organization_slug: input.organization_slug.clone(),
                    project_slug: input.project_slug.clone(),
                    query: input.query.clone(),
                    sort_by,
                })
                .await?;

            if issues.is_empty() {
                return Ok("No issues matched.".to_string().into());
            }

            let mut out = format!("# Issues in **{}**\n\n", input.organization_slug);
            for issue in &issues {
                out.push_str(&format_issue_line(
                    &ctx.upstream_host,
                    &input.organization_slug,
                    issue,
                ));
            }
            out.push_str(&format!(
                "\n[View in Sentry]({})\n",
                urls::issues_search_url(
                    &ctx.upstream_host,
                    &input.organization_slug,
                    input.query.as_deref(),
                    input.project_slug.as_deref(),
                )
            ));
            Ok(out.into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetIssueDetailsInput {
    organization_slug: String,
    issue_id: String,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn get_issue_details() -> ToolConfig {
    ToolConfig {
        name: "get_issue_details",
        description: "Fetch one issue with its latest event (or a specific event by id), \
                      including the stack trace and tags.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string("issueId", "The issue id or short id (e.g. PROJ-123)."),
            Field::optional_string("eventId", "A specific event id within the issue."),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: GetIssueDetailsInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());

            let issue = client
                .get_issue(&input.organization_slug, &input.issue_id)
                .await?;
            let event = match &input.event_id {
                Some(event_id) => {
                    client
                        .get_event_for_issue(&input.organization_slug, &input.issue_id, event_id)
                        .await?
                }
                None => {
                    client
                        .get_latest_event_for_issue(&input.organization_slug, &input.issue_id)
                        .await?
                }
            };

            let mut out = format!("# {}: {}\n\n", issue.short_id, issue.title);
            out.push_str(&format!("**Status**: {}\n", issue.status));
            if let Some(level) = &issue.level {
                out.push_str(&format!("**Level**: {}\n", level));
            }
            if let Some(culprit) = &issue.culprit {
                out.push_str(&format!("**Culprit**: {}\n", culprit));
            }
            if let (Some(first), Some(last)) = (&issue.first_seen, &issue.last_seen) {
                out.push_str(&format!("**Seen**: {} - {}\n", first, last));
            }
            out.push_str(&format!(
                "**URL**: {}\n\n",
                urls::issue_url(&ctx.upstream_host, &input.organization_slug, &issue.short_id)
            ));

            out.push_str(&format_event(&event));
            Ok(out.into())
        }),
    }
}

/// Render the interesting parts of an event: message, exception entries
/// with stack frames, and tags.
fn format_event(event: &Event) -> String {
    let mut out = format!("## Event `{}`\n\n", event.id);
    if let Some(message) = &event.message
        && !message.is_empty()
    {
        out.push_str(&format!("**Message**: {}\n\n", message));
    }

    for entry in &event.entries {
        let Some(entry_type) = entry.get("type").and_then(|t| t.as_str()) else {
            continue;
        };
        if entry_type != "exception" {
            continue;
        }
        let values = entry
            .pointer("/data/values")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for value in values {
            let exc_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("Error");
            let exc_value = value.get("value").and_then(|t| t.as_str()).unwrap_or("");
            out.push_str(&format!("### {}: {}\n\n", exc_type, exc_value));

            let frames = value
                .pointer("/stacktrace/frames")
                .and_then(|f| f.as_array())
                .cloned()
                .unwrap_or_default();
            if !frames.is_empty() {
                out.push_str("```\n");
                // The upstream lists frames innermost-last; show the tail.
                for frame in frames.iter().rev().take(16) {
                    let filename = frame
                        .get("filename")
                        .and_then(|f| f.as_str())
                        .unwrap_or("<unknown>");
                    let function = frame
                        .get("function")
                        .and_then(|f| f.as_str())
                        .unwrap_or("<unknown>");
                    let lineno = frame.get("lineNo").and_then(|l| l.as_u64());
                    match lineno {
                        Some(line) => {
                            out.push_str(&format!("{} in {} at line {}\n", filename, function, line))
                        }
                        None => out.push_str(&format!("{} in {}\n", filename, function)),
                    }
                }
                out.push_str("```\n\n");
            }
        }
    }

    if !event.tags.is_empty() {
        out.push_str("**Tags**: ");
        let tags = event
            .tags
            .iter()
            .map(|t| format!("{}={}", t.key, t.value))
            .join(", ");
        out.push_str(&tags);
        out.push('\n');
    }
    out
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateIssueInput {
    organization_slug: String,
    issue_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn update_issue() -> ToolConfig {
    ToolConfig {
        name: "update_issue",
        description: "Update an issue's status (resolve, ignore, unresolve) or assign it.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string("issueId", "The issue id or short id."),
            Field::enumeration(
                "status",
                "New status for the issue.",
                &["resolved", "resolvedInNextRelease", "unresolved", "ignored"],
                false,
            ),
            Field::optional_string(
                "assignedTo",
                "Username or team (prefixed with #) to assign the issue to.",
            ),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventWrite],
        required_skills: vec![Skill::Triage],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: UpdateIssueInput = parse_input(&params)?;
            if input.status.is_none() && input.assigned_to.is_none() {
                return Err(GatewayError::user_input(
                    "Nothing to update: provide status or assignedTo.",
                ));
            }

            let client = client_for(&ctx, input.region_url.as_deref());
            let issue = client
                .update_issue(
                    &input.organization_slug,
                    &input.issue_id,
                    &IssueUpdate {
                        status: input.status.clone(),
                        assigned_to: input.assigned_to.clone(),
                    },
                )
                .await?;

            Ok(format!(
                "# Issue updated\n\n**{}**: {}\n**Status**: {}\n\n{}\n",
                issue.short_id,
                issue.title,
                issue.status,
                urls::issue_url(&ctx.upstream_host, &input.organization_slug, &issue.short_id)
            )
            .into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEventAttachmentInput {
    organization_slug: String,
    project_slug: String,
    event_id: String,
    #[serde(default)]
    attachment_id: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn get_event_attachment() -> ToolConfig {
    ToolConfig {
        name: "get_event_attachment",
        description: "List an event's attachments, or download one by id. Binary payloads \
                      are returned base64-encoded as an embedded resource.",
        input_schema: InputSchema::new(vec![
            org_field(),
            project_field(),
            Field::string("eventId", "The event id the attachments belong to."),
            Field::optional_string("attachmentId", "Download this specific attachment."),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: GetEventAttachmentInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());

            let Some(attachment_id) = &input.attachment_id else {
                let attachments = client
                    .list_event_attachments(
                        &input.organization_slug,
                        &input.project_slug,
                        &input.event_id,
                    )
                    .await?;
                if attachments.is_empty() {
                    return Ok("No attachments on this event.".to_string().into());
                }
                let mut out = format!("# Attachments for event `{}`\n\n", input.event_id);
                for attachment in &attachments {
                    out.push_str(&format!(
                        "- id {}: **{}** ({}, {} bytes)\n",
                        attachment.id,
                        attachment.name,
                        attachment.mimetype.as_deref().unwrap_or("unknown"),
                        attachment.size.unwrap_or(0),
                    ));
                }
                return Ok(out.into());
            };

            let download = client
                .get_event_attachment(
                    &input.organization_slug,
                    &input.project_slug,
                    &input.event_id,
                    attachment_id,
                )
                .await?;

            let mime_type = download
                .metadata
                .mimetype
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let summary = format!(
                "Downloaded **{}** ({}, {} bytes).",
                download.filename,
                mime_type,
                download.bytes.len()
            );

            let content = if mime_type.starts_with("image/") {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(download.bytes.as_ref());
                vec![
                    ContentBlock::text(summary),
                    ContentBlock::Image {
                        data: encoded,
                        mime_type,
                    },
                ]
            } else {
                // Text attachments pass through; anything else is base64.
                let text = if mime_type.starts_with("text/") {
                    String::from_utf8_lossy(&download.bytes).into_owned()
                } else {
                    base64::engine::general_purpose::STANDARD.encode(download.bytes.as_ref())
                };
                vec![
                    ContentBlock::text(summary),
                    ContentBlock::Resource {
                        resource: crate::mcp::protocol::EmbeddedResource {
                            uri: format!("attachment://{}", download.filename),
                            mime_type: Some(mime_type),
                            text: Some(text),
                        },
                    },
                ]
            };
            Ok(content.into())
        }),
    }
}
