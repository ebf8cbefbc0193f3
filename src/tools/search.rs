//! Natural-language search tools
//!
//! `search_events` and `search_issues` embed an agent that translates the
//! user's request into a structured query. Translation gets one retry: a
//! failed validation (SQL-looking syntax, bad sort, upstream 400) is fed
//! back to the translator verbatim before giving up.

use super::*;
use crate::agent::{self, AgentTool, ToolSpec};
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::{Scope, Skill};
use crate::upstream::query::{Dataset, SearchParams, transform_sort};
use crate::upstream::urls;
use crate::upstream::{IssueSortBy, ListIssuesParams};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

pub fn tools() -> Vec<ToolConfig> {
    vec![search_events(), search_issues()]
}

const EVENT_TRANSLATOR_SYSTEM: &str = "You translate natural-language questions about \
application telemetry into Sentry event-search queries. Sentry queries are \
`key:value` filters separated by spaces (e.g. `level:error browser.name:Chrome`), \
never SQL. Use the tag-listing tool to discover attribute names when unsure. If the \
request cannot be expressed as a query, respond with {\"error\": \"<explanation>\"}.";

const ISSUE_TRANSLATOR_SYSTEM: &str = "You translate natural-language questions about \
error groups into Sentry issue-search queries. Issue queries are `key:value` filters \
like `is:unresolved assigned:me level:error`, never SQL. If the request cannot be \
expressed as a query, respond with {\"error\": \"<explanation>\"}.";

/// Structured output of the event-query translator
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct TranslatedEventQuery {
    /// Sentry search query, e.g. `level:error browser.name:Chrome`
    query: String,
    /// Columns to return; aggregate functions like `count()` switch the
    /// search into aggregate mode
    #[serde(default)]
    fields: Option<Vec<String>>,
    /// Sort expression, e.g. `-timestamp` or `-count()`
    #[serde(default)]
    sort: Option<String>,
    /// Set instead of `query` when the request is unanswerable
    #[serde(default)]
    error: Option<String>,
}

/// Structured output of the issue-query translator
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct TranslatedIssueQuery {
    /// Sentry issue search query, e.g. `is:unresolved level:error`
    query: String,
    /// One of: user, freq, date, new
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn output_schema<T: JsonSchema>() -> Result<Value> {
    serde_json::to_value(schemars::schema_for!(T)).map_err(GatewayError::from)
}

/// Reject obviously wrong translator output before spending an upstream call.
fn validate_event_translation(translated: &TranslatedEventQuery) -> Result<()> {
    let upper = translated.query.to_uppercase();
    if upper.contains("SELECT ") && upper.contains(" FROM ") {
        return Err(GatewayError::user_input(format!(
            "Query must use Sentry search syntax, not SQL: {}",
            translated.query
        )));
    }
    if let Some(sort) = &translated.sort {
        let transformed = transform_sort(sort);
        if transformed.contains('(') || transformed.contains(')') {
            return Err(GatewayError::user_input(format!("Invalid sort: {}", sort)));
        }
    }
    Ok(())
}

fn validate_issue_translation(translated: &TranslatedIssueQuery) -> Result<()> {
    let upper = translated.query.to_uppercase();
    if upper.contains("SELECT ") && upper.contains(" FROM ") {
        return Err(GatewayError::user_input(format!(
            "Query must use Sentry issue-search syntax, not SQL: {}",
            translated.query
        )));
    }
    if let Some(sort) = &translated.sort
        && sort.parse::<IssueSortBy>().is_err()
    {
        return Err(GatewayError::user_input(format!(
            "Invalid sort: {} (expected user, freq, date, or new)",
            sort
        )));
    }
    Ok(())
}

/// A tag-discovery tool handed to the translators so they can look up real
/// attribute names.
fn tag_lookup_tool(ctx: &ServerContext, org: String, dataset: &'static str) -> AgentTool {
    let ctx = ctx.clone();
    AgentTool::new(
        ToolSpec {
            name: "list_searchable_tags".to_string(),
            description: "List the tag keys that can be used in search queries.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false,
            }),
        },
        move |_args| {
            let ctx = ctx.clone();
            let org = org.clone();
            async move {
                let client = UpstreamClient::for_context(&ctx);
                match client.list_tags(&org, dataset, None).await {
                    Ok(tags) => {
                        let keys: Vec<&str> = tags.iter().map(|t| t.key.as_str()).collect();
                        Value::String(keys.join(", "))
                    }
                    Err(e) => json!({ "error": e.to_string() }),
                }
            }
        },
    )
}

fn default_fields(dataset: Dataset) -> Vec<String> {
    let fields: &[&str] = match dataset {
        Dataset::Errors => &["issue", "title", "project", "timestamp", "trace"],
        Dataset::Spans => &[
            "span.op",
            "span.description",
            "span.duration",
            "transaction",
            "timestamp",
        ],
        Dataset::Logs => &["timestamp", "project", "message", "severity"],
    };
    fields.iter().map(|f| f.to_string()).collect()
}

fn chat_model(ctx: &ServerContext) -> Result<std::sync::Arc<dyn agent::ChatModel>> {
    ctx.services.chat_model.clone().ok_or_else(|| {
        GatewayError::config(
            "The AI-powered search tools require OPENAI_API_KEY to be configured.",
        )
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchEventsInput {
    organization_slug: String,
    natural_language_query: String,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    project_slug_or_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    stats_period: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn search_events() -> ToolConfig {
    ToolConfig {
        name: "search_events",
        description: "Search individual events (errors, spans, or logs) using a natural \
                      language description of what you're looking for.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string(
                "naturalLanguageQuery",
                "What to search for, in plain language.",
            ),
            Field::enumeration(
                "dataset",
                "Which dataset to search.",
                &["errors", "spans", "logs"],
                false,
            ),
            project_slug_or_id_field(),
            Field::integer("limit", "Maximum number of rows to return (default 10)."),
            Field::optional_string("statsPeriod", "Relative time window, e.g. 24h or 14d."),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: SearchEventsInput = parse_input(&params)?;
            let model = chat_model(&ctx)?;
            agent::check_rate_limit(&ctx).await?;

            let dataset: Dataset = input
                .dataset
                .as_deref()
                .unwrap_or("errors")
                .parse()
                .map_err(GatewayError::user_input)?;

            // Capability gating from the verified project, when known.
            if let Some(caps) = &ctx.constraints.project_capabilities {
                if dataset == Dataset::Logs && !caps.logs {
                    return Err(GatewayError::user_input(
                        "This project does not have logs enabled.",
                    ));
                }
                if dataset == Dataset::Spans && !caps.traces {
                    return Err(GatewayError::user_input(
                        "This project has not received any tracing data yet.",
                    ));
                }
            }

            let schema = output_schema::<TranslatedEventQuery>()?;
            let tools = vec![tag_lookup_tool(&ctx, input.organization_slug.clone(), "errors")];

            let client = client_for(&ctx, input.region_url.as_deref());
            let mut feedback: Option<String> = None;

            // One translation plus at most one corrective retry.
            for attempt in 0..2 {
                let prompt = match &feedback {
                    Some(message) => format!(
                        "{}\n\nPrevious attempt failed with: {}\nPlease correct the query.",
                        input.natural_language_query, message
                    ),
                    None => input.natural_language_query.clone(),
                };

                let outcome = agent::call_embedded_agent(
                    model.as_ref(),
                    EVENT_TRANSLATOR_SYSTEM,
                    &prompt,
                    &tools,
                    &schema,
                )
                .await?;

                let translated: TranslatedEventQuery =
                    serde_json::from_value(outcome.result)
                        .map_err(|e| GatewayError::internal(format!("bad agent output: {}", e)))?;

                if let Err(e) = validate_event_translation(&translated) {
                    if attempt == 0 {
                        feedback = Some(e.to_string());
                        continue;
                    }
                    return Err(e);
                }

                let search = SearchParams {
                    query: translated.query.clone(),
                    fields: translated
                        .fields
                        .clone()
                        .unwrap_or_else(|| default_fields(dataset)),
                    limit: input.limit.unwrap_or(10),
                    project_slug: input.project_slug_or_id.clone(),
                    stats_period: input
                        .stats_period
                        .clone()
                        .unwrap_or_else(|| "14d".to_string()),
                    sort: translated
                        .sort
                        .clone()
                        .unwrap_or_else(|| "-timestamp".to_string()),
                };

                match client
                    .search_events(&input.organization_slug, &search, dataset)
                    .await
                {
                    Ok(results) => {
                        return Ok(format_event_results(
                            &ctx,
                            &input.organization_slug,
                            &translated.query,
                            dataset,
                            input.project_slug_or_id.as_deref(),
                            &search.fields,
                            &results.data,
                        )
                        .into());
                    }
                    // A 400 usually means the translated query itself was
                    // rejected; give the translator one shot at fixing it.
                    Err(GatewayError::Api { status: 400, message }) if attempt == 0 => {
                        feedback = Some(message);
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(GatewayError::user_input(format!(
                "Could not translate the request into a valid search: {}",
                feedback.unwrap_or_default()
            )))
        }),
    }
}

fn format_event_results(
    ctx: &ServerContext,
    org: &str,
    query: &str,
    dataset: Dataset,
    project: Option<&str>,
    fields: &[String],
    rows: &[Value],
) -> String {
    let mut out = format!("# Search results ({} dataset)\n\n**Query**: `{}`\n\n", dataset, query);

    if rows.is_empty() {
        out.push_str("No results matched.\n");
    } else {
        for row in rows {
            let cells: Vec<String> = fields
                .iter()
                .map(|field| {
                    let value = row.get(field).cloned().unwrap_or(Value::Null);
                    match value {
                        Value::String(s) => s,
                        Value::Null => String::from("-"),
                        other => other.to_string(),
                    }
                })
                .collect();
            out.push_str(&format!("- {}\n", cells.join(" | ")));
        }
    }

    out.push_str(&format!(
        "\n[View in Sentry]({})\n",
        urls::events_explorer_url(&ctx.upstream_host, org, query, dataset, project, Some(fields))
    ));
    out
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchIssuesInput {
    organization_slug: String,
    natural_language_query: String,
    #[serde(default)]
    project_slug_or_id: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn search_issues() -> ToolConfig {
    ToolConfig {
        name: "search_issues",
        description: "Search grouped issues using a natural language description \
                      (e.g. 'unresolved payment errors from the last week').",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string(
                "naturalLanguageQuery",
                "What to search for, in plain language.",
            ),
            project_slug_or_id_field(),
            region_field(),
        ]),
        required_scopes: vec![Scope::EventRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: SearchIssuesInput = parse_input(&params)?;
            let model = chat_model(&ctx)?;
            agent::check_rate_limit(&ctx).await?;

            let schema = output_schema::<TranslatedIssueQuery>()?;
            let tools = vec![tag_lookup_tool(
                &ctx,
                input.organization_slug.clone(),
                "search_issues",
            )];
            let client = client_for(&ctx, input.region_url.as_deref());
            let mut feedback: Option<String> = None;

            for attempt in 0..2 {
                let prompt = match &feedback {
                    Some(message) => format!(
                        "{}\n\nPrevious attempt failed with: {}\nPlease correct the query.",
                        input.natural_language_query, message
                    ),
                    None => input.natural_language_query.clone(),
                };

                let outcome = agent::call_embedded_agent(
                    model.as_ref(),
                    ISSUE_TRANSLATOR_SYSTEM,
                    &prompt,
                    &tools,
                    &schema,
                )
                .await?;

                let translated: TranslatedIssueQuery = serde_json::from_value(outcome.result)
                    .map_err(|e| GatewayError::internal(format!("bad agent output: {}", e)))?;

                if let Err(e) = validate_issue_translation(&translated) {
                    if attempt == 0 {
                        feedback = Some(e.to_string());
                        continue;
                    }
                    return Err(e);
                }

                let sort_by = translated
                    .sort
                    .as_deref()
                    .and_then(|s| s.parse::<IssueSortBy>().ok());

                match client
                    .list_issues(&ListIssuesParams {
                        organization_slug: input.organization_slug.clone(),
                        project_slug: input.project_slug_or_id.clone(),
                        query: Some(translated.query.clone()),
                        sort_by,
                    })
                    .await
                {
                    Ok(issues) => {
                        let mut out = format!(
                            "# Issues matching `{}`\n\n",
                            translated.query
                        );
                        if issues.is_empty() {
                            out.push_str("No issues matched.\n");
                        }
                        for issue in &issues {
                            out.push_str(&format!(
                                "- **{}** [{}]: {}\n  {}\n",
                                issue.short_id,
                                issue.status,
                                issue.title,
                                urls::issue_url(
                                    &ctx.upstream_host,
                                    &input.organization_slug,
                                    &issue.short_id
                                ),
                            ));
                        }
                        out.push_str(&format!(
                            "\n[View in Sentry]({})\n",
                            urls::issues_search_url(
                                &ctx.upstream_host,
                                &input.organization_slug,
                                Some(&translated.query),
                                input.project_slug_or_id.as_deref(),
                            )
                        ));
                        return Ok(out.into());
                    }
                    Err(GatewayError::Api { status: 400, message }) if attempt == 0 => {
                        feedback = Some(message);
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(GatewayError::user_input(format!(
                "Could not translate the request into a valid search: {}",
                feedback.unwrap_or_default()
            )))
        }),
    }
}
