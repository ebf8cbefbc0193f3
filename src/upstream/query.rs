//! Query builders for the events search endpoint
//!
//! The upstream exposes three datasets through one endpoint: `errors`
//! (Discover), `spans` and `ourlogs` (EAP). The builders differ only in the
//! dataset routing and in EAP's sampling flag for spans.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;

/// Event storage partition targeted by a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Errors,
    Spans,
    Logs,
}

impl Dataset {
    /// The dataset name on the wire. `logs` maps to `ourlogs`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Dataset::Errors => "errors",
            Dataset::Spans => "spans",
            Dataset::Logs => "ourlogs",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Errors => f.write_str("errors"),
            Dataset::Spans => f.write_str("spans"),
            Dataset::Logs => f.write_str("logs"),
        }
    }
}

impl std::str::FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "errors" => Ok(Dataset::Errors),
            "spans" => Ok(Dataset::Spans),
            "logs" | "ourlogs" => Ok(Dataset::Logs),
            other => Err(format!("unknown dataset: {}", other)),
        }
    }
}

/// Parameters shared by both builders
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub fields: Vec<String>,
    pub limit: u32,
    pub project_slug: Option<String>,
    pub stats_period: String,
    pub sort: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            fields: Vec::new(),
            limit: 10,
            project_slug: None,
            stats_period: "14d".to_string(),
            sort: "-timestamp".to_string(),
        }
    }
}

/// Rewrite an aggregate sort expression into the API's flattened form.
///
/// A leading `-` is preserved. A well-formed `func(args)` expression becomes
/// `func` (empty args) or `func_args` with dots flattened to underscores.
/// Anything else, including malformed parens, is returned unchanged, so the
/// transformation is idempotent on strings without parentheses.
///
/// `-count()` -> `-count`, `-count(span.duration)` -> `-count_span_duration`,
/// `-count(((` -> `-count(((`.
pub fn transform_sort(sort: &str) -> String {
    let (prefix, body) = match sort.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", sort),
    };

    let Some(open) = body.find('(') else {
        return sort.to_string();
    };
    if !body.ends_with(')') {
        return sort.to_string();
    }

    let func = &body[..open];
    let args = &body[open + 1..body.len() - 1];
    if func.is_empty() || args.contains('(') || args.contains(')') {
        return sort.to_string();
    }

    if args.is_empty() {
        format!("{}{}", prefix, func)
    } else {
        format!("{}{}_{}", prefix, func, args.replace('.', "_"))
    }
}

/// Build the query string for a Discover (dataset `errors`) search.
pub fn build_discover_api_query(params: &SearchParams) -> String {
    encode_query(params, Dataset::Errors)
}

/// Build the query string for an EAP (`spans` or `ourlogs`) search.
///
/// Spans are sampled (`sampling=NORMAL`); logs never are.
pub fn build_eap_api_query(params: &SearchParams, dataset: Dataset) -> String {
    debug_assert!(matches!(dataset, Dataset::Spans | Dataset::Logs));
    encode_query(params, dataset)
}

fn encode_query(params: &SearchParams, dataset: Dataset) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("per_page", &params.limit.to_string());
    serializer.append_pair("query", &params.query);
    serializer.append_pair("dataset", dataset.wire_name());
    serializer.append_pair("statsPeriod", &params.stats_period);
    if let Some(project) = &params.project_slug {
        serializer.append_pair("project", project);
    }
    if dataset == Dataset::Spans {
        serializer.append_pair("sampling", "NORMAL");
    }
    serializer.append_pair("sort", &transform_sort(&params.sort));
    for field in &params.fields {
        serializer.append_pair("field", field);
    }
    serializer.finish()
}
