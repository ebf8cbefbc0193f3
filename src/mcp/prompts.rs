//! Prompt registry
//!
//! A small set of canned workflows exposed over `prompts/list` /
//! `prompts/get`, with argument substitution.

use super::protocol::{ContentBlock, GetPromptResult, PromptArgument, PromptDescriptor, PromptMessage};
use crate::{GatewayError, Result};
use serde_json::Value;

pub fn list() -> Vec<PromptDescriptor> {
    vec![
        PromptDescriptor {
            name: "find_errors_in_file".to_string(),
            description: "Find recent Sentry errors that originate in a specific source file."
                .to_string(),
            arguments: vec![
                PromptArgument {
                    name: "organizationSlug".to_string(),
                    description: "The organization to search in.".to_string(),
                    required: true,
                },
                PromptArgument {
                    name: "filename".to_string(),
                    description: "The source file to look for.".to_string(),
                    required: true,
                },
            ],
        },
        PromptDescriptor {
            name: "fix_issue_with_seer".to_string(),
            description: "Run Seer on an issue and walk through its proposed fix.".to_string(),
            arguments: vec![
                PromptArgument {
                    name: "organizationSlug".to_string(),
                    description: "The organization the issue lives in.".to_string(),
                    required: true,
                },
                PromptArgument {
                    name: "issueId".to_string(),
                    description: "The issue id or short id to fix.".to_string(),
                    required: true,
                },
            ],
        },
    ]
}

fn argument<'a>(arguments: &'a Value, name: &str) -> Result<&'a str> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::user_input(format!("Missing prompt argument: {}", name)))
}

pub fn get(name: &str, arguments: &Value) -> Result<GetPromptResult> {
    let text = match name {
        "find_errors_in_file" => {
            let org = argument(arguments, "organizationSlug")?;
            let filename = argument(arguments, "filename")?;
            format!(
                "Use the find_issues tool with organizationSlug `{org}` and the query \
                 `stack.filename:\"{filename}\" is:unresolved` to locate errors in \
                 `{filename}`. Summarize what is failing and how often, then fetch the \
                 most frequent issue with get_issue_details and explain the stack trace."
            )
        }
        "fix_issue_with_seer" => {
            let org = argument(arguments, "organizationSlug")?;
            let issue = argument(arguments, "issueId")?;
            format!(
                "Start a Seer analysis for issue `{issue}` in organization `{org}` using \
                 begin_seer_issue_fix, then poll get_seer_issue_fix_status until it \
                 completes. Present the root cause and the proposed fix, and note any \
                 steps the user must take to apply it."
            )
        }
        other => {
            return Err(GatewayError::user_input(format!(
                "Unknown prompt: {}",
                other
            )));
        }
    };

    Ok(GetPromptResult {
        description: None,
        messages: vec![PromptMessage {
            role: "user",
            content: ContentBlock::text(text),
        }],
    })
}
