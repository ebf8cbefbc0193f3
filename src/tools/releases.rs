//! Release and tag tools

use super::*;
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::{Scope, Skill};
use serde::Deserialize;

pub fn tools() -> Vec<ToolConfig> {
    vec![find_releases(), find_tags()]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindReleasesInput {
    organization_slug: String,
    #[serde(default)]
    project_slug: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn find_releases() -> ToolConfig {
    ToolConfig {
        name: "find_releases",
        description: "List releases in an organization, optionally narrowed to a project or \
                      filtered by a search query (e.g. a version prefix).",
        input_schema: InputSchema::new(vec![
            org_field(),
            optional_project_field(),
            Field::optional_string("query", "Search filter, e.g. a version prefix."),
            region_field(),
        ]),
        required_scopes: vec![Scope::ProjectReleases],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FindReleasesInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let releases = client
                .list_releases(
                    &input.organization_slug,
                    input.project_slug.as_deref(),
                    input.query.as_deref(),
                )
                .await?;

            if releases.is_empty() {
                return Ok("No releases found.".to_string().into());
            }

            let mut out = format!("# Releases in **{}**\n\n", input.organization_slug);
            for release in &releases {
                let version = release.short_version.as_deref().unwrap_or(&release.version);
                out.push_str(&format!("## {}\n", version));
                if let Some(created) = &release.date_created {
                    out.push_str(&format!("**Created**: {}\n", created));
                }
                if let Some(new_groups) = release.new_groups {
                    out.push_str(&format!("**New issues**: {}\n", new_groups));
                }
                if !release.projects.is_empty() {
                    let slugs: Vec<&str> =
                        release.projects.iter().map(|p| p.slug.as_str()).collect();
                    out.push_str(&format!("**Projects**: {}\n", slugs.join(", ")));
                }
                out.push('\n');
            }
            Ok(out.into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindTagsInput {
    organization_slug: String,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    project_slug_or_id: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn find_tags() -> ToolConfig {
    ToolConfig {
        name: "find_tags",
        description: "List the tag keys available for search queries in an organization.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::enumeration(
                "dataset",
                "Which dataset's tags to list.",
                &["errors", "search_issues"],
                false,
            ),
            project_slug_or_id_field(),
            region_field(),
        ]),
        required_scopes: vec![Scope::OrgRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FindTagsInput = parse_input(&params)?;
            let dataset = input.dataset.as_deref().unwrap_or("errors");
            let client = client_for(&ctx, input.region_url.as_deref());
            let tags = client
                .list_tags(
                    &input.organization_slug,
                    dataset,
                    input.project_slug_or_id.as_deref(),
                )
                .await?;

            if tags.is_empty() {
                return Ok("No tags found.".to_string().into());
            }

            let mut out = format!(
                "# Tags in **{}** ({})\n\n",
                input.organization_slug, dataset
            );
            for tag in &tags {
                match &tag.name {
                    Some(name) if name != &tag.key => {
                        out.push_str(&format!("- `{}` ({})\n", tag.key, name));
                    }
                    _ => out.push_str(&format!("- `{}`\n", tag.key)),
                }
            }
            Ok(out.into())
        }),
    }
}
