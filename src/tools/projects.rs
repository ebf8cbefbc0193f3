//! Project tools

use super::*;
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::{Scope, Skill};
use crate::upstream::ProjectUpdate;
use serde::Deserialize;

pub fn tools() -> Vec<ToolConfig> {
    vec![
        find_projects(),
        create_project(),
        update_project(),
        create_dsn(),
        find_dsns(),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindProjectsInput {
    organization_slug: String,
    #[serde(default)]
    region_url: Option<String>,
}

fn find_projects() -> ToolConfig {
    ToolConfig {
        name: "find_projects",
        description: "List the projects in a Sentry organization.",
        input_schema: InputSchema::new(vec![org_field(), region_field()]),
        required_scopes: vec![Scope::ProjectRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FindProjectsInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let projects = client.list_projects(&input.organization_slug).await?;

            if projects.is_empty() {
                return Ok(format!(
                    "No projects found in **{}**.",
                    input.organization_slug
                )
                .into());
            }

            let mut out = format!("# Projects in **{}**\n\n", input.organization_slug);
            for project in &projects {
                let platform = project.platform.as_deref().unwrap_or("unknown");
                out.push_str(&format!(
                    "- **{}** ({}, platform: {})\n",
                    project.slug, project.name, platform
                ));
            }
            Ok(out.into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectInput {
    organization_slug: String,
    team_slug: String,
    name: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn create_project() -> ToolConfig {
    ToolConfig {
        name: "create_project",
        description: "Create a new project in a Sentry organization. Also returns a new DSN \
                      for sending events to it.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string("teamSlug", "The team that will own the project."),
            Field::string("name", "The name for the new project."),
            Field::optional_string("platform", "The project's platform (e.g. javascript, python)."),
            region_field(),
        ]),
        required_scopes: vec![Scope::ProjectWrite],
        required_skills: vec![Skill::ProjectManagement],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: CreateProjectInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let project = client
                .create_project(
                    &input.organization_slug,
                    &input.team_slug,
                    &input.name,
                    input.platform.as_deref(),
                )
                .await?;

            let mut out = format!(
                "# Project created\n\n**Slug**: {}\n**Name**: {}\n",
                project.slug, project.name
            );

            // A fresh project is only useful with a DSN; create one eagerly
            // but treat failure as advisory.
            match client
                .create_client_key(&input.organization_slug, &project.slug, Some("Default"))
                .await
            {
                Ok(key) => {
                    out.push_str(&format!("**DSN**: {}\n", key.dsn.public));
                }
                Err(e) => {
                    tracing::warn!("failed to create client key for new project: {}", e);
                    out.push_str("\nNo DSN could be created; use create_dsn to add one.\n");
                }
            }
            Ok(out.into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProjectInput {
    organization_slug: String,
    project_slug: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    team_slug: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn update_project() -> ToolConfig {
    ToolConfig {
        name: "update_project",
        description: "Update a project's settings (name, slug, platform) or assign it to a team.",
        input_schema: InputSchema::new(vec![
            org_field(),
            project_field(),
            Field::optional_string("name", "New display name."),
            Field::optional_string("slug", "New slug."),
            Field::optional_string("platform", "New platform."),
            Field::optional_string("teamSlug", "A team to add this project to."),
            region_field(),
        ]),
        required_scopes: vec![Scope::ProjectWrite],
        required_skills: vec![Skill::ProjectManagement],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: UpdateProjectInput = parse_input(&params)?;
            if input.name.is_none()
                && input.slug.is_none()
                && input.platform.is_none()
                && input.team_slug.is_none()
            {
                return Err(GatewayError::user_input(
                    "Nothing to update: provide name, slug, platform, or teamSlug.",
                ));
            }

            let client = client_for(&ctx, input.region_url.as_deref());
            let mut project_slug = input.project_slug.clone();

            if input.name.is_some() || input.slug.is_some() || input.platform.is_some() {
                let update = ProjectUpdate {
                    name: input.name.clone(),
                    slug: input.slug.clone(),
                    platform: input.platform.clone(),
                };
                let updated = client
                    .update_project(&input.organization_slug, &project_slug, &update)
                    .await?;
                project_slug = updated.slug;
            }

            if let Some(team_slug) = &input.team_slug {
                client
                    .add_team_to_project(&input.organization_slug, &project_slug, team_slug)
                    .await?;
            }

            Ok(format!(
                "# Project updated\n\n**Slug**: {}\n{}",
                project_slug,
                input
                    .team_slug
                    .map(|t| format!("**Added to team**: {}\n", t))
                    .unwrap_or_default()
            )
            .into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDsnInput {
    organization_slug: String,
    project_slug: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    region_url: Option<String>,
}

fn create_dsn() -> ToolConfig {
    ToolConfig {
        name: "create_dsn",
        description: "Create a new DSN (client key) for a project.",
        input_schema: InputSchema::new(vec![
            org_field(),
            project_field(),
            Field::optional_string("name", "A label for the new key."),
            region_field(),
        ]),
        required_scopes: vec![Scope::ProjectWrite],
        required_skills: vec![Skill::ProjectManagement],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: CreateDsnInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let key = client
                .create_client_key(
                    &input.organization_slug,
                    &input.project_slug,
                    input.name.as_deref(),
                )
                .await?;

            Ok(format!(
                "# DSN created\n\n**Name**: {}\n**DSN**: {}\n",
                key.name.as_deref().unwrap_or("Default"),
                key.dsn.public
            )
            .into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindDsnsInput {
    organization_slug: String,
    project_slug: String,
    #[serde(default)]
    region_url: Option<String>,
}

fn find_dsns() -> ToolConfig {
    ToolConfig {
        name: "find_dsns",
        description: "List the DSNs (client keys) configured for a project.",
        input_schema: InputSchema::new(vec![org_field(), project_field(), region_field()]),
        required_scopes: vec![Scope::ProjectRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FindDsnsInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let keys = client
                .list_client_keys(&input.organization_slug, &input.project_slug)
                .await?;

            if keys.is_empty() {
                return Ok(format!(
                    "No DSNs found for **{}/{}**. Use create_dsn to add one.",
                    input.organization_slug, input.project_slug
                )
                .into());
            }

            let mut out = format!(
                "# DSNs for **{}/{}**\n\n",
                input.organization_slug, input.project_slug
            );
            for key in &keys {
                out.push_str(&format!(
                    "- **{}**: `{}`\n",
                    key.name.as_deref().unwrap_or("Default"),
                    key.dsn.public
                ));
            }
            Ok(out.into())
        }),
    }
}
