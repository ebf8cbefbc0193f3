//! Team tools

use super::*;
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::{Scope, Skill};
use serde::Deserialize;

pub fn tools() -> Vec<ToolConfig> {
    vec![find_teams(), create_team()]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindTeamsInput {
    organization_slug: String,
    #[serde(default)]
    region_url: Option<String>,
}

fn find_teams() -> ToolConfig {
    ToolConfig {
        name: "find_teams",
        description: "List the teams in a Sentry organization.",
        input_schema: InputSchema::new(vec![org_field(), region_field()]),
        required_scopes: vec![Scope::TeamRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: FindTeamsInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let teams = client.list_teams(&input.organization_slug).await?;

            if teams.is_empty() {
                return Ok(format!(
                    "No teams found in **{}**.",
                    input.organization_slug
                )
                .into());
            }

            let mut out = format!("# Teams in **{}**\n\n", input.organization_slug);
            for team in &teams {
                out.push_str(&format!("- **{}** ({})\n", team.slug, team.name));
            }
            Ok(out.into())
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTeamInput {
    organization_slug: String,
    name: String,
    #[serde(default)]
    region_url: Option<String>,
}

fn create_team() -> ToolConfig {
    ToolConfig {
        name: "create_team",
        description: "Create a new team in a Sentry organization.",
        input_schema: InputSchema::new(vec![
            org_field(),
            Field::string("name", "The name for the new team."),
            region_field(),
        ]),
        required_scopes: vec![Scope::TeamWrite],
        required_skills: vec![Skill::ProjectManagement],
        annotations: ToolAnnotations {
            read_only_hint: false,
            open_world_hint: true,
        },
        handler: handler(|params, ctx| async move {
            let input: CreateTeamInput = parse_input(&params)?;
            let client = client_for(&ctx, input.region_url.as_deref());
            let team = client
                .create_team(&input.organization_slug, &input.name)
                .await?;

            Ok(format!(
                "# Team created\n\n**Slug**: {}\n**Name**: {}\n\n\
                 Use the slug when creating projects for this team.",
                team.slug, team.name
            )
            .into())
        }),
    }
}
