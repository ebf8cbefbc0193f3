//! Organization tools

use super::*;
use crate::mcp::protocol::ToolAnnotations;
use crate::permissions::{Scope, Skill};
use crate::upstream::urls;

pub fn tools() -> Vec<ToolConfig> {
    vec![find_organizations()]
}

fn find_organizations() -> ToolConfig {
    ToolConfig {
        name: "find_organizations",
        description: "List every Sentry organization the authenticated user belongs to. \
                      Returns each organization's slug and region URL, which other tools need.",
        input_schema: InputSchema::empty(),
        required_scopes: vec![Scope::OrgRead],
        required_skills: vec![Skill::Inspect],
        annotations: ToolAnnotations {
            read_only_hint: true,
            open_world_hint: true,
        },
        handler: handler(|_params, ctx| async move {
            let client = UpstreamClient::for_context(&ctx);
            let organizations = client.list_organizations().await?;

            if organizations.is_empty() {
                return Ok("No organizations found for this account.".to_string().into());
            }

            let mut out = String::from("# Organizations\n\n");
            for org in &organizations {
                out.push_str(&format!("## **{}**\n\n", org.slug));
                out.push_str(&format!("**Name**: {}\n", org.name));
                if let Some(region) = org.region_url() {
                    out.push_str(&format!("**Region URL**: {}\n", region));
                }
                out.push_str(&format!(
                    "**Web URL**: {}\n\n",
                    urls::organization_url(&ctx.upstream_host, &org.slug)
                ));
            }
            out.push_str(
                "# Using this information\n\n\
                 Pass `organizationSlug` (and `regionUrl` where accepted) to the other tools.\n",
            );
            Ok(out.into())
        }),
    }
}
