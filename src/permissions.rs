//! Scopes, skills, and the permission grants that produce them
//!
//! A Scope is a fine-grained permission in the upstream's vocabulary. A
//! Skill is a user-facing authorization bundle picked on the approval page;
//! each tool declares the skills that enable it. Granted skills imply a
//! computed scope set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Fine-grained upstream permission. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "org:read")]
    OrgRead,
    #[serde(rename = "org:write")]
    OrgWrite,
    #[serde(rename = "project:read")]
    ProjectRead,
    #[serde(rename = "project:write")]
    ProjectWrite,
    #[serde(rename = "project:releases")]
    ProjectReleases,
    #[serde(rename = "team:read")]
    TeamRead,
    #[serde(rename = "team:write")]
    TeamWrite,
    #[serde(rename = "member:read")]
    MemberRead,
    #[serde(rename = "event:read")]
    EventRead,
    #[serde(rename = "event:write")]
    EventWrite,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::OrgRead => "org:read",
            Scope::OrgWrite => "org:write",
            Scope::ProjectRead => "project:read",
            Scope::ProjectWrite => "project:write",
            Scope::ProjectReleases => "project:releases",
            Scope::TeamRead => "team:read",
            Scope::TeamWrite => "team:write",
            Scope::MemberRead => "member:read",
            Scope::EventRead => "event:read",
            Scope::EventWrite => "event:write",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "org:read" => Ok(Scope::OrgRead),
            "org:write" => Ok(Scope::OrgWrite),
            "project:read" => Ok(Scope::ProjectRead),
            "project:write" => Ok(Scope::ProjectWrite),
            "project:releases" => Ok(Scope::ProjectReleases),
            "team:read" => Ok(Scope::TeamRead),
            "team:write" => Ok(Scope::TeamWrite),
            "member:read" => Ok(Scope::MemberRead),
            "event:read" => Ok(Scope::EventRead),
            "event:write" => Ok(Scope::EventWrite),
            other => Err(format!("unknown scope: {}", other)),
        }
    }
}

/// User-facing authorization bundle. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Skill {
    #[serde(rename = "inspect")]
    Inspect,
    #[serde(rename = "triage")]
    Triage,
    #[serde(rename = "project-management")]
    ProjectManagement,
    #[serde(rename = "seer")]
    Seer,
    #[serde(rename = "docs")]
    Docs,
}

impl Skill {
    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::Inspect => "inspect",
            Skill::Triage => "triage",
            Skill::ProjectManagement => "project-management",
            Skill::Seer => "seer",
            Skill::Docs => "docs",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skill {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "inspect" => Ok(Skill::Inspect),
            "triage" => Ok(Skill::Triage),
            "project-management" => Ok(Skill::ProjectManagement),
            "seer" => Ok(Skill::Seer),
            "docs" => Ok(Skill::Docs),
            other => Err(format!("unknown skill: {}", other)),
        }
    }
}

/// Approval-page permission that unlocks issue writes
pub const PERMISSION_ISSUE_TRIAGE: &str = "issue_triage";

/// Approval-page permission that unlocks project/team writes
pub const PERMISSION_PROJECT_MANAGEMENT: &str = "project_management";

/// Scopes every authenticated session holds
pub fn base_scopes() -> BTreeSet<Scope> {
    BTreeSet::from([
        Scope::OrgRead,
        Scope::ProjectRead,
        Scope::TeamRead,
        Scope::MemberRead,
        Scope::EventRead,
        Scope::ProjectReleases,
    ])
}

/// Skills every authenticated session holds
pub fn base_skills() -> BTreeSet<Skill> {
    BTreeSet::from([Skill::Inspect, Skill::Seer, Skill::Docs])
}

/// Expand approval-page permissions into the granted scope set.
///
/// Unknown permission strings are ignored; the result is never narrower
/// than the base set.
pub fn scopes_from_permissions(permissions: Option<&[String]>) -> BTreeSet<Scope> {
    let mut scopes = base_scopes();
    let Some(permissions) = permissions else {
        return scopes;
    };
    for permission in permissions {
        match permission.as_str() {
            PERMISSION_ISSUE_TRIAGE => {
                scopes.insert(Scope::EventWrite);
            }
            PERMISSION_PROJECT_MANAGEMENT => {
                scopes.insert(Scope::ProjectWrite);
                scopes.insert(Scope::TeamWrite);
            }
            other => {
                tracing::debug!("ignoring unknown permission: {}", other);
            }
        }
    }
    scopes
}

/// Expand approval-page permissions into the granted skill set.
pub fn skills_from_permissions(permissions: Option<&[String]>) -> BTreeSet<Skill> {
    let mut skills = base_skills();
    let Some(permissions) = permissions else {
        return skills;
    };
    for permission in permissions {
        match permission.as_str() {
            PERMISSION_ISSUE_TRIAGE => {
                skills.insert(Skill::Triage);
            }
            PERMISSION_PROJECT_MANAGEMENT => {
                skills.insert(Skill::ProjectManagement);
            }
            _ => {}
        }
    }
    skills
}
