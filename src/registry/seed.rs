//! Seed file loading
//!
//! The gateway is a protocol core, not a user/project management system.
//! Accounts, projects, and memberships are provisioned by the surrounding
//! installation; for a standalone deployment they are loaded from a JSON
//! seed file at startup:
//!
//! ```json
//! {
//!   "users": [{ "username": "alice", "token": "s3cr3t" }],
//!   "projects": [
//!     { "id": 1, "path": "group/app", "visibility": "public" },
//!     { "id": 2, "path": "fork/app", "visibility": "private", "fork_of": "group/app" }
//!   ],
//!   "memberships": [{ "username": "alice", "project_id": 1, "level": "developer" }]
//! }
//! ```

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::auth::{AccessLevel, IdentityDirectory, MembershipOracle};
use crate::registry::{Project, ProjectRegistry, Visibility};
use crate::types::Result;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub projects: Vec<SeedProject>,
    #[serde(default)]
    pub memberships: Vec<SeedMembership>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedProject {
    pub id: i64,
    pub path: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub fork_of: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedMembership {
    pub username: String,
    pub project_id: i64,
    pub level: AccessLevel,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Populate the registry, identity directory, and membership oracle.
    pub fn apply(
        &self,
        registry: &ProjectRegistry,
        identities: &IdentityDirectory,
        oracle: &MembershipOracle,
    ) {
        for user in &self.users {
            identities.insert(&user.username, &user.token);
        }

        for project in &self.projects {
            registry.insert(Project {
                id: project.id,
                path: project.path.clone(),
                visibility: project.visibility,
                fork_of: project.fork_of.clone(),
            });
        }

        for membership in &self.memberships {
            oracle.grant(&membership.username, membership.project_id, membership.level);
        }

        info!(
            users = self.users.len(),
            projects = self.projects.len(),
            memberships = self.memberships.len(),
            "Seed file applied"
        );
    }
}
