//! Capability model and the permission oracle
//!
//! Policy lives outside the protocol core. The gate asks one question of an
//! external oracle: may this actor exercise this capability on this project?
//! The bundled [`MembershipOracle`] answers it from a membership table with
//! ordered access levels, but anything implementing [`PermissionOracle`]
//! can stand in.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::Actor;
use crate::registry::Project;

/// Membership access levels, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Guest = 10,
    Reporter = 20,
    Developer = 30,
    Maintainer = 40,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::Guest => write!(f, "guest"),
            AccessLevel::Reporter => write!(f, "reporter"),
            AccessLevel::Developer => write!(f, "developer"),
            AccessLevel::Maintainer => write!(f, "maintainer"),
        }
    }
}

/// Capabilities the transfer routes check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Fetch repository data, including LFS objects
    DownloadCode,
    /// Push repository data, including LFS objects
    PushCode,
}

/// Minimum access level required for a capability
pub fn required_level(capability: Capability) -> AccessLevel {
    match capability {
        Capability::DownloadCode => AccessLevel::Reporter,
        Capability::PushCode => AccessLevel::Developer,
    }
}

/// External policy check consumed by the authorization gate
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn can(&self, actor: &Actor, capability: Capability, project: &Project) -> bool;
}

/// Membership-table oracle: a (username, project) pair maps to an access
/// level, and a capability is granted when the level meets its floor.
pub struct MembershipOracle {
    grants: DashMap<(String, i64), AccessLevel>,
}

impl MembershipOracle {
    pub fn new() -> Self {
        Self {
            grants: DashMap::new(),
        }
    }

    pub fn grant(&self, username: &str, project_id: i64, level: AccessLevel) {
        self.grants.insert((username.to_string(), project_id), level);
    }
}

impl Default for MembershipOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionOracle for MembershipOracle {
    async fn can(&self, actor: &Actor, capability: Capability, project: &Project) -> bool {
        match self.grants.get(&(actor.username.clone(), project.id)) {
            Some(level) => *level.value() >= required_level(capability),
            None => false,
        }
    }
}
