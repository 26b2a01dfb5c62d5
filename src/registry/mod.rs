//! Project registry and origin/storage resolution
//!
//! A transfer request arrives addressed to an *origin* project (the path the
//! client cloned). Blob storage and deduplication happen against a *storage*
//! project, which is the fork root when the origin is a fork. The two are
//! resolved together, once per request, into a [`ResolvedProjects`] pair:
//! authorization is always evaluated against the origin, storage lookups
//! always target the fork root. That split keeps private upstream objects
//! from leaking to forkers while still sharing one copy of every blob across
//! a fork network.

pub mod seed;

pub use seed::SeedFile;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fork chains are shallow in practice; bound the walk so a mis-seeded
/// registry with a cycle cannot hang request handling.
const MAX_FORK_DEPTH: usize = 32;

/// Project visibility levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Members only
    Private,
    /// Any signed-in user of the installation
    Internal,
    /// Anyone, including anonymous clients
    Public,
}

/// A project known to the gateway
#[derive(Debug, Clone)]
pub struct Project {
    pub id: i64,
    /// Namespaced path, e.g. `group/app`
    pub path: String,
    pub visibility: Visibility,
    /// Path of the project this one was forked from, if any
    pub fork_of: Option<String>,
}

impl Project {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// HTTP clone URL of this project under the given external base URL
    pub fn http_url(&self, external_url_base: &str) -> String {
        format!("{}/{}.git", external_url_base, self.path)
    }
}

/// The origin/storage pair for one request
#[derive(Debug, Clone)]
pub struct ResolvedProjects {
    /// Project the client addressed; authorization target
    pub origin: Arc<Project>,
    /// Fork root; blob lookups and commits target this project
    pub storage: Arc<Project>,
}

/// In-memory directory of projects, keyed by namespaced path
pub struct ProjectRegistry {
    by_path: DashMap<String, Arc<Project>>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self {
            by_path: DashMap::new(),
        }
    }

    pub fn insert(&self, project: Project) {
        self.by_path.insert(project.path.clone(), Arc::new(project));
    }

    pub fn get(&self, path: &str) -> Option<Arc<Project>> {
        self.by_path.get(path).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Resolve a request path into its origin/storage pair.
    ///
    /// Walks `fork_of` links up to the fork root. A dangling parent link
    /// stops the walk at the last known project.
    pub fn resolve(&self, path: &str) -> Option<ResolvedProjects> {
        let origin = self.get(path)?;

        let mut storage = Arc::clone(&origin);
        for _ in 0..MAX_FORK_DEPTH {
            let Some(parent_path) = storage.fork_of.as_deref() else {
                break;
            };
            match self.get(parent_path) {
                Some(parent) => storage = parent,
                None => break,
            }
        }

        Some(ResolvedProjects { origin, storage })
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
