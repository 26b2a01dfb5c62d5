//! The authorization gate
//!
//! One pure decision per request, taken before any operation-specific work.
//! The feature switch is checked first and short-circuits everything else,
//! including public visibility. Downloads from public projects are open to
//! anyone; every other combination requires an actor and a capability check
//! against the origin project. Pushes are never implied by visibility.

use crate::auth::{Actor, Capability, PermissionOracle};
use crate::registry::Project;

/// What the client is trying to do, as far as the gate cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Fetch an object (hypermedia or direct transfer)
    Download,
    /// Store an object (batch authorization or upload commit)
    Upload,
}

/// Gate verdict for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    /// No actor present and the operation requires one
    Unauthenticated,
    /// Actor present but the oracle denied the capability
    Forbidden,
    /// LFS is switched off for this installation
    FeatureDisabled,
}

/// Decide whether `actor` may perform `operation` against `origin`.
///
/// Authorization always evaluates the origin project, never the storage
/// project a fork's blobs live under.
pub async fn authorize(
    lfs_enabled: bool,
    oracle: &dyn PermissionOracle,
    actor: Option<&Actor>,
    origin: &Project,
    operation: Operation,
) -> AccessDecision {
    if !lfs_enabled {
        return AccessDecision::FeatureDisabled;
    }

    match operation {
        Operation::Download => {
            if origin.is_public() {
                return AccessDecision::Allowed;
            }
            let Some(actor) = actor else {
                return AccessDecision::Unauthenticated;
            };
            if oracle.can(actor, Capability::DownloadCode, origin).await {
                AccessDecision::Allowed
            } else {
                AccessDecision::Forbidden
            }
        }
        Operation::Upload => {
            let Some(actor) = actor else {
                return AccessDecision::Unauthenticated;
            };
            if oracle.can(actor, Capability::PushCode, origin).await {
                AccessDecision::Allowed
            } else {
                AccessDecision::Forbidden
            }
        }
    }
}
