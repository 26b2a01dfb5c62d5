//! Actor identity extraction from inbound credentials
//!
//! Transfer requests authenticate with HTTP Basic credentials (git over
//! HTTPS convention). The gateway only needs to establish *who* is asking;
//! what they may do is the gate's concern. Credentials that do not resolve
//! to a known identity leave the request anonymous rather than failing it:
//! whether anonymous access suffices depends on the project and operation,
//! which the gate decides.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dashmap::DashMap;
use tracing::debug;

/// A resolved requesting identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
}

/// Username/token directory backing Basic authentication
pub struct IdentityDirectory {
    tokens: DashMap<String, String>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn insert(&self, username: &str, token: &str) {
        self.tokens.insert(username.to_string(), token.to_string());
    }

    /// Resolve an `Authorization` header value to an actor.
    ///
    /// Returns None for anything other than well-formed Basic credentials
    /// matching a known username/token pair.
    pub fn authenticate(&self, authorization: &str) -> Option<Actor> {
        let encoded = authorization.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, token) = decoded.split_once(':')?;

        let expected = self.tokens.get(username)?;
        if expected.value() != token {
            debug!(username = %username, "Token mismatch, treating request as anonymous");
            return None;
        }

        Some(Actor {
            username: username.to_string(),
        })
    }
}

impl Default for IdentityDirectory {
    fn default() -> Self {
        Self::new()
    }
}
