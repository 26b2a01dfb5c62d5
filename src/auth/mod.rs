//! Authentication and authorization for the transfer gateway
//!
//! Provides:
//! - Actor extraction from inbound Basic credentials
//! - Capability model with ordered access levels
//! - The permission oracle trait and its membership-backed implementation
//! - The authorization gate driven by the transfer routes

pub mod credentials;
pub mod gate;
pub mod permissions;

pub use credentials::{Actor, IdentityDirectory};
pub use gate::{authorize, AccessDecision, Operation};
pub use permissions::{
    required_level, AccessLevel, Capability, MembershipOracle, PermissionOracle,
};
