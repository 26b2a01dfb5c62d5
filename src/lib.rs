//! Gatehouse - transfer authorization gateway for Git LFS object storage
//!
//! Gatehouse decides, per request, whether a client may fetch or store a
//! large binary object, hands back hypermedia instructions describing how to
//! do so, and performs the final commit of an uploaded object into
//! content-addressed storage shared across a project and its forks.
//!
//! ## Components
//!
//! - **Gate**: per-request authorization over an external permission oracle
//! - **Registry**: projects, visibility, and origin/fork-root resolution
//! - **Store**: content-addressed blobs plus a sqlite object index
//! - **Routes**: the four LFS transfer operations and their hypermedia bodies
//!
//! The byte-transfer path itself is delegated to a sendfile-capable front
//! proxy; this process only ever answers with decisions and metadata.

pub mod auth;
pub mod config;
pub mod registry;
pub mod routes;
pub mod server;
pub mod storage;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatehouseError, Result};
