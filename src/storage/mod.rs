//! Content-addressed object storage
//!
//! Blob bytes live on the filesystem under a deterministic fan-out keyed by
//! oid; object metadata and project associations live in a small sqlite
//! index beside them.

pub mod index;
pub mod store;

pub use index::{ObjectIndex, StoredObject};
pub use store::{LfsStore, TempUpload};
