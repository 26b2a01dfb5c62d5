//! Shared error and result types for gatehouse

use thiserror::Error;

/// Errors surfaced by the gateway's infrastructure layers.
///
/// Protocol-level rejections (401/403/404/422/501) never travel through this
/// type; they are mapped straight to HTTP responses by the transfer routes.
/// This enum covers the failures underneath: disk, object index, codec.
#[derive(Debug, Error)]
pub enum GatehouseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// An upload whose spooled bytes do not match the declared oid or size,
    /// or that conflicts with an already-recorded object.
    #[error("upload rejected: {0}")]
    UploadRejected(String),
}

pub type Result<T> = std::result::Result<T, GatehouseError>;
