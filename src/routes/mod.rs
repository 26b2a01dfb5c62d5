//! HTTP routes for gatehouse

pub mod health;
pub mod hypermedia;
pub mod transfer;

pub use health::{health_check, version_info};
pub use hypermedia::LFS_CONTENT_TYPE;
pub use transfer::{
    batch_authorize, direct_download, download_hypermedia, upload_commit, BatchPointer,
    BatchRequest, TransferRequest,
};
