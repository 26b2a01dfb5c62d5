//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Requests are decoded
//! into a project path plus LFS endpoint, then dispatched to the transfer
//! routes; everything the routes need per request travels in a
//! [`TransferRequest`] extracted from the headers up front.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{IdentityDirectory, MembershipOracle, PermissionOracle};
use crate::config::Args;
use crate::registry::ProjectRegistry;
use crate::routes::{self, TransferRequest};
use crate::storage::LfsStore;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Projects known to this installation
    pub registry: ProjectRegistry,
    /// Username/token directory for Basic authentication
    pub identities: IdentityDirectory,
    /// External permission policy
    pub oracle: Arc<dyn PermissionOracle>,
    /// Content-addressed object storage
    pub store: LfsStore,
    pub started_at: Instant,
}

impl AppState {
    /// Create state with empty collaborators (no projects, no identities).
    pub fn new(args: Args) -> Result<Self> {
        Self::with_collaborators(
            args,
            ProjectRegistry::new(),
            IdentityDirectory::new(),
            Arc::new(MembershipOracle::new()),
        )
    }

    /// Create state around pre-populated collaborators.
    pub fn with_collaborators(
        args: Args,
        registry: ProjectRegistry,
        identities: IdentityDirectory,
        oracle: Arc<dyn PermissionOracle>,
    ) -> Result<Self> {
        let store = LfsStore::open(&args.storage_path)?;

        Ok(Self {
            args,
            registry,
            identities,
            oracle,
            store,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Gatehouse listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    info!(projects = state.registry.len(), "Project registry loaded");

    if !state.args.lfs_enabled {
        warn!("LFS is disabled - every transfer operation will answer 501");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// LFS endpoints carved out of the request path
#[derive(Debug, Clone, PartialEq, Eq)]
enum LfsEndpoint {
    /// `info/lfs/objects/batch`
    Batch,
    /// `info/lfs/objects/{oid}`
    InfoObject { oid: String },
    /// `gitlab-lfs/objects/{oid}`
    StorageObject { oid: String },
    /// `gitlab-lfs/objects/{oid}/{size}`
    StorageUpload { oid: String, size: u64 },
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(client = %addr, method = %method, path = %path, "Request");

    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return Ok(routes::health_check(&state));
        }
        (&Method::GET, "/version") => {
            return Ok(routes::version_info());
        }
        _ => {}
    }

    let Some((project, endpoint)) = parse_lfs_path(&path) else {
        return Ok(not_found_response(&path));
    };

    let transfer = TransferRequest::from_headers(req.headers(), &state.identities);

    match (method, endpoint) {
        (Method::GET, LfsEndpoint::InfoObject { oid }) => {
            Ok(routes::download_hypermedia(&state, &project, &oid, &transfer).await)
        }
        (Method::GET, LfsEndpoint::StorageObject { oid }) => {
            Ok(routes::direct_download(&state, &project, &oid, &transfer).await)
        }
        (Method::POST, LfsEndpoint::Batch) => {
            let body = req.collect().await?.to_bytes();
            Ok(routes::batch_authorize(&state, &project, &transfer, &body).await)
        }
        (Method::PUT, LfsEndpoint::StorageUpload { oid, size }) => {
            let body = req.collect().await?.to_bytes();
            let upload = match state.store.spool(&body) {
                Ok(upload) => upload,
                Err(e) => {
                    error!(oid = %oid, error = %e, "Failed to spool upload body");
                    return Ok(routes::transfer::unprocessable_response());
                }
            };
            Ok(routes::upload_commit(&state, &project, &oid, size, &transfer, upload).await)
        }
        _ => Ok(not_found_response(&path)),
    }
}

/// Split a request path into its project path and LFS endpoint.
///
/// Paths look like `/{namespace}/{project}.git/{endpoint}`. Object ids are
/// validated here once; the routes can rely on well-formed oids.
fn parse_lfs_path(path: &str) -> Option<(String, LfsEndpoint)> {
    let path = path.strip_prefix('/')?;
    let (project, rest) = path.split_once(".git/")?;
    if project.is_empty() || project.contains("..") {
        return None;
    }

    let endpoint = if rest == "info/lfs/objects/batch" {
        LfsEndpoint::Batch
    } else if let Some(oid) = rest.strip_prefix("info/lfs/objects/") {
        if !is_valid_oid(oid) {
            return None;
        }
        LfsEndpoint::InfoObject {
            oid: oid.to_string(),
        }
    } else if let Some(tail) = rest.strip_prefix("gitlab-lfs/objects/") {
        match tail.split_once('/') {
            Some((oid, size)) => {
                if !is_valid_oid(oid) {
                    return None;
                }
                LfsEndpoint::StorageUpload {
                    oid: oid.to_string(),
                    size: size.parse().ok()?,
                }
            }
            None => {
                if !is_valid_oid(tail) {
                    return None;
                }
                LfsEndpoint::StorageObject {
                    oid: tail.to_string(),
                }
            }
        }
    } else {
        return None;
    };

    Some((project.to_string(), endpoint))
}

/// Object ids are lowercase sha256 hex, 64 characters.
fn is_valid_oid(oid: &str) -> bool {
    oid.len() == 64 && oid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Not found response for paths outside the LFS surface
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
