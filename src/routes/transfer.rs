//! Transfer authorization routes
//!
//! The four operations of the LFS transfer protocol, each producing a
//! complete HTTP response:
//!
//! - `GET  /{project}.git/info/lfs/objects/{oid}` - download hypermedia
//! - `GET  /{project}.git/gitlab-lfs/objects/{oid}` - direct transfer handoff
//! - `POST /{project}.git/info/lfs/objects/batch` - upload authorization
//! - `PUT  /{project}.git/gitlab-lfs/objects/{oid}/{size}` - upload commit
//!
//! Every operation runs the authorization gate before anything else, with a
//! uniform mapping for rejections: feature disabled is 501, no actor is 401,
//! oracle denial is 403. Download preconditions that fail *after* the gate
//! (wrong Accept value, missing direct-transfer hint, unknown object)
//! deliberately collapse to 404 so unauthorized or malformed callers learn
//! nothing about what exists.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderMap;
use hyper::{header, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::{authorize, AccessDecision, Actor, IdentityDirectory, Operation};
use crate::routes::hypermedia::{self, LFS_CONTENT_TYPE};
use crate::server::AppState;
use crate::storage::TempUpload;

/// Per-request transfer context: resolved actor plus raw transport hints.
#[derive(Debug, Default)]
pub struct TransferRequest {
    pub actor: Option<Actor>,
    pub accept: Option<String>,
    pub authorization: Option<String>,
    pub sendfile_type: Option<String>,
}

impl TransferRequest {
    pub fn from_headers(headers: &HeaderMap, identities: &IdentityDirectory) -> Self {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let actor = authorization
            .as_deref()
            .and_then(|value| identities.authenticate(value));

        Self {
            actor,
            accept: headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            authorization,
            sendfile_type: headers
                .get("x-sendfile-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Body of a batch authorization request
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub objects: Vec<BatchPointer>,
}

/// One requested object pointer
#[derive(Debug, Deserialize)]
pub struct BatchPointer {
    pub oid: String,
    pub size: u64,
}

/// Download hypermedia: hand the client a link it can follow to fetch bytes.
pub async fn download_hypermedia(
    state: &AppState,
    project_path: &str,
    oid: &str,
    req: &TransferRequest,
) -> Response<Full<Bytes>> {
    let docs = state.args.documentation_url();
    if !state.args.lfs_enabled {
        return feature_disabled_response(&docs);
    }

    let Some(resolved) = state.registry.resolve(project_path) else {
        return not_found_response(&docs);
    };

    let decision = authorize(
        state.args.lfs_enabled,
        state.oracle.as_ref(),
        req.actor.as_ref(),
        &resolved.origin,
        Operation::Download,
    )
    .await;
    if let Some(rejection) = gate_rejection(&docs, decision) {
        return rejection;
    }

    // Gate first, then the media-type precondition: a wrong Accept value is
    // a 404, never a 406, even for a fully authorized caller.
    if req.accept.as_deref() != Some(LFS_CONTENT_TYPE) {
        debug!(project = %project_path, oid = %oid, "Download refused, Accept is not the LFS media type");
        return not_found_response(&docs);
    }

    match state.store.find_for_project(resolved.storage.id, oid) {
        Ok(Some(object)) => {
            let origin_url = resolved.origin.http_url(state.args.external_url_base());
            let body = hypermedia::download_object(
                &origin_url,
                &object.oid,
                req.authorization.as_deref(),
            );
            lfs_json_response(StatusCode::OK, &body)
        }
        Ok(None) => {
            debug!(project = %project_path, oid = %oid, "Object not stored for project");
            not_found_response(&docs)
        }
        Err(e) => {
            warn!(project = %project_path, oid = %oid, error = %e, "Object lookup failed");
            internal_error_response(&docs)
        }
    }
}

/// Direct transfer handoff: answer with the blob's location for the
/// sendfile-capable front proxy; the bytes themselves never pass through
/// this process.
pub async fn direct_download(
    state: &AppState,
    project_path: &str,
    oid: &str,
    req: &TransferRequest,
) -> Response<Full<Bytes>> {
    let docs = state.args.documentation_url();
    if !state.args.lfs_enabled {
        return feature_disabled_response(&docs);
    }

    let Some(resolved) = state.registry.resolve(project_path) else {
        return not_found_response(&docs);
    };

    let decision = authorize(
        state.args.lfs_enabled,
        state.oracle.as_ref(),
        req.actor.as_ref(),
        &resolved.origin,
        Operation::Download,
    )
    .await;
    if let Some(rejection) = gate_rejection(&docs, decision) {
        return rejection;
    }

    if req.sendfile_type.as_deref() != Some("X-Sendfile") {
        debug!(project = %project_path, oid = %oid, "Direct transfer refused, no sendfile capability");
        return not_found_response(&docs);
    }
    if req.accept.as_deref() != Some(LFS_CONTENT_TYPE) {
        debug!(project = %project_path, oid = %oid, "Direct transfer refused, Accept is not the LFS media type");
        return not_found_response(&docs);
    }

    match state.store.find_for_project(resolved.storage.id, oid) {
        Ok(Some(object)) => {
            let path = state.store.blob_path(&object.oid);
            info!(project = %project_path, oid = %oid, "Handing blob off to transfer layer");
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header("X-Sendfile", path.to_string_lossy().as_ref())
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        Ok(None) => not_found_response(&docs),
        Err(e) => {
            warn!(project = %project_path, oid = %oid, error = %e, "Object lookup failed");
            internal_error_response(&docs)
        }
    }
}

/// Batch authorization: for each requested object, tell the client whether
/// to upload it and how.
pub async fn batch_authorize(
    state: &AppState,
    project_path: &str,
    req: &TransferRequest,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let docs = state.args.documentation_url();
    if !state.args.lfs_enabled {
        return feature_disabled_response(&docs);
    }

    let Some(resolved) = state.registry.resolve(project_path) else {
        return not_found_response(&docs);
    };

    let decision = authorize(
        state.args.lfs_enabled,
        state.oracle.as_ref(),
        req.actor.as_ref(),
        &resolved.origin,
        Operation::Upload,
    )
    .await;
    if let Some(rejection) = gate_rejection(&docs, decision) {
        return rejection;
    }

    let request: BatchRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            debug!(project = %project_path, error = %e, "Unparseable batch body");
            return not_found_response(&docs);
        }
    };
    if request.objects.is_empty() {
        return not_found_response(&docs);
    }

    let origin_url = resolved.origin.http_url(state.args.external_url_base());
    let mut objects = Vec::with_capacity(request.objects.len());
    for pointer in &request.objects {
        let present = match state.store.find_for_project(resolved.storage.id, &pointer.oid) {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(project = %project_path, oid = %pointer.oid, error = %e, "Object lookup failed");
                return internal_error_response(&docs);
            }
        };
        objects.push(hypermedia::batch_object(
            &origin_url,
            &pointer.oid,
            pointer.size,
            present,
            req.authorization.as_deref(),
        ));
    }

    debug!(
        project = %project_path,
        requested = request.objects.len(),
        "Batch authorization issued"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header(header::CACHE_CONTROL, "private")
        .body(Full::new(Bytes::from(
            json!({ "objects": objects }).to_string(),
        )))
        .unwrap()
}

/// Upload commit: land a spooled upload in content-addressed storage and
/// associate it with the storage project.
///
/// The spooled temp file is consumed here on every path; rejected commits
/// drop it, which removes the artifact from disk.
pub async fn upload_commit(
    state: &AppState,
    project_path: &str,
    oid: &str,
    size: u64,
    req: &TransferRequest,
    upload: TempUpload,
) -> Response<Full<Bytes>> {
    let docs = state.args.documentation_url();
    if !state.args.lfs_enabled {
        return feature_disabled_response(&docs);
    }

    let Some(resolved) = state.registry.resolve(project_path) else {
        return not_found_response(&docs);
    };

    let decision = authorize(
        state.args.lfs_enabled,
        state.oracle.as_ref(),
        req.actor.as_ref(),
        &resolved.origin,
        Operation::Upload,
    )
    .await;
    if let Some(rejection) = gate_rejection(&docs, decision) {
        return rejection;
    }

    let object = match state.store.commit(oid, size, upload) {
        Ok(object) => object,
        Err(e) => {
            warn!(project = %project_path, oid = %oid, size = size, error = %e, "Commit failed");
            return unprocessable_response();
        }
    };

    if let Err(e) = state.store.associate(&object, resolved.storage.id) {
        warn!(project = %project_path, oid = %oid, error = %e, "Project association failed");
        return unprocessable_response();
    }

    info!(
        project = %project_path,
        storage_project = resolved.storage.id,
        oid = %oid,
        size = size,
        "Upload committed"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, 0)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Map a gate rejection to its response. Returns None when access is allowed.
fn gate_rejection(documentation_url: &str, decision: AccessDecision) -> Option<Response<Full<Bytes>>> {
    match decision {
        AccessDecision::Allowed => None,
        AccessDecision::FeatureDisabled => Some(feature_disabled_response(documentation_url)),
        AccessDecision::Unauthenticated => Some(plain_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
        )),
        AccessDecision::Forbidden => Some(lfs_error_response(
            StatusCode::FORBIDDEN,
            "Access forbidden. Check your access level.",
            documentation_url,
        )),
    }
}

fn feature_disabled_response(documentation_url: &str) -> Response<Full<Bytes>> {
    lfs_error_response(
        StatusCode::NOT_IMPLEMENTED,
        "Git LFS is not enabled on this server",
        documentation_url,
    )
}

fn not_found_response(documentation_url: &str) -> Response<Full<Bytes>> {
    lfs_error_response(StatusCode::NOT_FOUND, "Not found", documentation_url)
}

fn internal_error_response(documentation_url: &str) -> Response<Full<Bytes>> {
    lfs_error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        documentation_url,
    )
}

pub(crate) fn unprocessable_response() -> Response<Full<Bytes>> {
    plain_response(StatusCode::UNPROCESSABLE_ENTITY, "Unprocessable Entity")
}

fn lfs_error_response(
    status: StatusCode,
    message: &str,
    documentation_url: &str,
) -> Response<Full<Bytes>> {
    let body = json!({
        "message": message,
        "documentation_url": documentation_url,
    });
    lfs_json_response(status, &body)
}

fn lfs_json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, LFS_CONTENT_TYPE)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn plain_response(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(text)))
        .unwrap()
}
