//! End-to-end tests for the transfer authorization routes
//!
//! Drives the four LFS operations directly against an AppState backed by a
//! temp-directory store, asserting on full responses: status, headers, and
//! body shape.

use http_body_util::BodyExt;
use sha2::Digest;
use std::sync::Arc;

use gatehouse::auth::{AccessLevel, Actor, IdentityDirectory, MembershipOracle};
use gatehouse::config::Args;
use gatehouse::registry::{Project, ProjectRegistry, Visibility};
use gatehouse::routes::{self, TransferRequest, LFS_CONTENT_TYPE};
use gatehouse::server::AppState;

const PUBLIC: &str = "group/public-app";
const PRIVATE: &str = "group/private-app";
const FORK: &str = "forker/private-app";

struct Harness {
    state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

/// Projects: a public one (id 1), a private one (id 2), and a private fork
/// of the private one (id 3). Alice is a developer on the private project
/// and its fork; Bob is known but holds no memberships.
fn harness(lfs_enabled: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let args = Args {
        node_id: uuid::Uuid::new_v4(),
        listen: "127.0.0.1:0".parse().unwrap(),
        external_url: "http://lfs.test".to_string(),
        storage_path: dir.path().join("lfs"),
        lfs_enabled,
        seed_file: None,
        log_level: "info".to_string(),
    };

    let registry = ProjectRegistry::new();
    registry.insert(Project {
        id: 1,
        path: PUBLIC.to_string(),
        visibility: Visibility::Public,
        fork_of: None,
    });
    registry.insert(Project {
        id: 2,
        path: PRIVATE.to_string(),
        visibility: Visibility::Private,
        fork_of: None,
    });
    registry.insert(Project {
        id: 3,
        path: FORK.to_string(),
        visibility: Visibility::Private,
        fork_of: Some(PRIVATE.to_string()),
    });

    let identities = IdentityDirectory::new();
    identities.insert("alice", "s3cr3t");
    identities.insert("bob", "hunter2");

    let oracle = MembershipOracle::new();
    oracle.grant("alice", 2, AccessLevel::Developer);
    oracle.grant("alice", 3, AccessLevel::Developer);

    let state = AppState::with_collaborators(args, registry, identities, Arc::new(oracle)).unwrap();
    Harness {
        state: Arc::new(state),
        _dir: dir,
    }
}

fn oid_of(bytes: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(bytes))
}

fn anonymous() -> TransferRequest {
    TransferRequest {
        actor: None,
        accept: Some(LFS_CONTENT_TYPE.to_string()),
        authorization: None,
        sendfile_type: None,
    }
}

fn as_user(name: &str) -> TransferRequest {
    TransferRequest {
        actor: Some(Actor {
            username: name.to_string(),
        }),
        accept: Some(LFS_CONTENT_TYPE.to_string()),
        authorization: Some(format!("Basic {}-credentials", name)),
        sendfile_type: None,
    }
}

/// Commit a payload and associate it with a storage project, bypassing HTTP.
fn seed_object(state: &AppState, project_id: i64, payload: &[u8]) -> String {
    let oid = oid_of(payload);
    let upload = state.store.spool(payload).unwrap();
    let object = state.store.commit(&oid, payload.len() as u64, upload).unwrap();
    state.store.associate(&object, project_id).unwrap();
    oid
}

async fn body_json(response: hyper::Response<http_body_util::Full<bytes::Bytes>>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: hyper::Response<http_body_util::Full<bytes::Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn header<'a>(
    response: &'a hyper::Response<http_body_util::Full<bytes::Bytes>>,
    name: &str,
) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn tmp_entries(state: &AppState) -> usize {
    std::fs::read_dir(state.store.tmp_dir()).unwrap().count()
}

// ---------------------------------------------------------------------------
// download-hypermedia
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_download_from_private_project_is_unauthorized() {
    let h = harness(true);
    let oid = seed_object(&h.state, 2, b"private bytes");

    let response = routes::download_hypermedia(&h.state, PRIVATE, &oid, &anonymous()).await;

    assert_eq!(response.status(), 401);
    assert_eq!(header(&response, "content-type"), Some("text/plain"));
    assert_eq!(body_text(response).await, "Unauthorized");
}

#[tokio::test]
async fn unprivileged_download_from_private_project_is_forbidden() {
    let h = harness(true);
    let oid = seed_object(&h.state, 2, b"private bytes");

    let response = routes::download_hypermedia(&h.state, PRIVATE, &oid, &as_user("bob")).await;

    assert_eq!(response.status(), 403);
    assert_eq!(header(&response, "content-type"), Some(LFS_CONTENT_TYPE));
    let body = body_json(response).await;
    assert_eq!(body["documentation_url"], "http://lfs.test/help");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn anonymous_download_from_public_project_returns_link() {
    let h = harness(true);
    let payload = b"public bytes";
    let oid = seed_object(&h.state, 1, payload);

    let response = routes::download_hypermedia(&h.state, PUBLIC, &oid, &anonymous()).await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-type"), Some(LFS_CONTENT_TYPE));

    let body = body_json(response).await;
    let link = &body["_links"]["download"];
    assert_eq!(
        link["href"],
        format!("http://lfs.test/{}.git/gitlab-lfs/objects/{}", PUBLIC, oid)
    );
    assert_eq!(link["header"]["Accept"], LFS_CONTENT_TYPE);
    // No inbound Authorization, so the key must be absent entirely.
    assert!(!link["header"].as_object().unwrap().contains_key("Authorization"));
}

#[tokio::test]
async fn inbound_authorization_is_forwarded_verbatim() {
    let h = harness(true);
    let oid = seed_object(&h.state, 2, b"private bytes");

    let response = routes::download_hypermedia(&h.state, PRIVATE, &oid, &as_user("alice")).await;

    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(
        body["_links"]["download"]["header"]["Authorization"],
        "Basic alice-credentials"
    );
}

#[tokio::test]
async fn wrong_accept_is_not_found_even_when_authorized() {
    let h = harness(true);
    let oid = seed_object(&h.state, 2, b"private bytes");

    let mut request = as_user("alice");
    request.accept = Some("application/json".to_string());
    let response = routes::download_hypermedia(&h.state, PRIVATE, &oid, &request).await;
    // Gate passed, precondition failed: 404, deliberately not 403 or 406.
    assert_eq!(response.status(), 404);

    let mut request = as_user("alice");
    request.accept = None;
    let response = routes::download_hypermedia(&h.state, PRIVATE, &oid, &request).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn unknown_object_is_not_found() {
    let h = harness(true);
    let oid = oid_of(b"never stored");

    let response = routes::download_hypermedia(&h.state, PUBLIC, &oid, &anonymous()).await;

    assert_eq!(response.status(), 404);
    assert_eq!(header(&response, "content-type"), Some(LFS_CONTENT_TYPE));
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let h = harness(true);
    let oid = oid_of(b"whatever");

    let response = routes::download_hypermedia(&h.state, "no/such-project", &oid, &anonymous()).await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn fork_download_finds_objects_stored_under_fork_root() {
    let h = harness(true);
    // Committed under the fork root (id 2), fetched through the fork path.
    let oid = seed_object(&h.state, 2, b"shared across forks");

    let response = routes::download_hypermedia(&h.state, FORK, &oid, &as_user("alice")).await;

    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    // The link points at the origin the client addressed, not the fork root.
    assert_eq!(
        body["_links"]["download"]["href"],
        format!("http://lfs.test/{}.git/gitlab-lfs/objects/{}", FORK, oid)
    );
}

// ---------------------------------------------------------------------------
// download-direct-transfer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_download_requires_sendfile_capability() {
    let h = harness(true);
    let oid = seed_object(&h.state, 1, b"direct bytes");

    let response = routes::direct_download(&h.state, PUBLIC, &oid, &anonymous()).await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn direct_download_hands_off_blob_location() {
    let h = harness(true);
    let oid = seed_object(&h.state, 1, b"direct bytes");

    let mut request = anonymous();
    request.sendfile_type = Some("X-Sendfile".to_string());
    let response = routes::direct_download(&h.state, PUBLIC, &oid, &request).await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        header(&response, "x-sendfile"),
        Some(h.state.store.blob_path(&oid).to_string_lossy().as_ref())
    );
    // Byte delivery is the transport layer's job; the body stays empty.
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn direct_download_still_requires_lfs_accept() {
    let h = harness(true);
    let oid = seed_object(&h.state, 1, b"direct bytes");

    let mut request = anonymous();
    request.sendfile_type = Some("X-Sendfile".to_string());
    request.accept = Some("*/*".to_string());
    let response = routes::direct_download(&h.state, PUBLIC, &oid, &request).await;

    assert_eq!(response.status(), 404);
}

// ---------------------------------------------------------------------------
// batch-authorize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_links_only_missing_objects() {
    let h = harness(true);
    let stored = seed_object(&h.state, 2, b"already stored");
    let missing = oid_of(b"not yet stored");

    let body = serde_json::json!({
        "objects": [
            { "oid": stored, "size": 14 },
            { "oid": missing, "size": 2048 },
        ]
    });
    let response =
        routes::batch_authorize(&h.state, PRIVATE, &as_user("alice"), body.to_string().as_bytes())
            .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        header(&response, "content-type"),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(header(&response, "cache-control"), Some("private"));

    let body = body_json(response).await;
    let objects = body["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 2);

    // Stored object: pointer only, client should skip the upload.
    assert_eq!(objects[0]["oid"], stored);
    assert!(objects[0].get("_links").is_none());

    // Missing object: upload link with forwarded credentials.
    assert_eq!(
        objects[1]["_links"]["upload"]["href"],
        format!("http://lfs.test/{}.git/gitlab-lfs/objects/{}/2048", PRIVATE, missing)
    );
    assert_eq!(
        objects[1]["_links"]["upload"]["header"]["Authorization"],
        "Basic alice-credentials"
    );
}

#[tokio::test]
async fn batch_requires_objects() {
    let h = harness(true);

    let empty = routes::batch_authorize(&h.state, PRIVATE, &as_user("alice"), b"{\"objects\":[]}").await;
    assert_eq!(empty.status(), 404);

    let missing = routes::batch_authorize(&h.state, PRIVATE, &as_user("alice"), b"{}").await;
    assert_eq!(missing.status(), 404);

    let garbage = routes::batch_authorize(&h.state, PRIVATE, &as_user("alice"), b"not json").await;
    assert_eq!(garbage.status(), 404);
}

#[tokio::test]
async fn batch_is_gated_on_push() {
    let h = harness(true);
    let body = serde_json::json!({ "objects": [{ "oid": oid_of(b"x"), "size": 1 }] }).to_string();

    let anonymous = routes::batch_authorize(&h.state, PRIVATE, &anonymous(), body.as_bytes()).await;
    assert_eq!(anonymous.status(), 401);

    let unprivileged = routes::batch_authorize(&h.state, PRIVATE, &as_user("bob"), body.as_bytes()).await;
    assert_eq!(unprivileged.status(), 403);

    // Public visibility grants downloads, never pushes.
    let public_push = routes::batch_authorize(&h.state, PUBLIC, &as_user("bob"), body.as_bytes()).await;
    assert_eq!(public_push.status(), 403);
}

// ---------------------------------------------------------------------------
// upload-commit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_commit_stores_and_associates() {
    let h = harness(true);
    let payload = b"fresh upload";
    let oid = oid_of(payload);

    let upload = h.state.store.spool(payload).unwrap();
    let response = routes::upload_commit(
        &h.state,
        PRIVATE,
        &oid,
        payload.len() as u64,
        &as_user("alice"),
        upload,
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-length"), Some("0"));
    assert!(body_text(response).await.is_empty());

    assert!(h.state.store.exists(&oid, payload.len() as u64).unwrap());
    assert!(h.state.store.find_for_project(2, &oid).unwrap().is_some());
    assert_eq!(std::fs::read(h.state.store.blob_path(&oid)).unwrap(), payload);
    assert_eq!(tmp_entries(&h.state), 0);
}

#[tokio::test]
async fn upload_commit_through_fork_lands_under_fork_root() {
    let h = harness(true);
    let payload = b"uploaded via fork";
    let oid = oid_of(payload);

    let upload = h.state.store.spool(payload).unwrap();
    let response = routes::upload_commit(
        &h.state,
        FORK,
        &oid,
        payload.len() as u64,
        &as_user("alice"),
        upload,
    )
    .await;

    assert_eq!(response.status(), 200);
    // Associated with the fork root, so the upstream sees it too.
    assert!(h.state.store.find_for_project(2, &oid).unwrap().is_some());
    assert!(h.state.store.find_for_project(3, &oid).unwrap().is_none());
}

#[tokio::test]
async fn upload_commit_is_gated_on_push() {
    let h = harness(true);
    let payload = b"gated upload";
    let oid = oid_of(payload);

    let upload = h.state.store.spool(payload).unwrap();
    let response =
        routes::upload_commit(&h.state, PRIVATE, &oid, payload.len() as u64, &anonymous(), upload)
            .await;
    assert_eq!(response.status(), 401);
    assert_eq!(tmp_entries(&h.state), 0);

    let upload = h.state.store.spool(payload).unwrap();
    let response =
        routes::upload_commit(&h.state, PRIVATE, &oid, payload.len() as u64, &as_user("bob"), upload)
            .await;
    assert_eq!(response.status(), 403);
    // Rejected commits must not leak spooled temp files.
    assert_eq!(tmp_entries(&h.state), 0);
}

#[tokio::test]
async fn upload_commit_rejects_mismatched_declaration() {
    let h = harness(true);
    let payload = b"mismatched upload";
    let declared = oid_of(b"something else entirely");

    let upload = h.state.store.spool(payload).unwrap();
    let response = routes::upload_commit(
        &h.state,
        PRIVATE,
        &declared,
        payload.len() as u64,
        &as_user("alice"),
        upload,
    )
    .await;

    assert_eq!(response.status(), 422);
    assert_eq!(header(&response, "content-type"), Some("text/plain"));
    assert_eq!(body_text(response).await, "Unprocessable Entity");
    assert_eq!(tmp_entries(&h.state), 0);
}

#[tokio::test]
async fn concurrent_upload_commits_both_succeed() {
    let h = harness(true);
    let payload = b"raced upload".to_vec();
    let oid = oid_of(&payload);
    let size = payload.len() as u64;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let state = Arc::clone(&h.state);
        let payload = payload.clone();
        let oid = oid.clone();
        handles.push(tokio::spawn(async move {
            let upload = state.store.spool(&payload).unwrap();
            routes::upload_commit(&state, PRIVATE, &oid, size, &as_user("alice"), upload).await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), 200);
    }

    assert!(h.state.store.exists(&oid, size).unwrap());
    assert_eq!(tmp_entries(&h.state), 0);
}

#[tokio::test]
async fn recommit_of_existing_object_succeeds() {
    let h = harness(true);
    let payload = b"committed twice";
    let oid = seed_object(&h.state, 2, payload);

    let upload = h.state.store.spool(payload).unwrap();
    let response = routes::upload_commit(
        &h.state,
        PRIVATE,
        &oid,
        payload.len() as u64,
        &as_user("alice"),
        upload,
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(tmp_entries(&h.state), 0);
}

// ---------------------------------------------------------------------------
// feature switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_feature_answers_501_everywhere() {
    let h = harness(false);
    let oid = oid_of(b"irrelevant");

    // Public project, anonymous caller: the switch still wins.
    let download = routes::download_hypermedia(&h.state, PUBLIC, &oid, &anonymous()).await;
    assert_eq!(download.status(), 501);

    let direct = routes::direct_download(&h.state, PUBLIC, &oid, &anonymous()).await;
    assert_eq!(direct.status(), 501);

    let batch = routes::batch_authorize(&h.state, PRIVATE, &as_user("alice"), b"{}").await;
    assert_eq!(batch.status(), 501);

    let upload = h.state.store.spool(b"irrelevant").unwrap();
    let commit = routes::upload_commit(&h.state, PRIVATE, &oid, 10, &as_user("alice"), upload).await;
    assert_eq!(commit.status(), 501);
    assert_eq!(tmp_entries(&h.state), 0);

    // Checked before project resolution as well.
    let unknown = routes::download_hypermedia(&h.state, "no/such-project", &oid, &anonymous()).await;
    assert_eq!(unknown.status(), 501);

    let body = body_json(download).await;
    assert!(body["message"].as_str().unwrap().contains("not enabled"));
}
