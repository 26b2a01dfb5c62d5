//! Health and version endpoints
//!
//! - /health, /healthz - liveness probe
//! - /version - build identification for deployment verification

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    version: &'static str,
    uptime: u64,
    node_id: String,
    lfs_enabled: bool,
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let body = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        node_id: state.args.node_id.to_string(),
        lfs_enabled: state.args.lfs_enabled,
    };

    json_response(&serde_json::to_value(&body).unwrap_or_default())
}

pub fn version_info() -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_COMMIT_SHORT"),
        "built": env!("BUILD_TIMESTAMP"),
    });

    json_response(&body)
}

fn json_response(body: &serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
