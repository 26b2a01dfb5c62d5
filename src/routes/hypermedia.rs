//! Hypermedia link construction
//!
//! Pure builders for the JSON link structures LFS clients follow to perform
//! the actual byte transfer. The inbound `Authorization` value, when present,
//! is echoed verbatim into the link headers so the client can replay it
//! against the transfer endpoint; when absent, the key is left out entirely
//! rather than emitted empty.

use serde_json::{json, Map, Value};

/// Media type the LFS protocol speaks
pub const LFS_CONTENT_TYPE: &str = "application/vnd.git-lfs+json; charset=utf-8";

/// Download link body for one object.
pub fn download_object(origin_url: &str, oid: &str, authorization: Option<&str>) -> Value {
    let mut header = Map::new();
    header.insert("Accept".to_string(), json!(LFS_CONTENT_TYPE));
    if let Some(value) = authorization {
        header.insert("Authorization".to_string(), json!(value));
    }

    json!({
        "_links": {
            "download": {
                "href": format!("{}/gitlab-lfs/objects/{}", origin_url, oid),
                "header": header,
            }
        }
    })
}

/// Batch entry for one requested object.
///
/// Objects already present for the project carry no upload link, which tells
/// the client to skip sending them.
pub fn batch_object(
    origin_url: &str,
    oid: &str,
    size: u64,
    present: bool,
    authorization: Option<&str>,
) -> Value {
    if present {
        return json!({ "oid": oid, "size": size });
    }

    let mut header = Map::new();
    if let Some(value) = authorization {
        header.insert("Authorization".to_string(), json!(value));
    }

    json!({
        "oid": oid,
        "size": size,
        "_links": {
            "upload": {
                "href": format!("{}/gitlab-lfs/objects/{}/{}", origin_url, oid, size),
                "header": header,
            }
        }
    })
}
