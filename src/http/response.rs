//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Rebuild the client response from captured upstream parts
//! - Map pipeline errors to JSON error responses
//!
//! # Design Decisions
//! - Hop-by-hop headers stripped automatically
//! - Released bodies are sent exactly as captured
//! - Bodyless responses (HEAD, 1xx, 204, 304) keep the upstream's `Content-Length`

use axum::body::Body;
use axum::http::header::{CONNECTION, CONTENT_LENGTH};
use axum::http::response::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use crate::intercept::{ErrorResponder, PipelineError};

pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any the `Connection` header names.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Whether a response to `method` with `status` carries a message body.
pub fn has_body(method: &Method, status: StatusCode) -> bool {
    !(method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Client response from upstream parts and the captured body.
pub fn rebuild(mut parts: Parts, body: Bytes, method: &Method) -> Response {
    if has_body(method, parts.status) {
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }
    Response::from_parts(parts, Body::from(body))
}

pub fn error_response(error: &PipelineError) -> Response {
    ErrorResponder::for_error(error).into_response()
}
