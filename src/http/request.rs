//! Request handling and transformation.
//!
//! # Responsibilities
//! - Read the request ID set by the middleware stack
//! - Extract the request line facts the exchange records
//! - Prepare the request for forwarding to the upstream
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (tower-http, UUID v4)
//! - Original request preserved for capture; modified copy forwarded

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request, Uri, Version};
use bytes::Bytes;
use std::net::SocketAddr;

use crate::http::response::strip_hop_by_hop;
use crate::intercept::{PipelineError, RequestMeta};

pub const X_REQUEST_ID: &str = "x-request-id";

pub fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Request line facts for the exchange.
pub fn request_meta(parts: &Parts, peer: SocketAddr) -> RequestMeta {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    RequestMeta {
        ip: peer.ip().to_string(),
        http_protocol: protocol_name(parts.version).to_string(),
        method: parts.method.to_string(),
        server: format!("http://{}", host),
        target: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    }
}

/// Same path and query, aimed at the upstream.
pub fn upstream_uri(upstream: &str, parts: &Parts) -> Result<Uri, PipelineError> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("http://{}{}", upstream, path_and_query)
        .parse()
        .map_err(|e| PipelineError::Upstream(format!("invalid upstream uri: {}", e)))
}

/// Copy of the client request carrying `body`, without hop-by-hop headers.
pub fn streaming_upstream_request(
    upstream: &str,
    parts: &Parts,
    body: Body,
) -> Result<Request<Body>, PipelineError> {
    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(upstream_uri(upstream, parts)?);

    if let Some(headers) = builder.headers_mut() {
        headers.extend(parts.headers.clone());
        strip_hop_by_hop(headers);
    }

    builder
        .body(body)
        .map_err(|e| PipelineError::Upstream(e.to_string()))
}

/// Copy of the client request carrying the fully captured `body`.
pub fn buffered_upstream_request(
    upstream: &str,
    parts: &Parts,
    body: Bytes,
) -> Result<Request<Body>, PipelineError> {
    let len = body.len();
    let mut request = streaming_upstream_request(upstream, parts, Body::from(body))?;

    let headers = request.headers_mut();
    let had_length = headers.remove(CONTENT_LENGTH).is_some();
    if had_length || len > 0 {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(request)
}
