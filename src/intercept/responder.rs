//! Synthesized error responses.
//!
//! # Responsibilities
//! - Turn a validator's error payload into a concrete HTTP response
//! - Render internal pipeline failures as JSON error bodies
//!
//! # Design Decisions
//! - The status comes from `payload.code`; 400 when absent or out of range
//! - The body is the raw payload, never re-encoded
//! - Keep-alive is disabled and content-length recomputed on every synthesized response

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::intercept::error::PipelineError;
use crate::intercept::headers::HeaderList;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Status used when the validator's payload names no usable status.
pub const DEFAULT_DECLINE_STATUS: StatusCode = StatusCode::BAD_REQUEST;

/// A response built by the proxy in place of the upstream one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl SynthesizedResponse {
    /// Headers as they will be sent, for capture into the exchange.
    pub fn header_list(&self) -> HeaderList {
        let mut headers = HeaderList::new();
        headers.push(header::CONTENT_TYPE.as_str(), self.content_type);
        headers.push(header::CONTENT_LENGTH.as_str(), self.body.len().to_string());
        headers.push(header::CONNECTION.as_str(), "close");
        headers
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        response
    }
}

/// Builds [`SynthesizedResponse`]s.
pub struct ErrorResponder;

impl ErrorResponder {
    /// Response for a declined validation. `payload` becomes the body verbatim.
    pub fn synthesize(payload: &str) -> SynthesizedResponse {
        SynthesizedResponse {
            status: Self::status_from_payload(payload),
            content_type: JSON_CONTENT_TYPE,
            body: Bytes::copy_from_slice(payload.as_bytes()),
        }
    }

    /// Read `code` from a JSON payload. Accepts a number or a numeric string.
    pub fn status_from_payload(payload: &str) -> StatusCode {
        let code = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => match map.get("code") {
                Some(Value::Number(n)) => n.as_u64(),
                Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
                _ => None,
            },
            _ => None,
        };

        code.filter(|c| (100..=599).contains(c))
            .and_then(|c| StatusCode::from_u16(c as u16).ok())
            .unwrap_or(DEFAULT_DECLINE_STATUS)
    }

    /// Response for an internal failure.
    pub fn for_error(error: &PipelineError) -> SynthesizedResponse {
        let status = error.status();
        let body = json!({
            "code": status.as_u16(),
            "title": status.canonical_reason().unwrap_or("Error"),
            "detail": error.to_string(),
        });

        SynthesizedResponse {
            status,
            content_type: JSON_CONTENT_TYPE,
            body: Bytes::from(body.to_string()),
        }
    }
}
