//! Validator boundary.
//!
//! # Data Flow
//! ```text
//! FilterPipeline stage
//!     → dispatcher.rs (bounded concurrency + deadline)
//!     → Validator impl (http.rs sidecar | blocking.rs in-process)
//!     → ValidationResult { code, payload }
//! ```
//!
//! # Design Decisions
//! - The validator handle is built once at startup and shared read-only
//! - Call inputs are owned and fully materialized; nothing borrows request memory
//! - A declined validation (`code > 0`) is a normal result, not an error
//! - "Validator unavailable" is an error and is never downgraded to a pass

pub mod blocking;
pub mod dispatcher;
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::intercept::headers::HeaderMultiMap;

pub use blocking::BlockingValidator;
pub use dispatcher::ValidationDispatcher;
pub use http::HttpValidator;

/// Verdict returned by the validator.
///
/// `code == 0` continues (payload may carry a replacement body); `code > 0`
/// declines, with `payload` a JSON object holding at least the HTTP status
/// under `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub code: i32,
    #[serde(default)]
    pub payload: String,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            code: 0,
            payload: String::new(),
        }
    }

    pub fn declined(payload: impl Into<String>) -> Self {
        Self {
            code: 1,
            payload: payload.into(),
        }
    }

    pub fn is_declined(&self) -> bool {
        self.code > 0
    }
}

/// Inputs for request-phase validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestValidation {
    pub schema: Arc<str>,
    pub allow_undefined_routes: bool,
    pub method: String,
    pub uri: String,
    pub headers: HeaderMultiMap,
    #[serde(serialize_with = "lossy_text")]
    pub body: Bytes,
}

/// Inputs for response-phase validation, including the captured request for cross-checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseValidation {
    pub schema: Arc<str>,
    pub allow_undefined_routes: bool,
    pub method: String,
    pub uri: String,
    pub request_headers: HeaderMultiMap,
    #[serde(serialize_with = "lossy_text")]
    pub request_body: Bytes,
    pub response_headers: HeaderMultiMap,
    #[serde(serialize_with = "lossy_text")]
    pub response_body: Bytes,
    pub status_code: u16,
}

fn lossy_text<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

/// Failures to obtain a verdict at all.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// The validator could not be reached or loaded.
    #[error("validator unavailable: {0}")]
    Unavailable(String),

    #[error("validator did not answer within {0:?}")]
    Timeout(Duration),

    /// The validator answered with something that is not a verdict.
    #[error("malformed validator response: {0}")]
    Protocol(String),
}

/// External schema validator.
///
/// Implementations must be stateless with respect to individual calls: the
/// same handle serves every concurrent exchange.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate_request(
        &self,
        call: RequestValidation,
    ) -> Result<ValidationResult, ValidatorError>;

    async fn validate_response(
        &self,
        call: ResponseValidation,
    ) -> Result<ValidationResult, ValidatorError>;
}
