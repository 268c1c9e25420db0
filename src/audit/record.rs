//! Audit log record construction.
//!
//! A record describes one completed exchange: request line, both header
//! multimaps, both bodies, status and timing. Building is pure; delivery
//! lives in `sink.rs`.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::intercept::exchange::ExchangeState;
use crate::intercept::headers::HeaderMultiMap;

pub const RECORD_VERSION: &str = "1.0.0-alpha";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRecord {
    pub version: &'static str,
    /// Epoch milliseconds when the record was built.
    pub date_created: u64,
    /// Exchange duration in milliseconds.
    pub execution_time: u64,
    pub request: AuditRequest,
    pub response: AuditResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub ip: String,
    pub http_protocol: String,
    pub uri: String,
    pub resource: String,
    pub method: String,
    pub headers: HeaderMultiMap,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub status_code: u16,
    pub headers: HeaderMultiMap,
    pub body: String,
}

impl AuditLogRecord {
    /// One line of an ND-JSON batch.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Refusal to build a partial record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("request headers not captured")]
    MissingRequestHeaders,
    #[error("response headers not captured")]
    MissingResponseHeaders,
    #[error("status code not captured")]
    MissingStatus,
}

pub struct AuditLogBuilder;

impl AuditLogBuilder {
    /// Build a record stamped with the current time.
    pub fn build(exchange: &ExchangeState) -> Result<AuditLogRecord, BuildError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self::build_at(exchange, now, exchange.elapsed().as_millis() as u64)
    }

    /// Build a record with explicit timestamps. Same state, same record.
    pub fn build_at(
        exchange: &ExchangeState,
        date_created: u64,
        execution_time: u64,
    ) -> Result<AuditLogRecord, BuildError> {
        let request_headers = exchange
            .request_headers()
            .ok_or(BuildError::MissingRequestHeaders)?;
        let response_headers = exchange
            .response_headers()
            .ok_or(BuildError::MissingResponseHeaders)?;
        let status_code = exchange.status_code().ok_or(BuildError::MissingStatus)?;
        let meta = exchange.meta();

        Ok(AuditLogRecord {
            version: RECORD_VERSION,
            date_created,
            execution_time,
            request: AuditRequest {
                ip: meta.ip.clone(),
                http_protocol: meta.http_protocol.clone(),
                uri: meta.uri(),
                resource: meta.resource().to_string(),
                method: meta.method.clone(),
                headers: request_headers.to_multimap(),
                body: exchange.request_body().to_string_lossy(),
            },
            response: AuditResponse {
                status_code,
                headers: response_headers.to_multimap(),
                body: exchange.response_body().to_string_lossy(),
            },
        })
    }
}
