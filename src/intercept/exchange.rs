//! Per-request exchange state.
//!
//! One [`ExchangeState`] exists per client request. It is owned by whoever
//! drives that request's pipeline and is never shared across requests, so it
//! needs no locking.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::intercept::chunk::ChunkAccumulator;
use crate::intercept::headers::HeaderList;

/// Identity of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ExchangeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an exchange is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    CapturingRequest,
    /// Request validated and forwarded upstream.
    RequestAccepted,
    /// Request declined; a synthesized error replaces the upstream response.
    RequestRejected,
    CapturingResponse,
    Finalized,
}

impl ExchangePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangePhase::CapturingRequest => "capturing_request",
            ExchangePhase::RequestAccepted => "request_accepted",
            ExchangePhase::RequestRejected => "request_rejected",
            ExchangePhase::CapturingResponse => "capturing_response",
            ExchangePhase::Finalized => "finalized",
        }
    }
}

/// Request line facts the audit record and validator need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Client address.
    pub ip: String,
    /// e.g. `HTTP/1.1`.
    pub http_protocol: String,
    pub method: String,
    /// Scheme and authority the client addressed, e.g. `http://api.example.com`.
    pub server: String,
    /// Unparsed request target: path plus query.
    pub target: String,
}

impl RequestMeta {
    /// Absolute URI of the request.
    pub fn uri(&self) -> String {
        format!("{}{}", self.server, self.target)
    }

    /// Path without the query string.
    pub fn resource(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }
}

/// Everything captured about one request/response exchange.
#[derive(Debug)]
pub struct ExchangeState {
    id: ExchangeId,
    meta: RequestMeta,
    started: Instant,
    phase: ExchangePhase,

    request_body: ChunkAccumulator,
    response_body: ChunkAccumulator,
    request_headers: Option<HeaderList>,
    response_headers: Option<HeaderList>,
    status_code: Option<u16>,

    /// Body to send upstream when the validator rewrote it.
    upstream_body: Option<Bytes>,

    bypass_response_validation: bool,
    done: bool,
    pending_error: Option<String>,
}

impl ExchangeState {
    pub fn new(meta: RequestMeta) -> Self {
        Self::with_id(ExchangeId::new(), meta, None)
    }

    /// State whose bodies refuse to grow past `max_body_size` bytes.
    pub fn with_limit(meta: RequestMeta, max_body_size: usize) -> Self {
        Self::with_id(ExchangeId::new(), meta, Some(max_body_size))
    }

    pub fn with_id(id: ExchangeId, meta: RequestMeta, max_body_size: Option<usize>) -> Self {
        let accumulator = || match max_body_size {
            Some(limit) => ChunkAccumulator::with_limit(limit),
            None => ChunkAccumulator::new(),
        };

        Self {
            id,
            meta,
            started: Instant::now(),
            phase: ExchangePhase::CapturingRequest,
            request_body: accumulator(),
            response_body: accumulator(),
            request_headers: None,
            response_headers: None,
            status_code: None,
            upstream_body: None,
            bypass_response_validation: false,
            done: false,
            pending_error: None,
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn request_body(&self) -> &ChunkAccumulator {
        &self.request_body
    }

    pub fn response_body(&self) -> &ChunkAccumulator {
        &self.response_body
    }

    pub(crate) fn request_body_mut(&mut self) -> &mut ChunkAccumulator {
        &mut self.request_body
    }

    pub(crate) fn response_body_mut(&mut self) -> &mut ChunkAccumulator {
        &mut self.response_body
    }

    pub fn request_headers(&self) -> Option<&HeaderList> {
        self.request_headers.as_ref()
    }

    pub fn response_headers(&self) -> Option<&HeaderList> {
        self.response_headers.as_ref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn bypass_response_validation(&self) -> bool {
        self.bypass_response_validation
    }

    pub fn pending_error(&self) -> Option<&str> {
        self.pending_error.as_deref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Record the inbound headers. Only the first capture is kept.
    pub fn capture_request_headers(&mut self, headers: HeaderList) -> bool {
        if self.request_headers.is_some() {
            return false;
        }
        self.request_headers = Some(headers);
        true
    }

    /// Record status and outbound headers. Only the first capture is kept.
    pub fn capture_response(&mut self, status: u16, headers: HeaderList) -> bool {
        if self.response_headers.is_some() {
            return false;
        }
        self.status_code = Some(status);
        self.response_headers = Some(headers);
        if matches!(
            self.phase,
            ExchangePhase::RequestAccepted | ExchangePhase::CapturingRequest
        ) {
            self.phase = ExchangePhase::CapturingResponse;
        }
        true
    }

    /// True once both header sets and the status code are captured.
    pub fn is_complete(&self) -> bool {
        self.request_headers.is_some()
            && self.response_headers.is_some()
            && self.status_code.is_some()
    }

    /// Body to forward upstream: the validator's replacement, or the client's original.
    pub fn upstream_body(&self) -> Bytes {
        self.upstream_body
            .clone()
            .unwrap_or_else(|| self.request_body.to_bytes())
    }

    pub(crate) fn rewrite_upstream_body(&mut self, body: Bytes) {
        self.upstream_body = Some(body);
    }

    pub(crate) fn accept_request(&mut self) {
        self.phase = ExchangePhase::RequestAccepted;
    }

    /// Carry the validator's error to the response phase and skip response validation.
    pub(crate) fn reject_request(&mut self, payload: String) {
        self.bypass_response_validation = true;
        self.pending_error = Some(payload);
        self.phase = ExchangePhase::RequestRejected;
    }

    /// No further stage may run for this exchange.
    pub fn finalize(&mut self) {
        self.done = true;
        self.phase = ExchangePhase::Finalized;
    }
}

/// Exchanges keyed by identity, for hosts that deliver callbacks by request id.
#[derive(Debug, Default)]
pub struct ExchangeTable {
    exchanges: HashMap<ExchangeId, ExchangeState>,
}

impl ExchangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing state for `id`, or a fresh one built from `meta`.
    pub fn get_or_create(
        &mut self,
        id: ExchangeId,
        meta: impl FnOnce() -> RequestMeta,
    ) -> &mut ExchangeState {
        self.exchanges
            .entry(id)
            .or_insert_with(|| ExchangeState::with_id(id, meta(), None))
    }

    pub fn get_mut(&mut self, id: &ExchangeId) -> Option<&mut ExchangeState> {
        self.exchanges.get_mut(id)
    }

    /// Drop the state when the request completes or the client goes away.
    pub fn remove(&mut self, id: &ExchangeId) -> Option<ExchangeState> {
        self.exchanges.remove(id)
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
