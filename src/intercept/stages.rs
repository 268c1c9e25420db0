//! Standard interception stages.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::audit::{AuditLogBuilder, AuditSink};
use crate::intercept::error::PipelineError;
use crate::intercept::exchange::ExchangeState;
use crate::intercept::pipeline::{FilterPipeline, Flow, Stage};
use crate::intercept::responder::ErrorResponder;
use crate::observability::metrics;
use crate::validator::{RequestValidation, ResponseValidation, ValidationDispatcher};

/// Schema and flags forwarded to every validator call.
#[derive(Debug, Clone)]
pub struct ValidationScope {
    pub schema: Arc<str>,
    pub allow_undefined_routes: bool,
}

impl FilterPipeline {
    /// Request validation, response validation, then audit.
    pub fn standard(
        dispatcher: ValidationDispatcher,
        scope: ValidationScope,
        sink: AuditSink,
    ) -> Self {
        FilterPipeline::new()
            .with_stage(Arc::new(RequestValidationStage::new(
                dispatcher.clone(),
                scope.clone(),
            )))
            .with_stage(Arc::new(ResponseValidationStage::new(dispatcher, scope)))
            .with_stage(Arc::new(AuditStage::new(sink)))
    }
}

/// Validates the captured request; a decline rejects the exchange.
pub struct RequestValidationStage {
    dispatcher: ValidationDispatcher,
    scope: ValidationScope,
}

impl RequestValidationStage {
    pub fn new(dispatcher: ValidationDispatcher, scope: ValidationScope) -> Self {
        Self { dispatcher, scope }
    }
}

#[async_trait]
impl Stage for RequestValidationStage {
    fn name(&self) -> &'static str {
        "request_validation"
    }

    async fn on_request(&self, exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
        let meta = exchange.meta();
        let call = RequestValidation {
            schema: self.scope.schema.clone(),
            allow_undefined_routes: self.scope.allow_undefined_routes,
            method: meta.method.clone(),
            uri: meta.target.clone(),
            headers: exchange
                .request_headers()
                .map(|h| h.to_multimap())
                .unwrap_or_default(),
            body: exchange.request_body().to_bytes(),
        };

        let result = self.dispatcher.validate_request(call).await?;
        if result.is_declined() {
            tracing::info!(
                exchange_id = %exchange.id(),
                code = result.code,
                "Request declined by validator"
            );
            let response = ErrorResponder::synthesize(&result.payload);
            exchange.reject_request(result.payload);
            return Ok(Flow::Respond(response));
        }

        if !result.payload.is_empty() {
            exchange.rewrite_upstream_body(Bytes::from(result.payload));
        }
        Ok(Flow::Continue)
    }
}

/// Validates the captured response, or replays the request-phase error.
pub struct ResponseValidationStage {
    dispatcher: ValidationDispatcher,
    scope: ValidationScope,
}

impl ResponseValidationStage {
    pub fn new(dispatcher: ValidationDispatcher, scope: ValidationScope) -> Self {
        Self { dispatcher, scope }
    }
}

#[async_trait]
impl Stage for ResponseValidationStage {
    fn name(&self) -> &'static str {
        "response_validation"
    }

    async fn on_response(&self, exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
        if exchange.bypass_response_validation() {
            metrics::record_validation_outcome("response", "bypassed");
            let payload = exchange.pending_error().unwrap_or_default();
            return Ok(Flow::Respond(ErrorResponder::synthesize(payload)));
        }

        let meta = exchange.meta();
        let call = ResponseValidation {
            schema: self.scope.schema.clone(),
            allow_undefined_routes: self.scope.allow_undefined_routes,
            method: meta.method.clone(),
            uri: meta.target.clone(),
            request_headers: exchange
                .request_headers()
                .map(|h| h.to_multimap())
                .unwrap_or_default(),
            request_body: exchange.request_body().to_bytes(),
            response_headers: exchange
                .response_headers()
                .map(|h| h.to_multimap())
                .unwrap_or_default(),
            response_body: exchange.response_body().to_bytes(),
            status_code: exchange.status_code().unwrap_or_default(),
        };

        let result = self.dispatcher.validate_response(call).await?;
        if result.is_declined() {
            tracing::info!(
                exchange_id = %exchange.id(),
                code = result.code,
                "Response declined by validator"
            );
            return Ok(Flow::Respond(ErrorResponder::synthesize(&result.payload)));
        }
        Ok(Flow::Continue)
    }
}

/// Emits one audit record for an exchange whose response is released.
pub struct AuditStage {
    sink: AuditSink,
}

impl AuditStage {
    pub fn new(sink: AuditSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Stage for AuditStage {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn on_response(&self, exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
        match AuditLogBuilder::build(exchange) {
            Ok(record) => {
                self.sink.submit(&record);
            }
            Err(e) => {
                tracing::warn!(exchange_id = %exchange.id(), error = %e, "Skipping audit record");
            }
        }
        Ok(Flow::Continue)
    }
}
