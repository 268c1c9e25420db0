//! Interception orchestrator.
//!
//! # Responsibilities
//! - Accumulate request and response bodies as chunks arrive
//! - Run the stage chain once per phase, on the terminal chunk only
//! - Decide per exchange: forward, reject, replace or pass through
//!
//! # Design Decisions
//! - Stages are an explicit ordered list; a stage may end its phase early
//! - Hooks are re-entrant: callers feed chunks as they arrive, state lives in
//!   the [`ExchangeState`] they pass in
//! - Once an exchange is finalized every hook is a no-op pass-through
//! - Any error finalizes the exchange before it is returned

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::intercept::chunk::BodyChunk;
use crate::intercept::error::PipelineError;
use crate::intercept::exchange::{ExchangePhase, ExchangeState};
use crate::intercept::headers::HeaderList;
use crate::intercept::responder::SynthesizedResponse;

/// What a stage wants to happen next.
#[derive(Debug)]
pub enum Flow {
    Continue,
    /// Stop the chain and answer the client with this response.
    Respond(SynthesizedResponse),
}

/// One step of the interception chain.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs once the full request body is captured.
    async fn on_request(&self, _exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
        Ok(Flow::Continue)
    }

    /// Runs once the full response body is captured.
    async fn on_response(&self, _exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
        Ok(Flow::Continue)
    }
}

/// Outcome of feeding request body chunks.
#[derive(Debug)]
pub enum RequestVerdict {
    /// More chunks are needed.
    Pending,
    /// Send this body upstream.
    Forward(Bytes),
    /// Do not contact the upstream; answer with this response.
    Reject(SynthesizedResponse),
    /// Exchange already finalized; leave the data alone.
    PassThrough,
}

/// Outcome of feeding response body chunks.
#[derive(Debug)]
pub enum ResponseVerdict {
    Pending,
    /// Send the captured upstream body to the client unchanged.
    Release(Bytes),
    /// Send this response instead of the upstream one.
    Replace(SynthesizedResponse),
    PassThrough,
}

/// Ordered chain of [`Stage`]s shared by every exchange.
#[derive(Clone, Default)]
pub struct FilterPipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in insertion order.
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn on_request_headers(&self, exchange: &mut ExchangeState, headers: HeaderList) {
        if exchange.is_done() {
            return;
        }
        exchange.capture_request_headers(headers);
    }

    pub async fn on_request_body(
        &self,
        exchange: &mut ExchangeState,
        chunks: &[BodyChunk],
    ) -> Result<RequestVerdict, PipelineError> {
        if exchange.is_done() || exchange.phase() != ExchangePhase::CapturingRequest {
            return Ok(RequestVerdict::PassThrough);
        }

        let appended = match exchange.request_body_mut().append(chunks) {
            Ok(appended) => appended,
            Err(e) => return Err(fail(exchange, e.into())),
        };
        if !appended.terminal {
            return Ok(RequestVerdict::Pending);
        }

        tracing::debug!(
            exchange_id = %exchange.id(),
            bytes = exchange.request_body().len(),
            "Request body captured"
        );

        for stage in &self.stages {
            match stage.on_request(exchange).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Respond(response)) => {
                    tracing::debug!(
                        exchange_id = %exchange.id(),
                        stage = stage.name(),
                        status = response.status.as_u16(),
                        "Request rejected"
                    );
                    if exchange.phase() == ExchangePhase::CapturingRequest {
                        exchange.reject_request(String::from_utf8_lossy(&response.body).into_owned());
                    }
                    return Ok(RequestVerdict::Reject(response));
                }
                Err(e) => return Err(fail(exchange, e)),
            }
        }

        exchange.accept_request();
        Ok(RequestVerdict::Forward(exchange.upstream_body()))
    }

    pub fn on_response_headers(&self, exchange: &mut ExchangeState, status: u16, headers: HeaderList) {
        if exchange.is_done() {
            return;
        }
        exchange.capture_response(status, headers);
    }

    pub async fn on_response_body(
        &self,
        exchange: &mut ExchangeState,
        chunks: &[BodyChunk],
    ) -> Result<ResponseVerdict, PipelineError> {
        if exchange.is_done() {
            return Ok(ResponseVerdict::PassThrough);
        }

        let appended = match exchange.response_body_mut().append(chunks) {
            Ok(appended) => appended,
            Err(e) => return Err(fail(exchange, PipelineError::ResponseBody(e))),
        };
        if !appended.terminal {
            return Ok(ResponseVerdict::Pending);
        }

        for stage in &self.stages {
            match stage.on_response(exchange).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Respond(response)) => {
                    exchange.finalize();
                    return Ok(ResponseVerdict::Replace(response));
                }
                Err(e) => return Err(fail(exchange, e)),
            }
        }

        exchange.finalize();
        Ok(ResponseVerdict::Release(exchange.response_body().to_bytes()))
    }
}

fn fail(exchange: &mut ExchangeState, error: PipelineError) -> PipelineError {
    tracing::warn!(
        exchange_id = %exchange.id(),
        phase = exchange.phase().as_str(),
        error = %error,
        "Exchange failed"
    );
    exchange.finalize();
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::intercept::chunk::AccumulateError;
    use crate::intercept::exchange::RequestMeta;
    use crate::intercept::responder::ErrorResponder;

    #[derive(Default)]
    struct Counting {
        requests: AtomicUsize,
        responses: AtomicUsize,
    }

    #[async_trait]
    impl Stage for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn on_request(&self, _exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }

        async fn on_response(&self, _exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
            self.responses.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }
    }

    struct Refuse;

    #[async_trait]
    impl Stage for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }

        async fn on_request(&self, exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
            let payload = r#"{"code":403}"#.to_string();
            let response = ErrorResponder::synthesize(&payload);
            exchange.reject_request(payload);
            Ok(Flow::Respond(response))
        }
    }

    /// Answers without touching the exchange.
    struct Teapot;

    #[async_trait]
    impl Stage for Teapot {
        fn name(&self) -> &'static str {
            "teapot"
        }

        async fn on_request(&self, _exchange: &mut ExchangeState) -> Result<Flow, PipelineError> {
            Ok(Flow::Respond(ErrorResponder::synthesize(r#"{"code":418}"#)))
        }
    }

    fn exchange() -> ExchangeState {
        ExchangeState::new(RequestMeta {
            method: "POST".into(),
            target: "/".into(),
            ..RequestMeta::default()
        })
    }

    #[tokio::test]
    async fn test_stages_run_on_terminal_chunk_only() {
        let counting = Arc::new(Counting::default());
        let pipeline = FilterPipeline::new().with_stage(counting.clone());
        let mut state = exchange();

        let verdict = pipeline
            .on_request_body(&mut state, &[BodyChunk::data("ab")])
            .await
            .unwrap();
        assert!(matches!(verdict, RequestVerdict::Pending));
        assert_eq!(counting.requests.load(Ordering::SeqCst), 0);

        let verdict = pipeline
            .on_request_body(&mut state, &[BodyChunk::data("cd"), BodyChunk::end()])
            .await
            .unwrap();
        assert!(matches!(verdict, RequestVerdict::Forward(body) if body == "abcd"));
        assert_eq!(counting.requests.load(Ordering::SeqCst), 1);
        assert_eq!(state.phase(), ExchangePhase::RequestAccepted);
    }

    #[tokio::test]
    async fn test_split_delivery_matches_single_delivery() {
        let pipeline = FilterPipeline::new();

        let mut whole = exchange();
        pipeline
            .on_request_body(&mut whole, &[BodyChunk::terminal("hello world")])
            .await
            .unwrap();

        let mut split = exchange();
        for part in ["he", "llo", " ", "wor"] {
            pipeline
                .on_request_body(&mut split, &[BodyChunk::data(part)])
                .await
                .unwrap();
        }
        pipeline
            .on_request_body(&mut split, &[BodyChunk::terminal("ld")])
            .await
            .unwrap();

        assert_eq!(whole.request_body().as_bytes(), split.request_body().as_bytes());
    }

    #[tokio::test]
    async fn test_rejection_stops_chain() {
        let counting = Arc::new(Counting::default());
        let pipeline = FilterPipeline::new()
            .with_stage(Arc::new(Refuse))
            .with_stage(counting.clone());
        let mut state = exchange();

        let verdict = pipeline
            .on_request_body(&mut state, &[BodyChunk::end()])
            .await
            .unwrap();
        match verdict {
            RequestVerdict::Reject(response) => assert_eq!(response.status.as_u16(), 403),
            other => panic!("unexpected verdict {:?}", other),
        }
        assert_eq!(counting.requests.load(Ordering::SeqCst), 0);
        assert_eq!(state.phase(), ExchangePhase::RequestRejected);
        assert!(!state.is_done());
    }

    #[tokio::test]
    async fn test_finalized_exchange_passes_through() {
        let counting = Arc::new(Counting::default());
        let pipeline = FilterPipeline::new().with_stage(counting.clone());
        let mut state = exchange();

        pipeline
            .on_request_body(&mut state, &[BodyChunk::end()])
            .await
            .unwrap();
        pipeline.on_response_headers(&mut state, 200, HeaderList::new());
        let verdict = pipeline
            .on_response_body(&mut state, &[BodyChunk::terminal("ok")])
            .await
            .unwrap();
        assert!(matches!(verdict, ResponseVerdict::Release(body) if body == "ok"));
        assert!(state.is_done());

        let again = pipeline
            .on_response_body(&mut state, &[BodyChunk::terminal("more")])
            .await
            .unwrap();
        assert!(matches!(again, ResponseVerdict::PassThrough));
        assert_eq!(counting.responses.load(Ordering::SeqCst), 1);
        assert_eq!(state.response_body().as_bytes(), b"ok");
    }

    #[tokio::test]
    async fn test_body_limit_finalizes() {
        let pipeline = FilterPipeline::new();
        let mut state = ExchangeState::with_limit(RequestMeta::default(), 4);

        let err = pipeline
            .on_request_body(&mut state, &[BodyChunk::terminal("too long")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Body(AccumulateError::LimitExceeded { limit: 4 })
        ));
        assert!(state.is_done());
    }

    #[tokio::test]
    async fn test_rejection_marks_exchange_without_stage_help() {
        let counting = Arc::new(Counting::default());
        let pipeline = FilterPipeline::new()
            .with_stage(Arc::new(Teapot))
            .with_stage(counting.clone());
        let mut state = exchange();

        let verdict = pipeline
            .on_request_body(&mut state, &[BodyChunk::end()])
            .await
            .unwrap();
        assert!(matches!(verdict, RequestVerdict::Reject(ref r) if r.status.as_u16() == 418));
        assert_eq!(state.phase(), ExchangePhase::RequestRejected);
        assert!(state.bypass_response_validation());
        assert_eq!(state.pending_error(), Some(r#"{"code":418}"#));

        // Re-entry does not run the chain again.
        let again = pipeline
            .on_request_body(&mut state, &[BodyChunk::end()])
            .await
            .unwrap();
        assert!(matches!(again, RequestVerdict::PassThrough));
        assert_eq!(counting.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_response_body_limit_is_upstream_failure() {
        let pipeline = FilterPipeline::new();
        let mut state = ExchangeState::with_limit(RequestMeta::default(), 4);

        pipeline
            .on_request_body(&mut state, &[BodyChunk::end()])
            .await
            .unwrap();
        pipeline.on_response_headers(&mut state, 200, HeaderList::new());
        let err = pipeline
            .on_response_body(&mut state, &[BodyChunk::terminal("far too long")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ResponseBody(AccumulateError::LimitExceeded { limit: 4 })
        ));
        assert_eq!(err.status().as_u16(), 502);
        assert!(state.is_done());
    }
}
