//! Request-scoped pipeline failures.

use axum::http::StatusCode;
use thiserror::Error;

use crate::intercept::chunk::AccumulateError;
use crate::validator::ValidatorError;

/// A failure that ends one exchange. Never affects other requests.
///
/// A declined validation is not an error; it travels as a verdict.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Body(#[from] AccumulateError),

    /// The upstream response could not be buffered.
    #[error("upstream response body: {0}")]
    ResponseBody(#[source] AccumulateError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error("client aborted while sending the body: {0}")]
    ClientAborted(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl PipelineError {
    /// Status code sent to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Body(AccumulateError::LimitExceeded { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            PipelineError::Body(AccumulateError::Allocation { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::ResponseBody(AccumulateError::LimitExceeded { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::ResponseBody(AccumulateError::Allocation { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::Validator(ValidatorError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Validator(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::ClientAborted(_) => StatusCode::BAD_REQUEST,
            PipelineError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Body(AccumulateError::LimitExceeded { .. }) => "body_too_large",
            PipelineError::Body(AccumulateError::Allocation { .. }) => "allocation",
            PipelineError::ResponseBody(AccumulateError::LimitExceeded { .. }) => {
                "response_too_large"
            }
            PipelineError::ResponseBody(AccumulateError::Allocation { .. }) => "allocation",
            PipelineError::Validator(ValidatorError::Timeout(_)) => "validator_timeout",
            PipelineError::Validator(ValidatorError::Protocol(_)) => "validator_protocol",
            PipelineError::Validator(ValidatorError::Unavailable(_)) => "validator_unavailable",
            PipelineError::ClientAborted(_) => "client_aborted",
            PipelineError::Upstream(_) => "upstream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let too_large = PipelineError::from(AccumulateError::LimitExceeded { limit: 1 });
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let upstream_too_large =
            PipelineError::ResponseBody(AccumulateError::LimitExceeded { limit: 1 });
        assert_eq!(upstream_too_large.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream_too_large.kind(), "response_too_large");

        let oom = PipelineError::from(AccumulateError::Allocation { requested: 1 });
        assert_eq!(oom.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let unavailable = PipelineError::from(ValidatorError::Unavailable("gone".into()));
        assert_eq!(unavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(unavailable.kind(), "validator_unavailable");

        let timeout = PipelineError::from(ValidatorError::Timeout(Duration::from_secs(1)));
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        assert_eq!(
            PipelineError::Upstream("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
