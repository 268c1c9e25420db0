//! Adapter for synchronous, in-process validators.
//!
//! A validator linked into the process (for example a loaded library) blocks
//! the calling thread. [`BlockingValidator`] moves each call onto Tokio's
//! blocking pool so it never stalls the event loop.

use async_trait::async_trait;
use std::sync::Arc;

use crate::validator::{
    RequestValidation, ResponseValidation, ValidationResult, Validator, ValidatorError,
};

/// A validator whose calls block until a verdict is ready.
pub trait SyncValidator: Send + Sync + 'static {
    fn validate_request(&self, call: &RequestValidation)
        -> Result<ValidationResult, ValidatorError>;

    fn validate_response(
        &self,
        call: &ResponseValidation,
    ) -> Result<ValidationResult, ValidatorError>;
}

/// Runs a [`SyncValidator`] on the blocking thread pool.
pub struct BlockingValidator<V> {
    inner: Arc<V>,
}

impl<V: SyncValidator> BlockingValidator<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> ValidatorError {
    ValidatorError::Unavailable(format!("validator task failed: {}", e))
}

#[async_trait]
impl<V: SyncValidator> Validator for BlockingValidator<V> {
    async fn validate_request(
        &self,
        call: RequestValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.validate_request(&call))
            .await
            .map_err(join_error)?
    }

    async fn validate_response(
        &self,
        call: ResponseValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.validate_response(&call))
            .await
            .map_err(join_error)?
    }
}
