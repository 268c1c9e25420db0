//! Bounded, deadline-guarded dispatch to the shared validator.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::validator::{
    RequestValidation, ResponseValidation, ValidationResult, Validator, ValidatorError,
};

/// Front door to the process-wide validator.
///
/// At most `max_concurrency` calls are in flight; waiting for a slot counts
/// against the same deadline as the call itself. A call that misses its
/// deadline is dropped, which cancels it.
#[derive(Clone)]
pub struct ValidationDispatcher {
    validator: Arc<dyn Validator>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ValidationDispatcher {
    pub fn new(validator: Arc<dyn Validator>, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            validator,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn validate_request(
        &self,
        call: RequestValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        let start = Instant::now();
        let validator = self.validator.clone();
        let result = self
            .dispatch(async move { validator.validate_request(call).await })
            .await;
        metrics::record_validation("request", &result, start);
        result
    }

    pub async fn validate_response(
        &self,
        call: ResponseValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        let start = Instant::now();
        let validator = self.validator.clone();
        let result = self
            .dispatch(async move { validator.validate_response(call).await })
            .await;
        metrics::record_validation("response", &result, start);
        result
    }

    async fn dispatch<F>(&self, call: F) -> Result<ValidationResult, ValidatorError>
    where
        F: std::future::Future<Output = Result<ValidationResult, ValidatorError>>,
    {
        let permits = self.permits.clone();
        let guarded = async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ValidatorError::Unavailable("validator pool closed".into()))?;
            call.await
        };

        match with_deadline(self.timeout, guarded).await {
            Ok(result) => result,
            Err(_) => Err(ValidatorError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::intercept::headers::HeaderList;

    struct SlowValidator {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowValidator {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        async fn run(&self) -> Result<ValidationResult, ValidatorError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ValidationResult::valid())
        }
    }

    #[async_trait]
    impl Validator for SlowValidator {
        async fn validate_request(
            &self,
            _call: RequestValidation,
        ) -> Result<ValidationResult, ValidatorError> {
            self.run().await
        }

        async fn validate_response(
            &self,
            _call: ResponseValidation,
        ) -> Result<ValidationResult, ValidatorError> {
            self.run().await
        }
    }

    fn request_call() -> RequestValidation {
        RequestValidation {
            schema: Arc::from(""),
            allow_undefined_routes: false,
            method: "GET".into(),
            uri: "/".into(),
            headers: HeaderList::new().to_multimap(),
            body: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_times_out_slow_validator() {
        let validator = Arc::new(SlowValidator::new(Duration::from_millis(500)));
        let dispatcher = ValidationDispatcher::new(validator, 4, Duration::from_millis(50));

        let err = dispatcher.validate_request(request_call()).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let validator = Arc::new(SlowValidator::new(Duration::from_millis(30)));
        let dispatcher =
            ValidationDispatcher::new(validator.clone(), 2, Duration::from_secs(5));

        let calls = (0..6).map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.validate_request(request_call()).await })
        });
        for call in calls.collect::<Vec<_>>() {
            assert!(call.await.unwrap().is_ok());
        }

        assert!(validator.peak.load(Ordering::SeqCst) <= 2);
    }
}
