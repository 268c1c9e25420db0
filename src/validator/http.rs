//! Validator sidecar client.
//!
//! The schema validator runs as a separate service. Each phase is one JSON
//! `POST`; the answer is a [`ValidationResult`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::validator::{
    RequestValidation, ResponseValidation, ValidationResult, Validator, ValidatorError,
};

const REQUEST_PATH: &str = "validate/request";
const RESPONSE_PATH: &str = "validate/response";

/// Long-lived client for a validator reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpValidator {
    client: Client,
    request_url: Url,
    response_url: Url,
}

impl HttpValidator {
    /// Build the client once; `base` is the sidecar root, e.g. `http://127.0.0.1:7070`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ValidatorError> {
        let mut base = Url::parse(base)
            .map_err(|e| ValidatorError::Unavailable(format!("invalid validator url: {}", e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |path: &str| {
            base.join(path)
                .map_err(|e| ValidatorError::Unavailable(format!("invalid validator url: {}", e)))
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            request_url: join(REQUEST_PATH)?,
            response_url: join(RESPONSE_PATH)?,
        })
    }

    pub fn request_url(&self) -> &Url {
        &self.request_url
    }

    pub fn response_url(&self) -> &Url {
        &self.response_url
    }

    async fn call<T: Serialize + Sync>(
        &self,
        url: &Url,
        body: &T,
    ) -> Result<ValidationResult, ValidatorError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ValidatorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ValidatorError::Unavailable(format!(
                "validator answered {}",
                status
            )));
        }

        response
            .json::<ValidationResult>()
            .await
            .map_err(|e| ValidatorError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl Validator for HttpValidator {
    async fn validate_request(
        &self,
        call: RequestValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        self.call(&self.request_url, &call).await
    }

    async fn validate_response(
        &self,
        call: ResponseValidation,
    ) -> Result<ValidationResult, ValidatorError> {
        self.call(&self.response_url, &call).await
    }
}
