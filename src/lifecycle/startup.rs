//! Startup orchestration.
//!
//! # Responsibilities
//! - Read the API schema once
//! - Build the process-wide validator client and dispatcher
//! - Build the audit sink and spawn its shipper
//! - Assemble the standard FilterPipeline
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - An unreadable schema never degrades to "always pass"
//! - Subsystems initialize in order, not concurrently

use std::fs;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::audit::sink::AuditError;
use crate::audit::AuditSink;
use crate::config::ProxyConfig;
use crate::intercept::{FilterPipeline, ValidationScope};
use crate::lifecycle::shutdown::Shutdown;
use crate::validator::{HttpValidator, ValidationDispatcher, Validator, ValidatorError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read API schema '{path}': {source}")]
    Schema {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create validator client: {0}")]
    Validator(#[from] ValidatorError),

    #[error("failed to create audit sink: {0}")]
    Audit(#[from] AuditError),
}

/// Everything the server needs that outlives a single request.
pub struct Bootstrapped {
    pub pipeline: FilterPipeline,
    /// Audit shipper task, when remote delivery is enabled.
    pub shipper: Option<JoinHandle<()>>,
}

/// Schema text from `firetail.spec_path`; empty when none is configured.
pub fn load_schema(config: &ProxyConfig) -> Result<Arc<str>, StartupError> {
    match &config.firetail.spec_path {
        Some(path) => {
            let schema = fs::read_to_string(path).map_err(|source| StartupError::Schema {
                path: path.clone(),
                source,
            })?;
            tracing::info!(path = %path, bytes = schema.len(), "API schema loaded");
            Ok(Arc::from(schema))
        }
        None => {
            tracing::warn!("No firetail.spec_path configured, validator receives an empty schema");
            Ok(Arc::from(""))
        }
    }
}

/// Build the pipeline around the HTTP validator sidecar.
pub fn bootstrap(config: &ProxyConfig, shutdown: &Shutdown) -> Result<Bootstrapped, StartupError> {
    let validator = HttpValidator::new(&config.validator.url, config.validator.timeout())?;
    tracing::info!(url = %validator.request_url(), "Validator client ready");
    bootstrap_with(config, Arc::new(validator), shutdown)
}

/// Build the pipeline around any validator.
pub fn bootstrap_with(
    config: &ProxyConfig,
    validator: Arc<dyn Validator>,
    shutdown: &Shutdown,
) -> Result<Bootstrapped, StartupError> {
    let scope = ValidationScope {
        schema: load_schema(config)?,
        allow_undefined_routes: config.firetail.allow_undefined_routes,
    };
    let dispatcher = ValidationDispatcher::new(
        validator,
        config.validator.max_concurrency,
        config.validator.timeout(),
    );

    let (sink, shipper) = AuditSink::new(&config.firetail, &config.audit)?;
    let shipper = shipper.map(|shipper| tokio::spawn(shipper.run(shutdown.subscribe())));

    let pipeline = FilterPipeline::standard(dispatcher, scope, sink);
    tracing::info!(stages = ?pipeline.stage_names(), "Filter pipeline ready");

    Ok(Bootstrapped { pipeline, shipper })
}
