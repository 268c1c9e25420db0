//! Audit record delivery.
//!
//! # Responsibilities
//! - Hand records off the request path without waiting on the network
//! - Batch queued records into ND-JSON bodies for the logging endpoint
//! - Retry failed deliveries a bounded number of times
//!
//! # Design Decisions
//! - Bounded queue; a full queue drops the record instead of blocking
//! - No API token means no remote delivery; the local sink still works
//! - The shipper drains whatever is queued before it exits on shutdown

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::audit::record::AuditLogRecord;
use crate::config::schema::{AuditConfig, FiretailConfig};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

pub const ND_JSON: &str = "application/nd-json";
pub const API_KEY_HEADER: &str = "x-ft-api-key";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid logs url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build audit http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Remote delivery is disabled; the record went to the local sink at most.
    LocalOnly,
    Dropped,
}

/// Request-path handle for audit records. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditSink {
    queue: Option<mpsc::Sender<String>>,
    local_sink: bool,
    overflow_warned: Arc<AtomicBool>,
}

impl AuditSink {
    /// Build the sink and, when an API token is configured, the shipper that
    /// must be spawned to deliver its records.
    pub fn new(
        firetail: &FiretailConfig,
        audit: &AuditConfig,
    ) -> Result<(Self, Option<AuditShipper>), AuditError> {
        if firetail.api_token.is_empty() {
            tracing::info!("No FireTail API token configured, remote audit delivery disabled");
            return Ok((Self::local_only(audit.local_sink), None));
        }

        let url = Url::parse(&firetail.logs_url).map_err(|source| AuditError::InvalidUrl {
            url: firetail.logs_url.clone(),
            source,
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(audit.request_timeout_secs))
            .build()?;

        let (tx, rx) = mpsc::channel(audit.queue_capacity.max(1));
        let shipper = AuditShipper {
            rx,
            client,
            url,
            api_key: firetail.api_token.clone(),
            max_batch: audit.max_batch.max(1),
            backoff: Backoff::new(audit.max_attempts, audit.base_delay_ms, audit.max_delay_ms),
        };

        let sink = Self {
            queue: Some(tx),
            local_sink: audit.local_sink,
            overflow_warned: Arc::new(AtomicBool::new(false)),
        };
        Ok((sink, Some(shipper)))
    }

    /// Sink without remote delivery.
    pub fn local_only(local_sink: bool) -> Self {
        Self {
            queue: None,
            local_sink,
            overflow_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// Never blocks and never fails the caller.
    pub fn submit(&self, record: &AuditLogRecord) -> SubmitOutcome {
        let line = match record.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize audit record");
                metrics::record_audit("dropped", 1);
                return SubmitOutcome::Dropped;
            }
        };

        if self.local_sink {
            tracing::info!(target: "firetail::audit", record = %line, "Audit record");
        }

        let Some(queue) = &self.queue else {
            return SubmitOutcome::LocalOnly;
        };

        match queue.try_send(line) {
            Ok(()) => {
                metrics::record_audit("queued", 1);
                SubmitOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                metrics::record_audit("dropped", 1);
                if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!("Audit queue full, dropping records");
                }
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                metrics::record_audit("dropped", 1);
                tracing::debug!("Audit shipper stopped, dropping record");
                SubmitOutcome::Dropped
            }
        }
    }
}

/// Background task posting queued records to the logging endpoint.
pub struct AuditShipper {
    rx: mpsc::Receiver<String>,
    client: Client,
    url: Url,
    api_key: String,
    max_batch: usize,
    backoff: Backoff,
}

impl AuditShipper {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(url = %self.url, max_batch = self.max_batch, "Audit shipper starting");

        loop {
            tokio::select! {
                line = self.rx.recv() => match line {
                    Some(line) => {
                        let batch = self.fill_batch(line);
                        self.ship(batch).await;
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::info!(
                        pending = self.pending(),
                        "Audit shipper received shutdown signal, draining queue"
                    );
                    self.rx.close();
                    break;
                }
            }
        }

        while let Some(line) = self.rx.recv().await {
            let batch = self.fill_batch(line);
            self.ship(batch).await;
        }
        tracing::info!("Audit shipper stopped");
    }

    /// Records queued but not yet taken for delivery.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    fn fill_batch(&mut self, first: String) -> Vec<String> {
        let mut batch = vec![first];
        while batch.len() < self.max_batch {
            match self.rx.try_recv() {
                Ok(line) => batch.push(line),
                Err(_) => break,
            }
        }
        batch
    }

    async fn ship(&self, batch: Vec<String>) {
        let count = batch.len() as u64;
        let mut body = batch.join("\n");
        body.push('\n');

        let mut attempt = 1;
        loop {
            match self.post(body.clone()).await {
                Ok(()) => {
                    tracing::debug!(records = count, attempt, "Audit batch delivered");
                    metrics::record_audit("submitted", count);
                    return;
                }
                Err(e) => match self.backoff.after_failure(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            error = %e,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Audit delivery failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!(error = %e, records = count, "Audit delivery failed, dropping batch");
                        metrics::record_audit("failed", count);
                        return;
                    }
                },
            }
        }
    }

    async fn post(&self, body: String) -> Result<(), String> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, ND_JSON)
            .header(API_KEY_HEADER, &self.api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("logging endpoint answered {}", status))
        }
    }
}
