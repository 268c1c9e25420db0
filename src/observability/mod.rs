//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, tracing spans per request)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Audit records use their own target, `firetail::audit`
//! ```
//!
//! # Design Decisions
//! - JSON output when shipped to an aggregator, pretty output locally
//! - Request ID and exchange ID are fields on every exchange event
//! - Validation outcomes are counted per phase (request, response)

pub mod logging;
pub mod metrics;
