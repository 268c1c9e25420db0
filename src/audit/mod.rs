//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! AuditStage (after response validation passes)
//!     → record.rs (AuditLogBuilder: ExchangeState → AuditLogRecord)
//!     → sink.rs (AuditSink::submit: local log + bounded queue)
//!     → sink.rs (AuditShipper: ND-JSON batch POST, retry with backoff)
//!     → remote logging endpoint
//! ```
//!
//! # Design Decisions
//! - Building is pure; only the shipper touches the network
//! - Delivery never affects the client-visible response
//! - At most one record per exchange

pub mod record;
pub mod sink;

pub use record::{AuditLogBuilder, AuditLogRecord};
pub use sink::{AuditShipper, AuditSink, SubmitOutcome};
