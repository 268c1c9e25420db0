//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call leaving the process (validator, audit log endpoint):
//!     → timeouts.rs (enforce a deadline on the call)
//!     → On failure: backoff.rs (delay before the next bounded attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Validator calls are never retried inline; only audit delivery retries
//! - Retries happen off the request path

pub mod backoff;
pub mod timeouts;
