//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap calls that leave the process with a deadline
//! - Cancel operations cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out validator calls return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The wrapped operation did not finish in time.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut` to completion or give up after `deadline`.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}
