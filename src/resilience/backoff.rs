//! Retry delays for audit delivery.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// capped at `max_ms`, plus up to 10% jitter. Attempt 0 waits nothing.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let spread = capped / 10;
    let jitter = if spread > 0 {
        rand::thread_rng().gen_range(0..=spread)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_ms,
            max_ms,
        }
    }

    /// Delay to wait after failed attempt `attempt`, or `None` when attempts are used up.
    pub fn after_failure(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(calculate_backoff(attempt, self.base_ms, self.max_ms))
    }
}
