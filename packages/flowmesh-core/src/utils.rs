//! General utilities shared across the application.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns the current Unix timestamp as fractional seconds.
///
/// Used for metrics snapshot timestamps, which the dashboard plots on a
/// wall-clock axis.
#[must_use]
pub fn now_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Returns monotonic seconds elapsed since the first call in this process.
///
/// Node `started_at` stamps use this instead of wall time so they are
/// unaffected by clock adjustments.
#[must_use]
pub fn monotonic_secs() -> f64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_recent() {
        // Anything after 2020-01-01 counts as a sane clock.
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn monotonic_secs_is_monotonic() {
        let a = monotonic_secs();
        let b = monotonic_secs();
        assert!(b >= a);
    }
}
