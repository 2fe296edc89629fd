use std::time::Duration;

/// Assume-role attempts before the last error is returned.
pub const MAX_ASSUME_ATTEMPTS: u32 = 10;
/// Delay after the first failed attempt.
pub const BACKOFF_BASE: Duration = Duration::from_secs(5);
/// Upper bound on any single delay.
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Delay after failed attempt number `attempt` (1-based): `min(max, base * 2^(attempt-1))`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30);
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(BACKOFF_MAX)
}
