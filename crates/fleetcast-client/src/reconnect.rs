//! Exponential backoff with jitter for streaming-channel reconnects.
//!
//! `delay(n) = clamp(base · 2^(n-1), 1s, 15s) × (1 ± 0.3·random)`, base = 1s,
//! cap = 10 attempts. The calculator is pure (injectable jitter) so the
//! reconnect ladder is directly testable without timers.

use std::time::Duration;

pub const BASE: Duration = Duration::from_secs(1);
pub const CAP: Duration = Duration::from_secs(15);
pub const MAX_ATTEMPTS: u32 = 10;
const JITTER_FRACTION: f64 = 0.3;

/// The nominal (pre-jitter) delay before attempt `n` (1-indexed).
fn nominal_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let scaled = BASE.as_secs_f64() * 2f64.powi(exponent as i32);
    Duration::from_secs_f64(scaled.min(CAP.as_secs_f64()))
}

/// The jittered delay before attempt `n`, given a `jitter` sample in
/// `[-1.0, 1.0]` (the caller supplies `rand::random::<f64>() * 2.0 - 1.0`
/// in production; tests supply fixed values to pin the ladder).
pub fn delay_for_attempt(attempt: u32, jitter: f64) -> Duration {
    let nominal = nominal_delay(attempt);
    let factor = 1.0 + JITTER_FRACTION * jitter.clamp(-1.0, 1.0);
    Duration::from_secs_f64((nominal.as_secs_f64() * factor).max(0.0))
}

/// Sample a jitter value in `[-1.0, 1.0]` from the thread RNG.
pub fn sample_jitter() -> f64 {
    rand::random::<f64>() * 2.0 - 1.0
}

/// Whether `attempt` is still within the budget (at most `MAX_ATTEMPTS`).
pub fn within_budget(attempt: u32) -> bool {
    attempt <= MAX_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_roughly_base_delay() {
        let d = delay_for_attempt(1, 0.0);
        assert_eq!(d, Duration::from_secs(1));
    }

    #[test]
    fn delay_doubles_until_the_cap() {
        assert_eq!(delay_for_attempt(2, 0.0), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(3, 0.0), Duration::from_secs(4));
        assert_eq!(delay_for_attempt(4, 0.0), Duration::from_secs(8));
        // 2^4 = 16s would exceed the 15s cap.
        assert_eq!(delay_for_attempt(5, 0.0), Duration::from_secs(15));
        assert_eq!(delay_for_attempt(10, 0.0), Duration::from_secs(15));
    }

    #[test]
    fn jitter_stays_within_thirty_percent() {
        let nominal = nominal_delay(3).as_secs_f64();
        let high = delay_for_attempt(3, 1.0).as_secs_f64();
        let low = delay_for_attempt(3, -1.0).as_secs_f64();
        assert!((high - nominal * 1.3).abs() < 1e-9);
        assert!((low - nominal * 0.7).abs() < 1e-9);
    }

    #[test]
    fn attempt_past_cap_is_out_of_budget() {
        assert!(within_budget(10));
        assert!(!within_budget(11));
    }
}
