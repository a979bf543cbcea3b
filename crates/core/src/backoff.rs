//! Exponential backoff policy for the retry executor.
//!
//! `delay(attempt) = min(base * multiplier^(attempt - 1), max)`,
//! optionally perturbed by ±25% uniform jitter and floored at `base`
//! so synchronized retry storms spread out without ever retrying
//! faster than configured.

use rand::Rng;

use crate::classify::ErrorKind;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay before the first retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default cap on a single backoff delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Default geometric growth factor between attempts.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter fraction applied when jitter is enabled (±25%).
const JITTER_FRACTION: f64 = 0.25;

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for the retry executor.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt. An operation runs at
    /// most `max_retries + 1` times.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
    /// Error kinds eligible for retry. Anything else fails immediately
    /// regardless of remaining attempts.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_enabled: true,
            retryable_kinds: vec![
                ErrorKind::Transient,
                ErrorKind::RateLimited,
                ErrorKind::Resource,
            ],
        }
    }
}

impl RetryConfig {
    /// Whether an error of this kind is eligible for retry at all.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }
}

// ---------------------------------------------------------------------------
// Delay computation
// ---------------------------------------------------------------------------

/// Compute the backoff delay in milliseconds before retry `attempt`
/// (1-based: attempt 1 is the first retry).
///
/// With jitter disabled this is exactly
/// `min(base * multiplier^(attempt - 1), max)`. With jitter enabled the
/// result is perturbed by ±25% and then floored at `base_delay_ms`.
pub fn delay_for_attempt(attempt: u32, config: &RetryConfig) -> u64 {
    let attempt = attempt.max(1);
    let exponent = (attempt - 1) as i32;
    let raw = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = raw.min(config.max_delay_ms as f64);

    if !config.jitter_enabled {
        return capped as u64;
    }

    let mut rng = rand::rng();
    let factor = 1.0 + rng.random_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let jittered = capped * factor;
    (jittered.max(config.base_delay_ms as f64)) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
