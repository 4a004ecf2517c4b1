//! Retry policy: exponential backoff with jitter and `Retry-After` honoring
//! (spec §4.3).

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Classifies an HTTP status for retry purposes. `429` and `503`/`504` are
/// retriable server-side backpressure; everything else is terminal.
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 429 | 503 | 504)
}

/// Computes the backoff before attempt `attempt` (1-indexed: the delay
/// before the *second* attempt is `backoff_for(config, 1)`), applying
/// exponential growth, the configured ceiling, and +/-jitter.
pub fn backoff_for(config: &RetryConfig, attempt: u32) -> Duration {
    let base_ms = config.initial_backoff_ms as f64 * config.backoff_factor.powi(attempt as i32 - 1);
    let capped_ms = base_ms.min(config.max_backoff_ms as f64);

    let jitter_span = capped_ms * config.jitter_factor;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    let jittered_ms = (capped_ms + jitter).max(0.0);

    Duration::from_millis(jittered_ms as u64)
}

/// Parses a `Retry-After` header value, which is either a delta-seconds
/// integer or an HTTP-date. Unparseable values are ignored (caller falls
/// back to its own backoff); negative or unreasonably large delays are
/// clamped to `[0, max_retry_after_secs]`.
pub fn parse_retry_after(value: &str, max_retry_after_secs: u64) -> Option<Duration> {
    let trimmed = value.trim();

    if let Ok(secs) = trimmed.parse::<i64>() {
        let clamped = secs.max(0) as u64;
        return Some(Duration::from_secs(clamped.min(max_retry_after_secs)));
    }

    let target = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
    let now = chrono::Utc::now();
    let delta_secs = (target.with_timezone(&chrono::Utc) - now).num_seconds().max(0) as u64;
    Some(Duration::from_secs(delta_secs.min(max_retry_after_secs)))
}
