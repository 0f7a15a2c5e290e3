//! Availability-retry wrapper and the jittered save-retry delay
//! calculation. Two different retry shapes for two different failure
//! modes: transient transport unavailability gets a short fixed delay and
//! a small bound; CAS contention gets a growing jittered back-off and a
//! much higher bound.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::StorageError;

/// Bounds and delays for the availability-retry wrapper around each
/// individual storage call.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityRetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for AvailabilityRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Retries `op` up to `policy.max_retries` times when it fails with a
/// retryable [`StorageError`], sleeping `policy.delay` between attempts.
/// Non-retryable errors propagate on the first occurrence; the last error
/// propagates once retries are exhausted.
pub async fn with_availability_retry<T, F, Fut>(
    policy: &AvailabilityRetryPolicy,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                tracing::debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    error = %err,
                    "storage call failed, retrying after availability delay"
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Save-retry enters "delay mode" once this many CAS conflicts have
/// accumulated on the current save attempt.
pub const DELAY_MODE_THRESHOLD: u32 = 3;

/// Whether delay mode is active for the given retry count.
#[must_use]
pub fn is_delay_mode(retries: u32) -> bool {
    retries >= DELAY_MODE_THRESHOLD
}

/// Draws the jittered back-off for a save retry in delay mode: uniform in
/// `[0, max_delay_per_retry * retries]` microseconds.
#[must_use]
pub fn jittered_save_delay(max_delay_per_retry: Duration, retries: u32) -> Duration {
    let ceiling_micros = max_delay_per_retry
        .as_micros()
        .saturating_mul(u128::from(retries));
    if ceiling_micros == 0 {
        return Duration::ZERO;
    }
    let ceiling_micros = u64::try_from(ceiling_micros).unwrap_or(u64::MAX);
    let micros = rand::rng().random_range(0..=ceiling_micros);
    Duration::from_micros(micros)
}
