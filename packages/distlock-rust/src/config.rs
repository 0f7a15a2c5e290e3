//! Process-wide configuration: key prefix, default identifier source,
//! storage adapter, and retry bounds. These are set once during bootstrap
//! and read by every [`crate::lock::Lock`] handle thereafter -- "configure
//! once, swap atomically, read everywhere."

use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::identifier::{IdentifierSource, UuidIdentifierSource};
use crate::retry::AvailabilityRetryPolicy;
use crate::storage::StorageAdapter;

/// Scalar process-wide bounds, grouped so they can be read and written
/// under one short-lived lock instead of several independent atomics.
#[derive(Debug, Clone, Copy)]
struct RetryBounds {
    wait_retry_interval: Duration,
    max_save_retries: u32,
    max_delay_per_save_retry: Duration,
    availability: AvailabilityRetryPolicy,
}

impl Default for RetryBounds {
    fn default() -> Self {
        Self {
            wait_retry_interval: Duration::from_secs(1),
            max_save_retries: 100,
            max_delay_per_save_retry: Duration::from_micros(1000),
            availability: AvailabilityRetryPolicy::default(),
        }
    }
}

struct LockRuntime {
    prefix: ArcSwap<String>,
    storage: ArcSwapOption<dyn StorageAdapter>,
    identifier_source: ArcSwap<Box<dyn IdentifierSource>>,
    bounds: RwLock<RetryBounds>,
}

static RUNTIME: Lazy<LockRuntime> = Lazy::new(|| LockRuntime {
    prefix: ArcSwap::from_pointee("lock/".to_string()),
    storage: ArcSwapOption::empty(),
    identifier_source: ArcSwap::from_pointee(Box::new(UuidIdentifierSource) as Box<dyn IdentifierSource>),
    bounds: RwLock::new(RetryBounds::default()),
});

/// Sets the process-wide storage adapter. Must be called during bootstrap,
/// before any [`crate::lock::Lock`] handle performs its first operation.
pub fn set_storage_adapter(adapter: Arc<dyn StorageAdapter>) {
    RUNTIME.storage.store(Some(adapter));
}

/// Returns the configured storage adapter, if one has been set.
#[must_use]
pub fn storage_adapter() -> Option<Arc<dyn StorageAdapter>> {
    RUNTIME.storage.load_full()
}

/// Sets the process-wide key prefix (default `"lock/"`).
pub fn set_key_prefix(prefix: impl Into<String>) {
    RUNTIME.prefix.store(Arc::new(prefix.into()));
}

/// Returns the current key prefix.
#[must_use]
pub fn key_prefix() -> Arc<String> {
    RUNTIME.prefix.load_full()
}

/// Sets the source used to generate the process-wide default identifier.
/// Has no effect on a default identifier already cached; call
/// [`crate::identifier::reset_default_identifier`] first if needed.
pub fn set_default_identifier_source(source: Box<dyn IdentifierSource>) {
    RUNTIME.identifier_source.store(Arc::new(source));
}

/// Returns the configured default-identifier source.
#[must_use]
pub fn default_identifier_source() -> Arc<Box<dyn IdentifierSource>> {
    RUNTIME.identifier_source.load_full()
}

/// Sets the poll interval `waitForOtherLocks` sleeps between view refreshes.
pub fn set_wait_retry_interval(interval: Duration) {
    RUNTIME.bounds.write().wait_retry_interval = interval;
}

#[must_use]
pub fn wait_retry_interval() -> Duration {
    RUNTIME.bounds.read().wait_retry_interval
}

/// Sets the maximum number of `SaveLocks` CAS-conflict retries.
pub fn set_max_save_retries(max: u32) {
    RUNTIME.bounds.write().max_save_retries = max;
}

#[must_use]
pub fn max_save_retries() -> u32 {
    RUNTIME.bounds.read().max_save_retries
}

/// Sets the per-retry ceiling for the save-retry jittered back-off.
pub fn set_max_delay_per_save_retry(max: Duration) {
    RUNTIME.bounds.write().max_delay_per_save_retry = max;
}

#[must_use]
pub fn max_delay_per_save_retry() -> Duration {
    RUNTIME.bounds.read().max_delay_per_save_retry
}

/// Sets the availability-retry bound (max retries + fixed delay) applied
/// around every individual storage call.
pub fn set_availability_retry_policy(policy: AvailabilityRetryPolicy) {
    RUNTIME.bounds.write().availability = policy;
}

#[must_use]
pub fn availability_retry_policy() -> AvailabilityRetryPolicy {
    RUNTIME.bounds.read().availability
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        // Reset any mutation from other tests in this process.
        set_key_prefix("lock/");
        set_wait_retry_interval(Duration::from_secs(1));
        set_max_save_retries(100);
        set_max_delay_per_save_retry(Duration::from_micros(1000));
        set_availability_retry_policy(AvailabilityRetryPolicy::default());

        assert_eq!(key_prefix().as_str(), "lock/");
        assert_eq!(wait_retry_interval(), Duration::from_secs(1));
        assert_eq!(max_save_retries(), 100);
        assert_eq!(max_delay_per_save_retry(), Duration::from_micros(1000));
        assert_eq!(availability_retry_policy().max_retries, 3);
        assert_eq!(availability_retry_policy().delay, Duration::from_secs(1));
    }

    #[test]
    fn prefix_setter_is_visible_to_subsequent_reads() {
        set_key_prefix("test-prefix/");
        assert_eq!(key_prefix().as_str(), "test-prefix/");
        set_key_prefix("lock/");
    }
}
