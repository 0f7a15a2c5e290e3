//! Thin, retryable port over a compare-and-swap capable key-value store.
//! [`StorageAdapter`] is the only interface the lock engine talks to;
//! [`memory`] is the synchronous in-memory test double, [`etcd`] (behind
//! the `etcd` feature) is the production adapter over a real etcd cluster.

pub mod memory;

#[cfg(feature = "etcd")]
pub mod etcd;

use async_trait::async_trait;

pub use crate::error::StorageError;

/// The exact byte string (or absence) a store last reported for a key.
///
/// "Absent" and "present with the empty string" must stay distinguishable:
/// both on the wire and as a CAS witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasValue {
    /// The key holds this exact value.
    Present(String),
    /// The key does not exist in the store.
    Absent,
}

impl CasValue {
    /// The payload as `Option<&str>`, for feeding the lock-set decoder.
    #[must_use]
    pub fn as_payload(&self) -> Option<&str> {
        match self {
            CasValue::Present(v) => Some(v.as_str()),
            CasValue::Absent => None,
        }
    }
}

/// Outcome of a conditional write ([`StorageAdapter::put_if`] /
/// [`StorageAdapter::delete_if`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The witness matched; the write was applied.
    Applied,
    /// The witness did not match. Carries the store's current value when
    /// the caller asked for it (`return_new_on_fail`), `None` otherwise.
    Conflict(Option<CasValue>),
}

impl CasOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied)
    }
}

/// A retryable, three-valued port over a single strongly-consistent
/// key-value store. Implementations translate `witness = Absent` into
/// whatever "create only if missing" primitive the backing store exposes.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Reads the current value for `key`, or [`CasValue::Absent`] if it
    /// does not exist.
    async fn get(&self, key: &str) -> Result<CasValue, StorageError>;

    /// Atomically writes `value` iff the stored value currently equals
    /// `witness`.
    async fn put_if(
        &self,
        key: &str,
        value: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, StorageError>;

    /// Atomically deletes `key` iff the stored value currently equals
    /// `witness`.
    async fn delete_if(
        &self,
        key: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, StorageError>;
}
