//! Public error surface for the lock engine and its storage adapters.

/// Errors a [`crate::storage::StorageAdapter`] implementation can raise.
///
/// Partitions into retryable transport failures (handled locally by the
/// availability-retry wrapper) and everything else, which propagates
/// unchanged to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transient transport failure: unavailability, deadline exceeded, or an
    /// unrecognized server-side error. Safe to retry after a short delay.
    #[error("storage temporarily unavailable: {0}")]
    Retryable(String),

    /// Any other failure. Not retried by the availability wrapper.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Whether the availability-retry wrapper should retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Retryable(_))
    }
}

/// Errors raised by [`crate::lock::Lock`] operations.
///
/// `Acquire` returning `false` and `Refresh` returning `false` are not
/// errors -- they are ordinary outcomes (wait timeout elapsed, or
/// contention appeared) that the caller is expected to handle without
/// treating them as exceptional.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The underlying store stayed unreachable through every
    /// availability-retry attempt.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// CAS contention on the lock key did not resolve within
    /// `max_save_retries` attempts.
    #[error("too many save retries for lock {key:?} ({retries} attempts)")]
    TooManySaveRetries {
        /// The resource key (without the store prefix) that failed to save.
        key: String,
        /// Number of retries attempted before giving up.
        retries: u32,
    },
}

pub type LockResult<T> = Result<T, LockError>;
