//! The `Lock` handle: construction, the acquire/refresh/break protocols, and
//! the optimistic `AddOrUpdate` / `RemoveOwn` / `SaveLocks` CAS engine
//! (§4.3-§4.9). This is the component the rest of the crate exists to serve.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::entry::{self, LockEntry};
use crate::error::LockError;
use crate::retry::{is_delay_mode, jittered_save_delay, with_availability_retry, AvailabilityRetryPolicy};
use crate::storage::{CasOutcome, CasValue, StorageAdapter};

/// Outcome of one `SaveLocks` attempt: either the CAS committed, or the
/// caller's outer loop should reassess and try again.
enum SaveOutcome {
    Success,
    Retry,
}

/// A handle to a named, shared resource contended for via optimistic CAS
/// over a backing key-value store.
///
/// Not `Clone`: two independent handles for the same key are two
/// independent contenders, even if they happen to share an identifier.
pub struct Lock {
    key: String,
    key_in_store: String,
    identifier: String,
    time: Duration,
    wait_time: Duration,
    exclusive: bool,
    refresh_time: Option<Duration>,
    refresh_threshold: Duration,
    break_on_teardown: bool,

    entries: Vec<LockEntry>,
    previous_payload: CasValue,
    retries: u32,
    closed: bool,

    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    wait_retry_interval: Duration,
    max_save_retries: u32,
    max_delay_per_save_retry: Duration,
    availability_retry: AvailabilityRetryPolicy,
}

impl Lock {
    /// Builds a handle over `key` using the process-wide storage adapter,
    /// prefix, default-identifier source, and retry bounds (§6).
    ///
    /// # Panics
    /// Panics if no storage adapter has been configured via
    /// [`crate::config::set_storage_adapter`]. Process-wide configuration is
    /// expected to happen once during bootstrap, before any handle is built.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let storage = crate::config::storage_adapter()
            .expect("distlock: no storage adapter configured; call config::set_storage_adapter first");
        Self::with_storage(key, storage, Arc::new(SystemClock))
    }

    /// Builds a handle with an explicitly supplied storage adapter and
    /// clock, bypassing the process-wide storage singleton. Intended for
    /// tests and for callers that want several independently-configured
    /// stores in one process.
    #[must_use]
    pub fn with_storage(
        key: impl Into<String>,
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let key = key.into();
        let prefix = crate::config::key_prefix();
        let key_in_store = format!("{prefix}{key}");
        let source = crate::config::default_identifier_source();
        let identifier = (*crate::identifier::default_identifier(source.as_ref().as_ref())).clone();

        Self {
            key,
            key_in_store,
            identifier,
            time: Duration::from_secs(120),
            wait_time: Duration::from_secs(300),
            exclusive: false,
            refresh_time: None,
            refresh_threshold: Duration::from_secs(30),
            break_on_teardown: true,
            entries: Vec::new(),
            previous_payload: CasValue::Absent,
            retries: 0,
            closed: false,
            storage,
            clock,
            wait_retry_interval: crate::config::wait_retry_interval(),
            max_save_retries: crate::config::max_save_retries(),
            max_delay_per_save_retry: crate::config::max_delay_per_save_retry(),
            availability_retry: crate::config::availability_retry_policy(),
        }
    }

    // -- configuration getters/setters (§6 caller surface) ---------------

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn key_in_store(&self) -> &str {
        &self.key_in_store
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) -> &mut Self {
        self.identifier = identifier.into();
        self
    }

    #[must_use]
    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn set_exclusive(&mut self, exclusive: bool) -> &mut Self {
        self.exclusive = exclusive;
        self
    }

    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn set_time(&mut self, time: Duration) -> &mut Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    pub fn set_wait_time(&mut self, wait_time: Duration) -> &mut Self {
        self.wait_time = wait_time;
        self
    }

    #[must_use]
    pub fn refresh_time(&self) -> Option<Duration> {
        self.refresh_time
    }

    pub fn set_refresh_time(&mut self, refresh_time: Option<Duration>) -> &mut Self {
        self.refresh_time = refresh_time;
        self
    }

    #[must_use]
    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    pub fn set_refresh_threshold(&mut self, threshold: Duration) -> &mut Self {
        self.refresh_threshold = threshold;
        self
    }

    #[must_use]
    pub fn break_on_teardown(&self) -> bool {
        self.break_on_teardown
    }

    pub fn set_break_on_teardown(&mut self, break_on_teardown: bool) -> &mut Self {
        self.break_on_teardown = break_on_teardown;
        self
    }

    // -- §4.3, §4.11 predicates over the last local view ------------------

    fn now(&self) -> i64 {
        self.clock.now()
    }

    fn can_lock(&self) -> bool {
        entry::can_lock(&self.entries, &self.identifier, self.exclusive, self.now())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        entry::is_locked(&self.entries, &self.identifier, self.now())
    }

    #[must_use]
    pub fn is_locked_by_other(&self) -> bool {
        entry::is_locked_by_other(&self.entries, &self.identifier, self.now())
    }

    #[must_use]
    pub fn is_locked_by_other_exclusively(&self) -> bool {
        entry::is_locked_by_other_exclusively(&self.entries, &self.identifier, self.now())
    }

    #[must_use]
    pub fn remaining_lock_duration(&self) -> i64 {
        entry::remaining_lock_duration(&self.entries, &self.identifier, self.now())
    }

    // -- §4.6 view refresh --------------------------------------------------

    fn update_from_payload(&mut self, value: CasValue) {
        self.entries = entry::decode(value.as_payload());
        self.previous_payload = value;
    }

    async fn refresh_view(&mut self) -> Result<(), LockError> {
        let storage = Arc::clone(&self.storage);
        let key = self.key_in_store.clone();
        let value = with_availability_retry(&self.availability_retry, || {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            async move { storage.get(&key).await }
        })
        .await?;
        self.update_from_payload(value);
        Ok(())
    }

    async fn put_if(
        &self,
        payload: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, LockError> {
        let storage = Arc::clone(&self.storage);
        let key = self.key_in_store.clone();
        let payload = payload.to_string();
        let witness = witness.clone();
        let outcome = with_availability_retry(&self.availability_retry, || {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            let payload = payload.clone();
            let witness = witness.clone();
            async move { storage.put_if(&key, &payload, &witness, return_new_on_fail).await }
        })
        .await?;
        Ok(outcome)
    }

    async fn delete_if(
        &self,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, LockError> {
        let storage = Arc::clone(&self.storage);
        let key = self.key_in_store.clone();
        let witness = witness.clone();
        let outcome = with_availability_retry(&self.availability_retry, || {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            let witness = witness.clone();
            async move { storage.delete_if(&key, &witness, return_new_on_fail).await }
        })
        .await?;
        Ok(outcome)
    }

    // -- §4.5 AddOrUpdate / RemoveOwn / SaveLocks --------------------------

    fn apply_add_or_update(&mut self, duration: Duration) {
        let until = self.now() + i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        if let Some(existing) = self.entries.iter_mut().find(|e| e.is_held_by(&self.identifier)) {
            existing.until = until;
        } else {
            self.entries.push(LockEntry {
                by: Some(self.identifier.clone()),
                until,
                exclusive: self.exclusive,
            });
        }
    }

    async fn add_or_update(&mut self, duration: Duration) -> Result<SaveOutcome, LockError> {
        self.apply_add_or_update(duration);
        self.save_locks().await
    }

    fn apply_remove_own(&mut self) {
        let identifier = self.identifier.clone();
        self.entries.retain(|e| !e.is_held_by(&identifier));
    }

    async fn remove_own(&mut self) -> Result<(), LockError> {
        loop {
            self.apply_remove_own();
            match self.save_locks().await? {
                SaveOutcome::Success => return Ok(()),
                SaveOutcome::Retry => continue,
            }
        }
    }

    /// The optimistic save loop (§4.5). One call performs exactly one CAS
    /// attempt; `Retry` means the view has been refreshed and the caller
    /// (an outer acquire/refresh/break loop) decides whether to try again.
    async fn save_locks(&mut self) -> Result<SaveOutcome, LockError> {
        let witness = self.previous_payload.clone();
        let now = self.now();
        entry::purge_expired(&mut self.entries, now);

        let delay = is_delay_mode(self.retries);
        let return_new_on_fail = !delay;

        let (outcome, new_payload) = if self.entries.is_empty() {
            (self.delete_if(&witness, return_new_on_fail).await?, CasValue::Absent)
        } else {
            let payload = entry::encode(&self.entries);
            let new_payload = CasValue::Present(payload.clone());
            (self.put_if(&payload, &witness, return_new_on_fail).await?, new_payload)
        };

        match outcome {
            CasOutcome::Applied => {
                self.previous_payload = new_payload;
                Ok(SaveOutcome::Success)
            }
            CasOutcome::Conflict(current) => {
                if self.retries >= self.max_save_retries {
                    return Err(LockError::TooManySaveRetries {
                        key: self.key.clone(),
                        retries: self.retries,
                    });
                }
                if delay {
                    let wait = jittered_save_delay(self.max_delay_per_save_retry, self.retries);
                    tracing::debug!(key = %self.key, retries = self.retries, ?wait, "save contention, entering delay mode");
                    tokio::time::sleep(wait).await;
                    self.refresh_view().await?;
                } else if let Some(current) = current {
                    self.update_from_payload(current);
                } else {
                    self.refresh_view().await?;
                }
                self.retries += 1;
                Ok(SaveOutcome::Retry)
            }
        }
    }

    // -- §4.3 acquire engine ------------------------------------------------

    async fn wait_for_other_locks_inner(&mut self, wait_time: Duration) -> Result<(), LockError> {
        let start = self.now();
        let deadline = start + i64::try_from(wait_time.as_secs()).unwrap_or(i64::MAX);
        self.refresh_view().await?;
        while !self.can_lock() && deadline > self.now() {
            tokio::time::sleep(self.wait_retry_interval).await;
            self.refresh_view().await?;
        }
        Ok(())
    }

    /// Waits, polling at `wait_retry_interval`, until the local view permits
    /// acquiring or `wait_time` (defaulting to the handle's configured
    /// value) elapses. Returns whether the view currently permits it.
    pub async fn wait_for_other_locks(&mut self, wait_time: Option<Duration>) -> Result<bool, LockError> {
        let wait_time = wait_time.unwrap_or(self.wait_time);
        self.wait_for_other_locks_inner(wait_time).await?;
        Ok(self.can_lock())
    }

    /// Attempts to acquire the lock (§4.3). Returns whether the handle holds
    /// a live entry when the call returns -- `false` means `wait_time`
    /// elapsed while the resource stayed incompatible, which is not an
    /// error.
    pub async fn acquire(&mut self) -> Result<bool, LockError> {
        self.retries = 0;
        loop {
            self.wait_for_other_locks_inner(self.wait_time).await?;
            if !self.can_lock() {
                break;
            }
            match self.add_or_update(self.time).await? {
                SaveOutcome::Success => break,
                SaveOutcome::Retry => continue,
            }
        }
        Ok(self.is_locked())
    }

    /// Extends the handle's own entry (§4.4). Returns `false` if contention
    /// appeared since the last view was taken -- the own entry is gone and
    /// the local view no longer permits re-acquiring; the caller must treat
    /// the lock as lost.
    ///
    /// Design decision (the spec leaves this open): a `refresh` that finds
    /// its own entry already gone does NOT silently acquire a fresh lock --
    /// it reports failure so the caller makes an explicit decision to
    /// reacquire.
    pub async fn refresh(&mut self) -> Result<bool, LockError> {
        if self.refresh_threshold > Duration::ZERO {
            let threshold = i64::try_from(self.refresh_threshold.as_secs()).unwrap_or(i64::MAX);
            if self.remaining_lock_duration() > threshold {
                return Ok(true);
            }
        }

        self.refresh_view().await?;
        self.retries = 0;

        // Own entry already gone (expired or broken externally): fail
        // rather than silently acquiring a fresh lock (see module docs on
        // `refresh` above).
        if !self.is_locked() {
            return Ok(false);
        }
        if !self.can_lock() {
            return Ok(false);
        }

        let duration = self.refresh_time.unwrap_or(self.time);
        loop {
            match self.add_or_update(duration).await? {
                SaveOutcome::Success => return Ok(true),
                SaveOutcome::Retry => {
                    if !self.can_lock() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Releases the handle's own entry, if any (§4.8). Idempotent: a handle
    /// that holds nothing performs no store operation.
    pub async fn break_lock(&mut self) -> Result<(), LockError> {
        if !self.is_locked() {
            return Ok(());
        }
        self.refresh_view().await?;
        self.retries = 0;
        self.remove_own().await
    }

    /// Explicit teardown: best-effort `break_lock` if `break_on_teardown`
    /// and the handle currently holds a live entry. Safe to call more than
    /// once; only the first call does anything.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.break_on_teardown && self.is_locked() {
            if let Err(err) = self.break_lock().await {
                tracing::warn!(key = %self.key, error = %err, "best-effort break on teardown failed");
            }
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        // Async cleanup can't run from a synchronous destructor. This is the
        // finalizer safety net the design calls for: it can only warn, not
        // break the lock -- callers that need a guaranteed teardown break
        // must `close().await` explicitly.
        if !self.closed && self.break_on_teardown && self.is_locked() {
            tracing::warn!(
                key = %self.key,
                "Lock dropped while still held without calling close().await; \
                 the entry will only be released by expiry"
            );
        }
    }
}
