//! In-memory [`StorageAdapter`] implementation, the unit-test double for the
//! lock engine. Compare-then-write needs one critical section spanning the
//! read and the mutation, so a single map-wide lock (rather than per-shard
//! sharding) keeps the CAS logic straightforward and correct.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StorageError;

use super::{CasOutcome, CasValue, StorageAdapter};

/// Synchronous, in-process key-value store implementing the same
/// `get` / `put_if` / `delete_if` semantics a real etcd cluster provides.
///
/// Used directly in unit tests, and as the shared backing store for tests
/// that exercise CAS races between multiple [`crate::lock::Lock`] handles
/// (they simply share one `Arc<MemoryStore>`).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_locked(entries: &HashMap<String, String>, key: &str) -> CasValue {
        match entries.get(key) {
            Some(v) => CasValue::Present(v.clone()),
            None => CasValue::Absent,
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    async fn get(&self, key: &str) -> Result<CasValue, StorageError> {
        let entries = self.entries.lock();
        Ok(Self::current_locked(&entries, key))
    }

    async fn put_if(
        &self,
        key: &str,
        value: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, StorageError> {
        let mut entries = self.entries.lock();
        let current = Self::current_locked(&entries, key);
        if &current != witness {
            return Ok(CasOutcome::Conflict(return_new_on_fail.then_some(current)));
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(CasOutcome::Applied)
    }

    async fn delete_if(
        &self,
        key: &str,
        witness: &CasValue,
        return_new_on_fail: bool,
    ) -> Result<CasOutcome, StorageError> {
        let mut entries = self.entries.lock();
        let current = Self::current_locked(&entries, key);
        if &current != witness {
            return Ok(CasOutcome::Conflict(return_new_on_fail.then_some(current)));
        }
        entries.remove(key);
        Ok(CasOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_lock_conformance_tests;

    #[tokio::test]
    async fn conformance_suite_passes() {
        let store = MemoryStore::new();
        run_lock_conformance_tests(&store).await;
    }

    #[tokio::test]
    async fn put_if_absent_creates_key() {
        let store = MemoryStore::new();
        let outcome = store
            .put_if("k", "v1", &CasValue::Absent, false)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Applied);
        assert_eq!(store.get("k").await.unwrap(), CasValue::Present("v1".into()));
    }

    #[tokio::test]
    async fn put_if_absent_fails_when_present() {
        let store = MemoryStore::new();
        store.put_if("k", "v1", &CasValue::Absent, false).await.unwrap();
        let outcome = store
            .put_if("k", "v2", &CasValue::Absent, true)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Conflict(Some(CasValue::Present("v1".into())))
        );
        assert_eq!(store.get("k").await.unwrap(), CasValue::Present("v1".into()));
    }

    #[tokio::test]
    async fn put_if_matching_witness_replaces_value() {
        let store = MemoryStore::new();
        store.put_if("k", "v1", &CasValue::Absent, false).await.unwrap();
        let outcome = store
            .put_if("k", "v2", &CasValue::Present("v1".into()), false)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Applied);
        assert_eq!(store.get("k").await.unwrap(), CasValue::Present("v2".into()));
    }

    #[tokio::test]
    async fn delete_if_matching_witness_removes_key() {
        let store = MemoryStore::new();
        store.put_if("k", "v1", &CasValue::Absent, false).await.unwrap();
        let outcome = store
            .delete_if("k", &CasValue::Present("v1".into()), false)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Applied);
        assert_eq!(store.get("k").await.unwrap(), CasValue::Absent);
    }

    #[tokio::test]
    async fn delete_if_mismatched_witness_conflicts() {
        let store = MemoryStore::new();
        store.put_if("k", "v1", &CasValue::Absent, false).await.unwrap();
        let outcome = store
            .delete_if("k", &CasValue::Present("stale".into()), true)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Conflict(Some(CasValue::Present("v1".into())))
        );
    }
}
