//! Shared test tooling, re-exported so both this crate's own tests and a
//! downstream adapter implementation can run the same conformance suite
//! against their [`StorageAdapter`] -- the same shape as the acteon-state
//! etcd lock module's `run_lock_conformance_tests` helper, which any new
//! backing store is expected to pass before it's trusted.

use crate::storage::{CasOutcome, CasValue, StorageAdapter};

pub use crate::clock::ManualClock;

/// Exercises the handful of CAS behaviours every [`StorageAdapter`] must get
/// right, independent of backing store. Intended to be called from each
/// adapter's own test module against a fresh, empty instance.
///
/// # Panics
/// Panics (via `assert!`/`assert_eq!`) if `adapter` does not satisfy the
/// required CAS semantics.
pub async fn run_lock_conformance_tests(adapter: &dyn StorageAdapter) {
    let key = "conformance/key";

    // A key nothing has ever written is absent, not an error.
    assert_eq!(adapter.get(key).await.unwrap(), CasValue::Absent);

    // Creating against an Absent witness succeeds exactly once.
    let created = adapter
        .put_if(key, "first", &CasValue::Absent, false)
        .await
        .unwrap();
    assert_eq!(created, CasOutcome::Applied);
    assert_eq!(adapter.get(key).await.unwrap(), CasValue::Present("first".into()));

    // Re-creating against Absent now conflicts, and reports the live value
    // when asked to.
    let conflict = adapter
        .put_if(key, "second", &CasValue::Absent, true)
        .await
        .unwrap();
    assert_eq!(
        conflict,
        CasOutcome::Conflict(Some(CasValue::Present("first".into())))
    );

    // A stale witness conflicts and does not mutate the store.
    let stale = adapter
        .put_if(key, "third", &CasValue::Present("stale".into()), false)
        .await
        .unwrap();
    assert_eq!(stale, CasOutcome::Conflict(None));
    assert_eq!(adapter.get(key).await.unwrap(), CasValue::Present("first".into()));

    // The correct witness applies the write.
    let applied = adapter
        .put_if(key, "second", &CasValue::Present("first".into()), false)
        .await
        .unwrap();
    assert_eq!(applied, CasOutcome::Applied);
    assert_eq!(adapter.get(key).await.unwrap(), CasValue::Present("second".into()));

    // Deleting against a mismatched witness conflicts without side effects.
    let delete_conflict = adapter
        .delete_if(key, &CasValue::Present("first".into()), true)
        .await
        .unwrap();
    assert_eq!(
        delete_conflict,
        CasOutcome::Conflict(Some(CasValue::Present("second".into())))
    );

    // Deleting against the correct witness removes the key entirely.
    let deleted = adapter
        .delete_if(key, &CasValue::Present("second".into()), false)
        .await
        .unwrap();
    assert_eq!(deleted, CasOutcome::Applied);
    assert_eq!(adapter.get(key).await.unwrap(), CasValue::Absent);

    // Deleting an already-absent key against an Absent witness is a no-op
    // success, mirroring put_if's "create if absent" symmetry.
    let delete_absent = adapter
        .delete_if(key, &CasValue::Absent, false)
        .await
        .unwrap();
    assert_eq!(delete_absent, CasOutcome::Applied);
}
