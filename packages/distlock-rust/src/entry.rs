//! Lock-entry model, the lock-set JSON codec, and the pure predicates the
//! acquire engine evaluates over a decoded view (§3, §4.2, §4.3, §4.11).

use serde::{Deserialize, Serialize};

/// One holder's record for a resource.
///
/// `by` is only ever `None` while decoding malformed input; a valid entry
/// constructed by this library always carries a holder identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Identifier of the holder.
    pub by: Option<String>,
    /// Absolute expiry, in whole seconds since the Unix epoch.
    pub until: i64,
    /// `true` for an exclusive hold, `false` for shared.
    pub exclusive: bool,
}

impl LockEntry {
    /// Remaining seconds until expiry relative to `now` (may be negative).
    #[must_use]
    pub fn remaining(&self, now: i64) -> i64 {
        self.until - now
    }

    /// Whether this entry has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.until < now
    }

    /// Whether `by` matches the given identifier. A malformed entry with no
    /// `by` never matches any identifier.
    #[must_use]
    pub fn is_held_by(&self, identifier: &str) -> bool {
        self.by.as_deref() == Some(identifier)
    }
}

/// The decoded payload stored at a resource's key: an ordered list of
/// holders. The empty list is the canonical representation of "key absent".
pub type LockSet = Vec<LockEntry>;

/// Parses a lock-set payload. Absent input, non-array JSON, and malformed
/// JSON all decode to the empty set -- per §7 this is never surfaced as an
/// error, only ever observed by callers as "no prior locks". Non-object
/// array elements are skipped rather than failing the whole decode.
#[must_use]
pub fn decode(payload: Option<&str>) -> LockSet {
    let Some(payload) = payload else {
        return Vec::new();
    };
    let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(payload)
    else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<LockEntry>(item).ok())
        .collect()
}

/// Encodes a lock set as the JSON array this library writes verbatim as
/// the new CAS value. Never called with an empty set -- callers must use
/// a compare-and-delete instead (invariant 4).
#[must_use]
pub fn encode(entries: &[LockEntry]) -> String {
    serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string())
}

/// Removes expired entries in place, preserving relative order (invariant 3).
pub fn purge_expired(entries: &mut Vec<LockEntry>, now: i64) {
    entries.retain(|e| !e.is_expired(now));
}

/// §4.3: whether `identifier` may hold `exclusive` given the current view.
///
/// FORBID if any entry belongs to someone else, is not expired, and either
/// it or the request is exclusive. Two shared holders always coexist.
#[must_use]
pub fn can_lock(entries: &[LockEntry], identifier: &str, exclusive: bool, now: i64) -> bool {
    !entries.iter().any(|e| {
        !e.is_held_by(identifier) && !e.is_expired(now) && (e.exclusive || exclusive)
    })
}

/// §4.3: whether `identifier` currently holds a live (non-expired) entry.
#[must_use]
pub fn is_locked(entries: &[LockEntry], identifier: &str, now: i64) -> bool {
    entries
        .iter()
        .any(|e| e.is_held_by(identifier) && !e.is_expired(now))
}

/// §4.11: whether anyone other than `identifier` currently holds a live entry.
#[must_use]
pub fn is_locked_by_other(entries: &[LockEntry], identifier: &str, now: i64) -> bool {
    entries
        .iter()
        .any(|e| !e.is_held_by(identifier) && !e.is_expired(now))
}

/// §4.11: whether anyone other than `identifier` holds a live *exclusive* entry.
#[must_use]
pub fn is_locked_by_other_exclusively(entries: &[LockEntry], identifier: &str, now: i64) -> bool {
    entries
        .iter()
        .any(|e| !e.is_held_by(identifier) && !e.is_expired(now) && e.exclusive)
}

/// §4.3: remaining seconds on `identifier`'s own entry, or `-1` if they
/// hold none -- distinguishes "never held" from "expired" for callers.
#[must_use]
pub fn remaining_lock_duration(entries: &[LockEntry], identifier: &str, now: i64) -> i64 {
    entries
        .iter()
        .find(|e| e.is_held_by(identifier))
        .map_or(-1, |e| e.remaining(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(by: &str, until: i64, exclusive: bool) -> LockEntry {
        LockEntry {
            by: Some(by.to_string()),
            until,
            exclusive,
        }
    }

    #[test]
    fn decode_absent_is_empty() {
        assert_eq!(decode(None), Vec::new());
    }

    #[test]
    fn decode_malformed_is_empty() {
        assert_eq!(decode(Some("not json")), Vec::new());
        assert_eq!(decode(Some("{}")), Vec::new());
        assert_eq!(decode(Some("")), Vec::new());
    }

    #[test]
    fn decode_skips_non_object_elements() {
        let entries = decode(Some(r#"[{"by":"a","until":10,"exclusive":false}, 5, "x"]"#));
        assert_eq!(entries, vec![entry("a", 10, false)]);
    }

    #[test]
    fn encode_decode_round_trip() {
        let entries = vec![entry("a", 10, false), entry("b", 20, true)];
        let payload = encode(&entries);
        assert_eq!(decode(Some(&payload)), entries);
    }

    #[test]
    fn purge_expired_preserves_order() {
        let mut entries = vec![entry("a", 5, false), entry("b", 100, false), entry("c", 1, false)];
        purge_expired(&mut entries, 10);
        assert_eq!(entries, vec![entry("b", 100, false)]);
    }

    #[test]
    fn can_lock_permits_two_shared() {
        let entries = vec![entry("a", 100, false)];
        assert!(can_lock(&entries, "b", false, 0));
    }

    #[test]
    fn can_lock_forbids_foreign_exclusive() {
        let entries = vec![entry("a", 100, true)];
        assert!(!can_lock(&entries, "b", false, 0));
    }

    #[test]
    fn can_lock_forbids_exclusive_request_against_foreign_shared() {
        let entries = vec![entry("a", 100, false)];
        assert!(!can_lock(&entries, "b", true, 0));
    }

    #[test]
    fn can_lock_ignores_expired_foreign_entries() {
        let entries = vec![entry("a", 1, true)];
        assert!(can_lock(&entries, "b", true, 10));
    }

    #[test]
    fn can_lock_permits_self_regardless_of_mode() {
        let entries = vec![entry("a", 100, true)];
        assert!(can_lock(&entries, "a", true, 0));
    }

    #[test]
    fn is_locked_true_only_for_live_own_entry() {
        let entries = vec![entry("a", 100, false), entry("b", 1, false)];
        assert!(is_locked(&entries, "a", 0));
        assert!(!is_locked(&entries, "b", 10));
        assert!(!is_locked(&entries, "c", 0));
    }

    #[test]
    fn remaining_lock_duration_distinguishes_never_held_from_expired() {
        let entries = vec![entry("a", 5, false)];
        assert_eq!(remaining_lock_duration(&entries, "a", 0), 5);
        assert_eq!(remaining_lock_duration(&entries, "nobody", 0), -1);
    }

    #[test]
    fn is_locked_by_other_exclusively_requires_exclusive_and_live() {
        let shared = vec![entry("a", 100, false)];
        assert!(!is_locked_by_other_exclusively(&shared, "b", 0));

        let exclusive = vec![entry("a", 100, true)];
        assert!(is_locked_by_other_exclusively(&exclusive, "b", 0));
        assert!(!is_locked_by_other_exclusively(&exclusive, "a", 0));

        let expired_exclusive = vec![entry("a", 1, true)];
        assert!(!is_locked_by_other_exclusively(&expired_exclusive, "b", 10));
    }

    proptest::proptest! {
        #[test]
        fn decode_encode_decode_round_trips_any_array(
            entries in proptest::collection::vec(
                (
                    "[a-z]{1,8}",
                    0i64..1_000_000,
                    proptest::bool::ANY,
                ),
                0..8,
            )
        ) {
            let entries: Vec<LockEntry> = entries
                .into_iter()
                .map(|(by, until, exclusive)| LockEntry { by: Some(by), until, exclusive })
                .collect();
            let payload = encode(&entries);
            let decoded_once = decode(Some(&payload));
            let re_encoded = encode(&decoded_once);
            let decoded_twice = decode(Some(&re_encoded));
            proptest::prop_assert_eq!(decoded_once, decoded_twice);
        }

        #[test]
        fn purged_set_has_at_most_one_exclusive_survivor_when_deduped_by_holder(
            mut entries in proptest::collection::vec(
                (
                    "[a-z]{1,4}",
                    (-10i64)..10,
                    proptest::bool::ANY,
                ),
                0..8,
            )
        ) {
            let now = 0i64;
            let mut set: Vec<LockEntry> = entries
                .drain(..)
                .map(|(by, until, exclusive)| LockEntry { by: Some(by), until, exclusive })
                .collect();
            purge_expired(&mut set, now);

            // Every surviving entry is, by construction, non-expired; the
            // invariant under test is that can_lock's exclusivity rule is
            // symmetric and consistent regardless of generated input.
            for a in &set {
                for b in &set {
                    if a.by != b.by {
                        let conflict = a.exclusive || b.exclusive;
                        let a_forbids_b = !can_lock(std::slice::from_ref(a), b.by.as_deref().unwrap(), b.exclusive, now);
                        proptest::prop_assert_eq!(conflict, a_forbids_b);
                    }
                }
            }
        }
    }
}
