//! Holder-identifier resolution.
//!
//! Handles that don't set an identifier explicitly share one default within
//! the process, so repeated same-process acquires collapse onto a single
//! holder slot. The generator is an explicit dependency rather than a hidden
//! singleton: [`IdentifierSource`] is injected into [`default_identifier`],
//! and the cached value can be reset for tests instead of relying on
//! reflection. See `DESIGN.md` for the reasoning.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Generates a string unique per process or per request.
///
/// External collaborator: production code should inject a source backed by
/// whatever the deployment already uses for request/process identity (a
/// UUID, a hostname+pid pair, etc). [`UuidIdentifierSource`] is a reasonable
/// default.
pub trait IdentifierSource: Send + Sync {
    /// Produce a new unique identifier.
    fn generate(&self) -> String;
}

/// Default [`IdentifierSource`]: a fresh UUID v4 per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdentifierSource;

impl IdentifierSource for UuidIdentifierSource {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Cached process-wide default identifier, lazily populated on first read.
static DEFAULT_IDENTIFIER: Lazy<Mutex<Option<Arc<String>>>> = Lazy::new(|| Mutex::new(None));

/// Returns the process-wide default identifier, generating and caching one
/// via `source` on first call. Subsequent calls (with any source) return
/// the cached value: within one process, handles that don't set an
/// identifier explicitly share this one and therefore share the same
/// underlying lock entry.
#[must_use]
pub fn default_identifier(source: &dyn IdentifierSource) -> Arc<String> {
    let mut slot = DEFAULT_IDENTIFIER.lock();
    if let Some(existing) = slot.as_ref() {
        return Arc::clone(existing);
    }
    let generated = Arc::new(source.generate());
    *slot = Some(Arc::clone(&generated));
    generated
}

/// Clears the cached default identifier.
///
/// Intended for tests that need isolation between cases sharing a process.
pub fn reset_default_identifier() {
    *DEFAULT_IDENTIFIER.lock() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting(std::sync::atomic::AtomicU32);

    impl IdentifierSource for Counting {
        fn generate(&self) -> String {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            format!("id-{n}")
        }
    }

    #[test]
    fn default_identifier_is_stable_across_calls() {
        reset_default_identifier();
        let source = Counting(std::sync::atomic::AtomicU32::new(0));
        let first = default_identifier(&source);
        let second = default_identifier(&source);
        assert_eq!(first, second);
    }

    #[test]
    fn reset_allows_a_new_default() {
        reset_default_identifier();
        let source = Counting(std::sync::atomic::AtomicU32::new(0));
        let first = default_identifier(&source);
        reset_default_identifier();
        let second = default_identifier(&source);
        assert_ne!(first, second);
    }
}
