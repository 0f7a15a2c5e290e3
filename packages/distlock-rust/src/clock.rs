//! Wall-clock source, injected so lock expiry math is testable.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time, expressed as whole seconds since the Unix
/// epoch -- the unit [`crate::entry::LockEntry::until`] is encoded in.
///
/// External collaborator: the library only ever calls `now()`, never reads
/// the system clock directly, so callers in deterministic test harnesses or
/// simulated runtimes can supply their own.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in whole seconds since the Unix epoch.
    fn now(&self) -> i64;
}

/// Default [`Clock`] backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// A manually-advanced clock for deterministic tests.
///
/// Starts at an arbitrary fixed epoch rather than the real wall clock so
/// test assertions never depend on when the test happened to run.
#[derive(Debug)]
pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given number of seconds since epoch.
    #[must_use]
    pub fn new(start_seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(start_seconds),
        }
    }

    /// Advances the clock by `secs` seconds and returns the new value.
    pub fn advance(&self, secs: i64) -> i64 {
        self.seconds.fetch_add(secs, Ordering::SeqCst) + secs
    }

    /// Sets the clock to an absolute value.
    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}
