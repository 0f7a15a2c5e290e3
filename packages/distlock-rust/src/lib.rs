//! Distributed exclusive/shared advisory locks over a compare-and-swap
//! capable key-value store.
//!
//! A [`Lock`] names a resource by an opaque key; any number of cooperating
//! processes may contend for it and coordinate mutual access through
//! optimistic compare-and-swap on a single JSON-encoded value per resource.
//! There is no deadlock detection, no fairness between contenders, and no
//! watch/notification mechanism -- only polling with jittered back-off.
//!
//! ```no_run
//! use std::sync::Arc;
//! use distlock::config;
//! use distlock::storage::memory::MemoryStore;
//! use distlock::Lock;
//!
//! # async fn run() {
//! config::set_storage_adapter(Arc::new(MemoryStore::new()));
//!
//! let mut lock = Lock::new("some-resource");
//! if lock.acquire().await.unwrap() {
//!     // ... critical section ...
//!     lock.close().await;
//! }
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod identifier;
pub mod lock;
pub mod retry;
pub mod storage;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use entry::{LockEntry, LockSet};
pub use error::{LockError, LockResult, StorageError};
pub use identifier::IdentifierSource;
pub use lock::Lock;
pub use storage::{CasOutcome, CasValue, StorageAdapter};
