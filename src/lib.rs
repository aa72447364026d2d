//! Petrel: hazard-pointer memory reclamation for lock-free data structures.
//!
//! Petrel solves the use-after-free problem inherent to lock-free
//! structures without garbage collection: a thread publishes the pointers
//! it is about to dereference into its hazard slots, and removed nodes are
//! only deallocated once no slot in the registry holds their address.
//!
//! # Key properties
//!
//! - **Instance-scoped**: every structure owns its own [`HazardRegistry`];
//!   no global state, no cross-instance interference.
//! - **Session-based**: threads join through
//!   [`HazardRegistry::register`], which returns an RAII [`Session`]
//!   borrowing the registry — the borrow checker guarantees no participant
//!   outlives the structure it guards.
//! - **Batched reclamation**: retired nodes accumulate per thread and are
//!   freed by an amortized sort-and-scan pass; nodes still protected
//!   elsewhere survive the pass and retry later.
//! - **Non-blocking teardown**: a session ending while its retirees are
//!   still protected hands them to a lock-free ownerless list, drained
//!   when the registry itself is dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::Ordering;
//! use petrel::{Atomic, HazardRegistry, Shared};
//!
//! let registry = HazardRegistry::new(8);
//! let atomic = Atomic::new(Box::into_raw(Box::new(42u64)));
//!
//! let session = registry.register().unwrap();
//! let ptr = session.protect(&atomic, 0);
//! assert_eq!(unsafe { *ptr.deref() }, 42);
//!
//! // Unlink, then retire: the node is freed once nothing protects it.
//! atomic.store(Shared::null(), Ordering::Release);
//! session.clear();
//! unsafe { session.retire(ptr) };
//! session.scan();
//! ```

#![warn(missing_docs)]

mod registry;
mod retired;
mod session;
mod tagged;

pub use registry::{HazardRegistry, SLOTS_PER_THREAD};
pub use session::Session;
pub use tagged::{Atomic, Shared};

use thiserror::Error;

/// Configuration errors surfaced by the registry.
///
/// Contention is always retried internally; the only error a caller can
/// see is a capacity misconfiguration, and it is not retryable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every entry is owned: the registry was sized for fewer threads
    /// than are actually participating.
    #[error("hazard registry exhausted: all {capacity} entries are in use")]
    Exhausted {
        /// The `max_threads` the registry was constructed with.
        capacity: usize,
    },
}
