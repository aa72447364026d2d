//! Lock-free sets built on `petrel` hazard-pointer reclamation.
//!
//! Two structures share one sorted-list core:
//!
//! - [`OrderedSet`]: a sorted set with lock-free insert, lookup and
//!   two-phase (mark, then unlink) removal.
//! - [`SplitOrderedSet`]: a hash set that keeps every element in a
//!   single list sorted by bit-reversed hash, so growing the bucket
//!   table never relocates an element.
//!
//! Both are instance-scoped: each carries its own hazard registry sized
//! at construction, and threads take a handle per structure rather than
//! touching any global state.

#![warn(missing_docs)]

mod backoff;
mod list;
mod ordered;
mod split_ordered;

pub use ordered::{OrderedSet, SetHandle};
pub use split_ordered::{SplitOrderedSet, SplitSetHandle};
