//! Split-ordered hash set.
//!
//! All elements live in one sorted lock-free list ordered by the
//! bit-reversal of their 32-bit hash; buckets are lazily-created
//! sentinel nodes spliced into that list. Doubling the bucket count
//! therefore moves no element: each new bucket's sentinel lands inside
//! its parent's span, splitting it in two.
//!
//! Regular keys reverse the hash and set the lowest bit; sentinel keys
//! reverse the bucket index and keep it clear. A bucket's elements thus
//! sort strictly after its sentinel and before the next one, and a
//! sentinel can never collide with a live element.

use core::cmp::Ordering as CmpOrdering;
use core::hash::{BuildHasher, Hash};
use core::sync::atomic::{AtomicUsize, Ordering};

use foldhash::fast::FixedState;
use petrel::{Atomic, HazardRegistry, RegistryError, Session, Shared};

use crate::list::{self, Node, RawList};

/// Number of buckets a fresh set starts with.
const INITIAL_BUCKETS: usize = 2;
/// Default ceiling for bucket doubling.
const DEFAULT_MAX_BUCKETS: usize = 1 << 16;

/// Composite list key: split-order key first, then the value.
///
/// A sentinel (`value: None`) with the same split-order key as a
/// regular node would sort before it, but the low bit keeps the two key
/// spaces disjoint anyway. The value acts as tiebreaker among hash
/// collisions, which is why `V: Ord` is required.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct SplitKey<V> {
    skey: u32,
    value: Option<V>,
}

fn regular_key(hash: u32) -> u32 {
    hash.reverse_bits() | 1
}

fn sentinel_key(bucket: usize) -> u32 {
    (bucket as u32).reverse_bits()
}

/// A concurrent hash set with lock-free inserts, lookups and removals.
///
/// Threads operate through a [`SplitSetHandle`] obtained from
/// [`register`](Self::register); the handle count is bounded by the
/// `max_threads` given at construction.
///
/// ```
/// use petrel_set::SplitOrderedSet;
///
/// let set = SplitOrderedSet::new(4);
/// let handle = set.register().unwrap();
/// assert!(handle.insert(42u64));
/// assert!(handle.contains(&42));
/// assert!(handle.remove(&42));
/// assert_eq!(set.len(), 0);
/// ```
pub struct SplitOrderedSet<V, S = FixedState> {
    registry: HazardRegistry,
    list: RawList<SplitKey<V>>,
    /// Sentinel cache; a null slot means the bucket has not been
    /// materialized yet. Sentinels are never unlinked, so a pointer read
    /// from here is valid for the set's whole lifetime.
    buckets: Box<[Atomic<Node<SplitKey<V>>>]>,
    /// Current number of live buckets; always a power of two and at most
    /// `buckets.len()`. Grows monotonically.
    num_buckets: AtomicUsize,
    num_elems: AtomicUsize,
    hasher: S,
}

impl<V> SplitOrderedSet<V>
where
    V: Hash + Ord + Send + Sync + 'static,
{
    /// Creates a set usable by up to `max_threads` concurrent handles,
    /// with the default bucket ceiling.
    pub fn new(max_threads: usize) -> Self {
        Self::with_max_buckets(max_threads, DEFAULT_MAX_BUCKETS)
    }

    /// Creates a set whose bucket table can grow up to `max_buckets`
    /// (rounded up to a power of two).
    pub fn with_max_buckets(max_threads: usize, max_buckets: usize) -> Self {
        let max_buckets = max_buckets.max(INITIAL_BUCKETS).next_power_of_two();
        let list = RawList::new();
        let mut buckets = Vec::with_capacity(max_buckets);
        buckets.resize_with(max_buckets, Atomic::null);

        // Bucket 0's sentinel is the list head; materializing it here
        // grounds the parent recursion for every other bucket.
        let root = Node::boxed(SplitKey {
            skey: sentinel_key(0),
            value: None,
        });
        list.head.store(unsafe { Shared::from_raw(root) }, Ordering::Relaxed);
        buckets[0].store(unsafe { Shared::from_raw(root) }, Ordering::Relaxed);

        Self {
            registry: HazardRegistry::new(max_threads),
            list,
            buckets: buckets.into_boxed_slice(),
            num_buckets: AtomicUsize::new(INITIAL_BUCKETS),
            num_elems: AtomicUsize::new(0),
            hasher: FixedState::default(),
        }
    }
}

impl<V, S> SplitOrderedSet<V, S>
where
    V: Hash + Ord + Send + Sync + 'static,
    S: BuildHasher,
{
    /// Claims a registry entry for the calling thread.
    pub fn register(&self) -> Result<SplitSetHandle<'_, V, S>, RegistryError> {
        Ok(SplitSetHandle {
            set: self,
            session: self.registry.register()?,
        })
    }

    /// Number of elements, counted with relaxed loads.
    ///
    /// Exact only at quiescence; under concurrent mutation it is a
    /// point-in-time approximation.
    pub fn len(&self) -> usize {
        self.num_elems.load(Ordering::Relaxed)
    }

    /// True if [`len`](Self::len) reads zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket_of(&self, hash: u32) -> usize {
        let n = self.num_buckets.load(Ordering::Acquire);
        hash as usize & (n - 1)
    }

    /// Doubles the bucket count once `num_elems` reaches twice the
    /// current count, up to the table's ceiling. A lost CAS means a
    /// racing insert already grew the table; no retry is needed because
    /// the next insert re-evaluates the load factor.
    fn maybe_grow(&self, elems: usize) {
        let n = self.num_buckets.load(Ordering::Relaxed);
        if elems >= 2 * n && 2 * n <= self.buckets.len() {
            let _ = self
                .num_buckets
                .compare_exchange(n, 2 * n, Ordering::AcqRel, Ordering::Relaxed);
        }
    }
}

/// A per-thread view of a [`SplitOrderedSet`].
///
/// Holds the thread's hazard session; dropping it returns the registry
/// entry for reuse.
pub struct SplitSetHandle<'s, V, S = FixedState> {
    set: &'s SplitOrderedSet<V, S>,
    session: Session<'s>,
}

impl<'s, V, S> SplitSetHandle<'s, V, S>
where
    V: Hash + Ord + Send + Sync + 'static,
    S: BuildHasher,
{
    /// Inserts `value`; returns `false` if it was already present.
    pub fn insert(&self, value: V) -> bool {
        let hash = self.set.hasher.hash_one(&value) as u32;
        let link = self.ensure_sentinel(self.set.bucket_of(hash));
        let key = SplitKey {
            skey: regular_key(hash),
            value: Some(value),
        };
        let inserted = list::insert(&self.session, unsafe { &*link }, key).is_ok();
        self.session.clear();
        if inserted {
            let elems = self.set.num_elems.fetch_add(1, Ordering::Relaxed) + 1;
            self.set.maybe_grow(elems);
        }
        inserted
    }

    /// Membership test; reports `true` only for a live (unmarked) match.
    pub fn contains(&self, value: &V) -> bool {
        let hash = self.set.hasher.hash_one(value) as u32;
        let link = self.ensure_sentinel(self.set.bucket_of(hash));
        let skey = regular_key(hash);
        let found = list::contains(&self.session, unsafe { &*link }, &|k: &SplitKey<V>| {
            Self::compare(k, skey, value)
        });
        self.session.clear();
        found
    }

    /// Removes `value`; returns `false` if it was not present (or a
    /// concurrent remove won the logical delete).
    pub fn remove(&self, value: &V) -> bool {
        let hash = self.set.hasher.hash_one(value) as u32;
        let link = self.ensure_sentinel(self.set.bucket_of(hash));
        let skey = regular_key(hash);
        let removed = list::remove(&self.session, unsafe { &*link }, &|k: &SplitKey<V>| {
            Self::compare(k, skey, value)
        });
        self.session.clear();
        if removed {
            self.set.num_elems.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    fn compare(key: &SplitKey<V>, skey: u32, value: &V) -> CmpOrdering {
        key.skey.cmp(&skey).then_with(|| match &key.value {
            None => CmpOrdering::Less,
            Some(v) => v.cmp(value),
        })
    }

    /// Returns the `next` link of `bucket`'s sentinel, materializing the
    /// sentinel (and, recursively, its ancestors) on first touch.
    ///
    /// The parent of bucket `b` is `b` with its lowest set bit cleared;
    /// the parent's sentinel precedes `b`'s position in split order, so
    /// inserting from the parent's link walks at most the parent's own
    /// span. Racing threads may both run the insert; the unique-insert
    /// walk makes them converge on one sentinel node and the losing
    /// allocation is dropped.
    fn ensure_sentinel(&self, bucket: usize) -> *const Atomic<Node<SplitKey<V>>> {
        let slot = &self.set.buckets[bucket];
        let cached = slot.load(Ordering::Acquire, &self.session);
        if let Some(node) = unsafe { cached.as_ref() } {
            return &node.next;
        }
        debug_assert_ne!(bucket, 0, "bucket 0 is materialized at construction");

        let parent_link = self.ensure_sentinel(bucket & (bucket - 1));
        let key = SplitKey {
            skey: sentinel_key(bucket),
            value: None,
        };
        let sentinel = match list::insert(&self.session, unsafe { &*parent_link }, key) {
            Ok(node) | Err(node) => node,
        };
        // Publish into the cache; a racing thread can only have stored
        // the same node, since sentinel keys are unique in the list.
        let _ = slot.compare_exchange(
            Shared::null(),
            sentinel,
            Ordering::Release,
            Ordering::Relaxed,
            &self.session,
        );
        unsafe { &sentinel.deref().next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_order_keys_are_disjoint() {
        // Regular keys are odd after bit reversal, sentinel keys even.
        assert_eq!(regular_key(0) & 1, 1);
        assert_eq!(sentinel_key(0) & 1, 0);
        assert_eq!(sentinel_key(3) & 1, 0);
    }

    #[test]
    fn parent_clears_lowest_set_bit() {
        assert_eq!(5 & (5 - 1), 4);
        assert_eq!(4 & (4 - 1), 0);
        assert_eq!(6 & (6 - 1), 4);
        assert_eq!(1 & (1 - 1), 0);
    }

    #[test]
    fn sentinels_sort_before_their_bucket_elements() {
        // In split order, bucket b's sentinel precedes every regular key
        // that maps to bucket b and follows the parent's sentinel.
        for bucket in 1usize..16 {
            let parent = bucket & (bucket - 1);
            assert!(sentinel_key(parent) < sentinel_key(bucket));
        }
        // hash 5 with 4 buckets lands in bucket 1.
        assert!(sentinel_key(1) < regular_key(5));
    }
}
