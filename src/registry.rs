//! Hazard slot registry and the ownerless list.
//!
//! The registry is a fixed-capacity table mapping live threads to small
//! blocks of hazard slots. It is instance-scoped: each data structure owns
//! its own registry, so two structures never interfere with each other's
//! reclamation and nothing outlives the structure it guards.
//!
//! Claiming an entry is a CAS on its owner token; releasing nulls the
//! slots and resets the owner. The snapshot used by reclamation scans
//! reads every slot independently — it is not an atomically consistent
//! cut, which is fine: a pointer another thread is about to protect but
//! has not yet published is still reachable through the structure and
//! therefore not yet retired.

use crate::retired::Retired;
use crate::session::Session;
use crate::RegistryError;
use crossbeam_utils::CachePadded;
use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// Hazard slots per registered thread: one for the predecessor being
/// walked, one for the node being examined.
pub const SLOTS_PER_THREAD: usize = 2;

/// Retired-batch growth factor; the scan threshold is
/// `RETIRE_COEF * SLOTS_PER_THREAD * max_threads`.
pub(crate) const RETIRE_COEF: usize = 2;

/// Process-wide thread token allocator. Tokens are nonzero and never
/// reused; 0 means "entry unowned".
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Returns this thread's token, allocating on first use.
pub(crate) fn current_token() -> u64 {
    THREAD_TOKEN.with(|t| {
        let token = t.get();
        if token != 0 {
            return token;
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        t.set(token);
        token
    })
}

/// One thread's block of hazard slots.
struct ThreadEntry {
    /// Owning thread token; 0 when the entry is free.
    owner: AtomicU64,
    /// Published hazard addresses; 0 = empty.
    slots: [AtomicUsize; SLOTS_PER_THREAD],
}

impl ThreadEntry {
    fn new() -> Self {
        Self {
            owner: AtomicU64::new(0),
            slots: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }
}

/// Link in the ownerless list.
struct OwnerlessNode {
    next: *mut OwnerlessNode,
    item: Retired,
}

/// Fixed-capacity table of hazard slot blocks, plus the ownerless list of
/// retired pointers handed over by sessions that ended while some of
/// their retirees were still protected.
pub struct HazardRegistry {
    entries: Box<[CachePadded<ThreadEntry>]>,
    ownerless: AtomicPtr<OwnerlessNode>,
}

impl HazardRegistry {
    /// Creates a registry for at most `max_threads` concurrent sessions.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is zero.
    pub fn new(max_threads: usize) -> Self {
        assert!(max_threads > 0, "hazard registry needs at least one entry");
        let entries = (0..max_threads)
            .map(|_| CachePadded::new(ThreadEntry::new()))
            .collect();
        Self {
            entries,
            ownerless: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Number of entries (the `max_threads` the registry was built with).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Claims a slot block for the current thread and returns the session
    /// that owns it.
    ///
    /// Fails with [`RegistryError::Exhausted`] when every entry is owned —
    /// the registry was sized for fewer threads than are participating.
    pub fn register(&self) -> Result<Session<'_>, RegistryError> {
        let token = current_token();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.owner.load(Ordering::Relaxed) != 0 {
                continue;
            }
            if entry
                .owner
                .compare_exchange(0, token, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(Session::new(self, index));
            }
        }
        Err(RegistryError::Exhausted {
            capacity: self.entries.len(),
        })
    }

    /// Publishes `addr` into one of the calling session's slots.
    #[inline]
    pub(crate) fn publish(&self, entry: usize, slot: usize, addr: usize) {
        // SeqCst pairs with the fence in Session::scan: either the scanner
        // sees this publication, or this publication's re-read sees the
        // unlink that preceded the retirement.
        self.entries[entry].slots[slot].store(addr, Ordering::SeqCst);
    }

    /// Clears every slot of `entry`.
    #[inline]
    pub(crate) fn clear_slots(&self, entry: usize) {
        for slot in &self.entries[entry].slots {
            slot.store(0, Ordering::Release);
        }
    }

    /// Appends every non-null slot value across all entries to `out`.
    pub(crate) fn snapshot_protected(&self, out: &mut Vec<usize>) {
        out.clear();
        for entry in self.entries.iter() {
            for slot in &entry.slots {
                let addr = slot.load(Ordering::Acquire);
                if addr != 0 {
                    out.push(addr);
                }
            }
        }
    }

    /// Releases `entry`, making it claimable by another thread.
    ///
    /// # Panics
    ///
    /// Panics if the entry is not owned by the current thread: that means
    /// a double release (or a session moved across threads) and the
    /// registry can no longer be trusted.
    pub(crate) fn release(&self, entry: usize) {
        let token = current_token();
        self.clear_slots(entry);
        let owner = &self.entries[entry].owner;
        assert_eq!(
            owner.swap(0, Ordering::AcqRel),
            token,
            "hazard registry entry released by a thread that does not own it"
        );
    }

    /// Transfers still-protected retirees from a dying session onto the
    /// ownerless list. They are reclaimed when the registry is dropped.
    pub(crate) fn add_ownerless<I>(&self, items: I)
    where
        I: IntoIterator<Item = Retired>,
    {
        let mut head: *mut OwnerlessNode = ptr::null_mut();
        let mut tail: *mut OwnerlessNode = ptr::null_mut();
        for item in items {
            let node = Box::into_raw(Box::new(OwnerlessNode {
                next: head,
                item,
            }));
            if tail.is_null() {
                tail = node;
            }
            head = node;
        }
        if head.is_null() {
            return;
        }

        let mut expected = self.ownerless.load(Ordering::Relaxed);
        loop {
            // The chain's tail takes over the current head.
            unsafe { (*tail).next = expected };
            match self.ownerless.compare_exchange_weak(
                expected,
                head,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => expected = actual,
            }
        }
    }
}

impl Drop for HazardRegistry {
    fn drop(&mut self) {
        // All sessions hold a borrow of the registry, so by the time this
        // runs none are alive and no slot protects anything.
        let mut curr = *self.ownerless.get_mut();
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next;
            unsafe { node.item.reclaim() };
        }
    }
}
