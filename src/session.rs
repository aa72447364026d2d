//! Per-thread reclamation sessions.
//!
//! A [`Session`] owns one registry entry for the lifetime of a thread's
//! participation in a structure. It is the only way to obtain protected
//! pointers and the only place retired nodes accumulate, so dropping it is
//! the single teardown path: clear the slots, run a final scan, hand the
//! stragglers to the ownerless list, release the entry.
//!
//! Sessions are `!Send` and `!Sync`: the entry is claimed under the
//! calling thread's token, and releasing it from another thread would trip
//! the registry's ownership check.

use crate::registry::{HazardRegistry, RETIRE_COEF, SLOTS_PER_THREAD};
use crate::retired::Retired;
use crate::tagged::{Atomic, Shared};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{fence, Ordering};

/// A thread's claim on a hazard slot block, plus its retired batch.
///
/// Created by [`HazardRegistry::register`]; the borrow ties every session
/// to the registry (and thus to the structure that owns it), so the
/// structure cannot be dropped while any participant is still active.
pub struct Session<'r> {
    registry: &'r HazardRegistry,
    entry: usize,
    retired: RefCell<Vec<Retired>>,
    /// Reusable snapshot buffer for scans.
    scratch: RefCell<Vec<usize>>,
    threshold: usize,
    _not_send: PhantomData<*mut ()>,
}

impl<'r> Session<'r> {
    pub(crate) fn new(registry: &'r HazardRegistry, entry: usize) -> Self {
        let threshold = RETIRE_COEF * SLOTS_PER_THREAD * registry.capacity();
        Self {
            registry,
            entry,
            retired: RefCell::new(Vec::with_capacity(threshold)),
            scratch: RefCell::new(Vec::new()),
            threshold,
            _not_send: PhantomData,
        }
    }

    /// Reads `src` and protects the result in slot `slot`.
    ///
    /// Publishes the (unmarked) pointer, then re-reads the source until
    /// both reads agree. That closes the race where the pointee is
    /// retired and freed between the initial read and the publication.
    /// The tag bit is stripped before publishing so a traversal never
    /// spins on a marked word that will keep changing under it.
    pub fn protect<'g, T>(&'g self, src: &Atomic<T>, slot: usize) -> Shared<'g, T> {
        debug_assert!(slot < SLOTS_PER_THREAD);
        let raw = src.as_raw_atomic();
        let mut current = Shared::from_usize(raw.load(Ordering::Relaxed)).with_tag(0);
        loop {
            self.registry
                .publish(self.entry, slot, current.into_usize());
            // Pairs with the fence in `scan`: either the scanner sees this
            // slot, or the re-read below sees the unlink that preceded the
            // retirement and the loop goes around.
            fence(Ordering::SeqCst);
            let reread = Shared::from_usize(raw.load(Ordering::Acquire)).with_tag(0);
            if reread == current {
                return current;
            }
            current = reread;
        }
    }

    /// Publishes an already-protected pointer into `slot`.
    ///
    /// Used to shift the walk window: the pointer is still covered by the
    /// slot it came from until that slot is overwritten, so no validation
    /// loop is needed here.
    #[inline]
    pub fn publish<T>(&self, slot: usize, ptr: Shared<'_, T>) {
        debug_assert!(slot < SLOTS_PER_THREAD);
        self.registry
            .publish(self.entry, slot, ptr.with_tag(0).into_usize());
    }

    /// Clears every slot of this session.
    ///
    /// Call after a traversal completes so other threads' scans are not
    /// held up by stale protections.
    #[inline]
    pub fn clear(&self) {
        self.registry.clear_slots(self.entry);
    }

    /// Hands a structurally-unlinked node to the reclamation batch.
    ///
    /// When the batch reaches its threshold (`2 × slots-per-thread ×
    /// max-threads`), a [`scan`](Self::scan) runs.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw`, must be unreachable from the
    /// structure, and must not be retired twice.
    pub unsafe fn retire<T: Send + 'static>(&self, ptr: Shared<'_, T>) {
        let mut retired = self.retired.borrow_mut();
        retired.push(Retired::new(ptr.as_ptr()));
        if retired.len() >= self.threshold {
            drop(retired);
            self.scan();
        }
    }

    /// Reclaims every retired pointer no hazard slot protects.
    ///
    /// Takes one snapshot of all protected pointers, sorts it, and binary
    /// searches each retired address: with the protected set bounded by
    /// `threads × slots-per-thread` this beats pairwise comparison.
    /// Still-protected pointers are kept for the next round.
    pub fn scan(&self) {
        fence(Ordering::SeqCst);
        let mut protected = self.scratch.borrow_mut();
        self.registry.snapshot_protected(&mut protected);
        protected.sort_unstable();

        let mut retired = self.retired.borrow_mut();
        let batch = std::mem::replace(&mut *retired, Vec::with_capacity(self.threshold));
        for item in batch {
            if protected.binary_search(&item.addr()).is_ok() {
                retired.push(item);
            } else {
                // No slot holds it and it is unreachable: safe to free.
                unsafe { item.reclaim() };
            }
        }
    }

    /// Number of pointers currently awaiting reclamation.
    pub fn retired_len(&self) -> usize {
        self.retired.borrow().len()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.registry.clear_slots(self.entry);
        self.scan();
        let leftovers = std::mem::take(&mut *self.retired.borrow_mut());
        if !leftovers.is_empty() {
            // Some other thread still protects these; the registry frees
            // them when the owning structure is dropped.
            self.registry.add_ownerless(leftovers);
        }
        self.registry.release(self.entry);
    }
}
