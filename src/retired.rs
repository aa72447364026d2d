//! Retired pointers awaiting reclamation.
//!
//! A retired pointer is type-erased into a (address, destructor) pair so
//! the registry's ownerless list and the session's batch can hold nodes of
//! any type. The destructor is a monomorphized `unsafe fn` rather than a
//! boxed closure, so retiring allocates nothing.

/// Type-erased destructor.
pub(crate) type DropFn = unsafe fn(*mut u8);

/// A pointer removed from its structure, waiting until no hazard slot
/// protects it.
pub(crate) struct Retired {
    ptr: *mut u8,
    drop_fn: DropFn,
}

impl Retired {
    /// Erases `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must not be retired twice.
    pub(crate) unsafe fn new<T>(ptr: *mut T) -> Self {
        unsafe fn drop_boxed<T>(ptr: *mut u8) {
            drop(Box::from_raw(ptr as *mut T));
        }
        Self {
            ptr: ptr as *mut u8,
            drop_fn: drop_boxed::<T>,
        }
    }

    /// The erased address, used for hazard-snapshot membership checks.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self.ptr as usize
    }

    /// Deallocates the pointee.
    ///
    /// # Safety
    ///
    /// No hazard slot may hold this address, and it must be called once.
    pub(crate) unsafe fn reclaim(self) {
        (self.drop_fn)(self.ptr);
    }
}

// Once retired, the pointee is owned by the reclamation machinery and
// nothing dereferences it until reclaim. Moving a Retired across threads
// (the ownerless list) is sound for Send pointees; that bound is enforced
// where nodes are created.
unsafe impl Send for Retired {}
