//! Atomic tagged pointers.
//!
//! `Atomic<T>` is a word-sized atomic pointer whose lowest bit is a tag,
//! used by lock-free structures to encode "logically deleted" alongside the
//! successor in one atomically-updatable word. `Shared<'g, T>` is the
//! copyable value read out of an `Atomic<T>`; its lifetime is bound to the
//! [`Session`] it was loaded under, so a protected pointer cannot outlive
//! the protection.
//!
//! Requires `align_of::<T>() >= 2` so the tag bit is otherwise always zero.

use crate::session::Session;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

const TAG_MASK: usize = 1;

/// An atomic pointer to `T` with a one-bit tag.
///
/// Loads require a live [`Session`] reference; the returned [`Shared`]
/// cannot outlive it. For single-threaded teardown paths use
/// [`Atomic::load_unprotected`].
pub struct Atomic<T> {
    data: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for Atomic<T> {}
unsafe impl<T: Send + Sync> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    /// Creates an atomic holding `ptr` with tag 0.
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        debug_assert!(core::mem::align_of::<T>() >= 2);
        debug_assert_eq!(ptr as usize & TAG_MASK, 0);
        Self {
            data: AtomicUsize::new(ptr as usize),
            _marker: PhantomData,
        }
    }

    /// Creates a null atomic pointer.
    #[inline]
    pub fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Loads the current (pointer, tag) word.
    #[inline]
    pub fn load<'g>(&self, order: Ordering, _session: &'g Session<'_>) -> Shared<'g, T> {
        Shared::from_usize(self.data.load(order))
    }

    /// Loads without a session.
    ///
    /// # Safety
    ///
    /// The caller must guarantee no concurrent reclamation can free the
    /// pointee, e.g. during `Drop` of the owning structure when all
    /// sessions have been released.
    #[inline]
    pub unsafe fn load_unprotected(&self, order: Ordering) -> Shared<'static, T> {
        Shared::from_usize(self.data.load(order))
    }

    /// Stores a (pointer, tag) word.
    #[inline]
    pub fn store(&self, ptr: Shared<'_, T>, order: Ordering) {
        self.data.store(ptr.data, order);
    }

    /// Compares and exchanges the full (pointer, tag) word.
    ///
    /// A marked expected value never matches an unmarked stored one and
    /// vice versa, which is what makes the tag an effective insert/erase
    /// interlock.
    #[inline]
    pub fn compare_exchange<'g>(
        &self,
        current: Shared<'_, T>,
        new: Shared<'_, T>,
        success: Ordering,
        failure: Ordering,
        _session: &'g Session<'_>,
    ) -> Result<Shared<'g, T>, Shared<'g, T>> {
        match self
            .data
            .compare_exchange(current.data, new.data, success, failure)
        {
            Ok(prev) => Ok(Shared::from_usize(prev)),
            Err(prev) => Err(Shared::from_usize(prev)),
        }
    }

    /// Atomically ORs `tag` into the word, returning the previous value.
    ///
    /// `fetch_or(1)` is the logical-delete step: it marks the node no
    /// matter how its successor changes concurrently, and the returned
    /// tag tells the caller whether it won the deletion.
    #[inline]
    pub fn fetch_or<'g>(
        &self,
        tag: usize,
        order: Ordering,
        _session: &'g Session<'_>,
    ) -> Shared<'g, T> {
        Shared::from_usize(self.data.fetch_or(tag & TAG_MASK, order))
    }

    /// Raw accessor for the slot-publication protocol.
    #[inline]
    pub(crate) fn as_raw_atomic(&self) -> &AtomicUsize {
        &self.data
    }
}

impl<T> Default for Atomic<T> {
    fn default() -> Self {
        Self::null()
    }
}

/// A (pointer, tag) word read out of an [`Atomic<T>`].
///
/// Copyable; valid for dereference only while the session it was loaded
/// under keeps the pointee protected (or the pointee is otherwise known
/// to be immortal, e.g. bucket sentinels).
pub struct Shared<'g, T> {
    data: usize,
    _marker: PhantomData<(&'g (), *mut T)>,
}

impl<'g, T> Shared<'g, T> {
    #[inline]
    pub(crate) fn from_usize(data: usize) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Creates a shared pointer (tag 0) from a raw pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure the pointer remains valid for `'g`.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        debug_assert_eq!(ptr as usize & TAG_MASK, 0);
        Self::from_usize(ptr as usize)
    }

    /// The null pointer with tag 0.
    #[inline]
    pub fn null() -> Self {
        Self::from_usize(0)
    }

    /// Returns the tag bit.
    #[inline]
    pub fn tag(&self) -> usize {
        self.data & TAG_MASK
    }

    /// Returns the same pointer with the given tag.
    #[inline]
    pub fn with_tag(&self, tag: usize) -> Self {
        Self::from_usize((self.data & !TAG_MASK) | (tag & TAG_MASK))
    }

    /// Returns the pointer with the tag stripped.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        (self.data & !TAG_MASK) as *mut T
    }

    /// The raw word, tag included.
    #[inline]
    pub fn into_usize(self) -> usize {
        self.data
    }

    /// True if the pointer part is null (regardless of tag).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.as_ptr().is_null()
    }

    /// Converts to an optional reference, ignoring the tag.
    ///
    /// # Safety
    ///
    /// The pointee must be protected (or immortal) for `'g`.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&'g T> {
        self.as_ptr().as_ref()
    }

    /// Dereferences, ignoring the tag.
    ///
    /// # Safety
    ///
    /// Non-null, and the pointee must be protected (or immortal) for `'g`.
    #[inline]
    pub unsafe fn deref(&self) -> &'g T {
        &*self.as_ptr()
    }
}

impl<'g, T> Clone for Shared<'g, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'g, T> Copy for Shared<'g, T> {}

// Equality is tag-sensitive: a traversal that validated against an
// unmarked pointer must notice a concurrent logical deletion.
impl<'g, T> PartialEq for Shared<'g, T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<'g, T> Eq for Shared<'g, T> {}

impl<'g, T> core::fmt::Debug for Shared<'g, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Shared({:p}, tag={})", self.as_ptr(), self.tag())
    }
}
