//! Sorted lock-free set over the raw list.

use core::sync::atomic::Ordering;

use petrel::{Atomic, HazardRegistry, RegistryError, Session};

use crate::list::{self, Node, RawList};

/// A lock-free sorted set of `T`.
///
/// Each participating thread calls [`register`](Self::register) for a
/// [`SetHandle`] and performs all operations through it. Handles borrow
/// the set, so the set cannot be dropped while any thread still holds
/// one.
///
/// ```
/// use petrel_set::OrderedSet;
///
/// let set = OrderedSet::new(4);
/// let handle = set.register().unwrap();
/// assert!(handle.insert(3));
/// assert!(handle.insert(1));
/// assert!(!handle.insert(3));
/// assert!(handle.remove(&1));
/// assert_eq!(handle.to_vec(), vec![3]);
/// ```
pub struct OrderedSet<T> {
    registry: HazardRegistry,
    list: RawList<T>,
}

impl<T> OrderedSet<T>
where
    T: Ord + Send + Sync + 'static,
{
    /// Creates a set usable by up to `max_threads` concurrent handles.
    pub fn new(max_threads: usize) -> Self {
        Self {
            registry: HazardRegistry::new(max_threads),
            list: RawList::new(),
        }
    }

    /// Claims a registry entry for the calling thread.
    ///
    /// Fails with [`RegistryError::Exhausted`] when `max_threads` handles
    /// are already live.
    pub fn register(&self) -> Result<SetHandle<'_, T>, RegistryError> {
        Ok(SetHandle {
            set: self,
            session: self.registry.register()?,
        })
    }
}

/// A per-thread view of an [`OrderedSet`].
pub struct SetHandle<'s, T> {
    set: &'s OrderedSet<T>,
    session: Session<'s>,
}

impl<'s, T> SetHandle<'s, T>
where
    T: Ord + Send + Sync + 'static,
{
    /// Inserts `value`; returns `false` if it was already present.
    pub fn insert(&self, value: T) -> bool {
        let inserted = list::insert(&self.session, &self.set.list.head, value).is_ok();
        self.session.clear();
        inserted
    }

    /// Membership test; reports `true` only for a live (unmarked) match.
    pub fn contains(&self, value: &T) -> bool {
        let found = list::contains(&self.session, &self.set.list.head, &|k: &T| k.cmp(value));
        self.session.clear();
        found
    }

    /// Removes `value`; returns `true` iff this call performed the
    /// logical delete.
    pub fn remove(&self, value: &T) -> bool {
        let removed = list::remove(&self.session, &self.set.list.head, &|k: &T| k.cmp(value));
        self.session.clear();
        removed
    }

    /// Copies the current elements into a sorted `Vec`.
    ///
    /// Restarts when a concurrent mutation moves the list under the
    /// walk, so the result is a consistent snapshot of some instant.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = Vec::new();
        'retry: loop {
            out.clear();
            let mut prev_link: *const Atomic<Node<T>> = &self.set.list.head;
            let mut curr = self.session.protect(unsafe { &*prev_link }, list::SLOT_CURR);
            loop {
                let node = match unsafe { curr.as_ref() } {
                    Some(node) => node,
                    None => {
                        self.session.clear();
                        return out;
                    }
                };
                let next = node.next.load(Ordering::Acquire, &self.session);
                if unsafe { &*prev_link }.load(Ordering::Acquire, &self.session) != curr
                    || next.tag() != 0
                {
                    continue 'retry;
                }
                out.push(node.key.clone());
                self.session.publish(list::SLOT_PREV, curr);
                prev_link = &node.next;
                curr = self.session.protect(unsafe { &*prev_link }, list::SLOT_CURR);
            }
        }
    }
}
