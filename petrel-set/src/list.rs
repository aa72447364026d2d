//! Lock-free sorted singly-linked list with two-phase deletion.
//!
//! Erasure is split into a logical step (setting the tag bit on the
//! victim's `next` word with `fetch_or`, which no concurrent successor
//! change can race past) and a structural step (swinging the predecessor
//! link over the victim). Any traversal that runs into a marked node
//! finishes the structural step on the eraser's behalf, so a stalled
//! eraser never blocks progress.
//!
//! The walk functions here take an explicit comparator and an arbitrary
//! start link rather than a concrete key type and a fixed head, because
//! [`SplitOrderedSet`](crate::SplitOrderedSet) runs the same walks from
//! per-bucket sentinel nodes over composite keys.

use core::cmp::Ordering::{Equal, Greater, Less};
use core::sync::atomic::Ordering;

use petrel::{Atomic, Session, Shared};

use crate::backoff::Backoff;

/// Hazard slot holding the node behind the link being walked.
pub(crate) const SLOT_PREV: usize = 0;
/// Hazard slot holding the node currently being inspected.
pub(crate) const SLOT_CURR: usize = 1;

pub(crate) struct Node<K> {
    pub(crate) key: K,
    pub(crate) next: Atomic<Node<K>>,
}

impl<K> Node<K> {
    pub(crate) fn boxed(key: K) -> *mut Self {
        Box::into_raw(Box::new(Self {
            key,
            next: Atomic::null(),
        }))
    }
}

/// Where a walk stopped: the link out of the last node strictly below
/// the target, and the (unmarked) node that link points at.
pub(crate) struct Position<'g, K> {
    /// Link to CAS for insert/unlink. Points either into the start link
    /// (owned by the structure, or an immortal sentinel's `next`) or into
    /// a node held by `SLOT_PREV`, so it stays dereferenceable.
    pub(crate) prev_link: *const Atomic<Node<K>>,
    pub(crate) curr: Shared<'g, Node<K>>,
}

/// Walks from `start` until `cmp` reports the first node that is not
/// `Less` than the target, unlinking marked nodes along the way.
///
/// Returns whether an `Equal`, unmarked node was found, plus the
/// position. Restarts from `start` whenever a validation read shows the
/// predecessor link moved under us, since past that point every pointer
/// we hold may belong to an unlinked suffix.
pub(crate) fn find<'g, K, F>(
    session: &'g Session<'_>,
    start: &Atomic<Node<K>>,
    cmp: &F,
) -> (bool, Position<'g, K>)
where
    K: Send + Sync + 'static,
    F: Fn(&K) -> core::cmp::Ordering,
{
    let mut backoff = Backoff::new();
    'retry: loop {
        let mut prev_link: *const Atomic<Node<K>> = start;
        let mut curr = session.protect(unsafe { &*prev_link }, SLOT_CURR);
        loop {
            let node = match unsafe { curr.as_ref() } {
                Some(node) => node,
                None => return (false, Position { prev_link, curr }),
            };
            let next = node.next.load(Ordering::Acquire, session);
            // The protect loop alone only proves `curr` was reachable from
            // `prev_link` at some instant; re-reading the link proves it
            // still was after we read `next`, so `next` is part of the
            // list and not a dangling suffix.
            if unsafe { &*prev_link }.load(Ordering::Acquire, session) != curr {
                backoff.spin();
                continue 'retry;
            }
            if next.tag() != 0 {
                // `curr` is logically erased; finish the unlink. Winning
                // the CAS makes us the one thread that retires it.
                match unsafe { &*prev_link }.compare_exchange(
                    curr,
                    next.with_tag(0),
                    Ordering::Release,
                    Ordering::Relaxed,
                    session,
                ) {
                    Ok(_) => {
                        unsafe { session.retire(curr) };
                        curr = session.protect(unsafe { &*prev_link }, SLOT_CURR);
                        continue;
                    }
                    Err(_) => {
                        backoff.spin();
                        continue 'retry;
                    }
                }
            }
            match cmp(&node.key) {
                Less => {
                    session.publish(SLOT_PREV, curr);
                    prev_link = &node.next;
                    curr = session.protect(unsafe { &*prev_link }, SLOT_CURR);
                }
                Equal => return (true, Position { prev_link, curr }),
                Greater => return (false, Position { prev_link, curr }),
            }
        }
    }
}

/// Membership walk.
///
/// Runs the same helping walk as the mutating operations: finishing the
/// unlink of a marked node on the way past is what guarantees a lookup
/// terminates even when the eraser that marked it has stalled. The mark
/// bit itself is never touched here, and found is only reported for an
/// unmarked match.
pub(crate) fn contains<K, F>(session: &Session<'_>, start: &Atomic<Node<K>>, cmp: &F) -> bool
where
    K: Send + Sync + 'static,
    F: Fn(&K) -> core::cmp::Ordering,
{
    find(session, start, cmp).0
}

/// Inserts `key` if no equal key is present.
///
/// Returns the freshly linked node, or `Err` with the already-present
/// node (the new allocation is dropped). The `Err` pointer stays valid
/// while `SLOT_CURR` holds it, or indefinitely for sentinel keys.
pub(crate) fn insert<'g, K>(
    session: &'g Session<'_>,
    start: &Atomic<Node<K>>,
    key: K,
) -> Result<Shared<'g, Node<K>>, Shared<'g, Node<K>>>
where
    K: Ord + Send + Sync + 'static,
{
    let node_ptr = Node::boxed(key);
    // The box gives the key a stable address for the duration of the
    // retry loop; it is reclaimed on the duplicate path below.
    let key_ref: &K = unsafe { &(*node_ptr).key };
    let mut backoff = Backoff::new();
    loop {
        let (found, pos) = find(session, start, &|k: &K| k.cmp(key_ref));
        if found {
            let existing = pos.curr;
            unsafe { drop(Box::from_raw(node_ptr)) };
            return Err(existing);
        }
        unsafe { (*node_ptr).next.store(pos.curr, Ordering::Relaxed) };
        let new = unsafe { Shared::from_raw(node_ptr) };
        match unsafe { &*pos.prev_link }.compare_exchange(
            pos.curr,
            new,
            Ordering::Release,
            Ordering::Relaxed,
            session,
        ) {
            Ok(_) => return Ok(new),
            Err(_) => backoff.spin(),
        }
    }
}

/// Erases the node `cmp` reports `Equal`, if any.
///
/// Returns `true` iff this call won the logical delete. On a lost
/// structural CAS the follow-up walk's help branch is guaranteed to
/// unlink (and retire) the node before that walk returns.
pub(crate) fn remove<K, F>(session: &Session<'_>, start: &Atomic<Node<K>>, cmp: &F) -> bool
where
    K: Send + Sync + 'static,
    F: Fn(&K) -> core::cmp::Ordering,
{
    let (found, pos) = find(session, start, cmp);
    if !found {
        return false;
    }
    let curr = pos.curr;
    let node = unsafe { curr.deref() };
    let prior = node.next.fetch_or(1, Ordering::AcqRel, session);
    if prior.tag() != 0 {
        // Someone else marked it first; their erase counts, not ours.
        return false;
    }
    match unsafe { &*pos.prev_link }.compare_exchange(
        curr,
        prior.with_tag(0),
        Ordering::Release,
        Ordering::Relaxed,
        session,
    ) {
        Ok(_) => unsafe { session.retire(curr) },
        Err(_) => {
            let _ = find(session, start, cmp);
        }
    }
    true
}

/// Owns the head link and every node reachable from it.
pub(crate) struct RawList<K> {
    pub(crate) head: Atomic<Node<K>>,
}

impl<K> RawList<K> {
    pub(crate) fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }
}

impl<K> Drop for RawList<K> {
    fn drop(&mut self) {
        // &mut self: every session over the owning structure has ended,
        // so the chain is stable and tags are ignorable.
        let mut curr = unsafe { self.head.load_unprotected(Ordering::Relaxed) };
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr.as_ptr()) };
            curr = unsafe { node.next.load_unprotected(Ordering::Relaxed) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petrel::HazardRegistry;

    fn ordering_of(target: i32) -> impl Fn(&i32) -> core::cmp::Ordering {
        move |k: &i32| k.cmp(&target)
    }

    #[test]
    fn insert_find_remove_single_thread() {
        let registry = HazardRegistry::new(2);
        let list = RawList::<i32>::new();
        let session = registry.register().unwrap();

        assert!(insert(&session, &list.head, 5).is_ok());
        assert!(insert(&session, &list.head, 1).is_ok());
        assert!(insert(&session, &list.head, 9).is_ok());
        assert!(insert(&session, &list.head, 5).is_err());

        assert!(contains(&session, &list.head, &ordering_of(1)));
        assert!(contains(&session, &list.head, &ordering_of(5)));
        assert!(!contains(&session, &list.head, &ordering_of(7)));

        assert!(remove(&session, &list.head, &ordering_of(5)));
        assert!(!remove(&session, &list.head, &ordering_of(5)));
        assert!(!contains(&session, &list.head, &ordering_of(5)));
        session.clear();
    }

    #[test]
    fn lookup_terminates_past_a_stalled_erase() {
        let registry = HazardRegistry::new(1);
        let list = RawList::<i32>::new();
        let session = registry.register().unwrap();
        for k in [1, 2, 3] {
            assert!(insert(&session, &list.head, k).is_ok());
        }
        session.clear();

        // Mark 2 as logically deleted without unlinking it, as if its
        // eraser stalled between the mark and the unlink CAS.
        let mut curr = unsafe { list.head.load_unprotected(Ordering::Acquire) };
        loop {
            let node = unsafe { curr.as_ref() }.unwrap();
            if node.key == 2 {
                node.next.fetch_or(1, Ordering::AcqRel, &session);
                break;
            }
            curr = unsafe { node.next.load_unprotected(Ordering::Acquire) };
        }

        // Lookups behind the marked node must still terminate, and the
        // marked node itself must read as absent.
        assert!(contains(&session, &list.head, &ordering_of(3)));
        assert!(!contains(&session, &list.head, &ordering_of(2)));
        assert!(contains(&session, &list.head, &ordering_of(1)));
        session.clear();
    }

    #[test]
    fn nodes_stay_sorted() {
        let registry = HazardRegistry::new(1);
        let list = RawList::<i32>::new();
        let session = registry.register().unwrap();
        for k in [3, 1, 4, 1, 5, 9, 2, 6] {
            let _ = insert(&session, &list.head, k);
        }
        session.clear();
        drop(session);

        let mut keys = Vec::new();
        let mut curr = unsafe { list.head.load_unprotected(Ordering::Relaxed) };
        while let Some(node) = unsafe { curr.as_ref() } {
            keys.push(node.key);
            curr = unsafe { node.next.load_unprotected(Ordering::Relaxed) };
        }
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 9]);
    }
}
