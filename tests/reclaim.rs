use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use petrel::{Atomic, HazardRegistry, Shared, SLOTS_PER_THREAD};

struct Flagged {
    freed: Arc<AtomicBool>,
}

impl Drop for Flagged {
    fn drop(&mut self) {
        self.freed.store(true, Ordering::SeqCst);
    }
}

fn alloc(freed: &Arc<AtomicBool>) -> Shared<'static, Flagged> {
    unsafe {
        Shared::from_raw(Box::into_raw(Box::new(Flagged {
            freed: freed.clone(),
        })))
    }
}

#[test]
fn retire_defers_until_the_batch_threshold() {
    // threshold = 2 x slots-per-thread x capacity
    let registry = HazardRegistry::new(1);
    let threshold = 2 * SLOTS_PER_THREAD * registry.capacity();
    let session = registry.register().unwrap();

    let flags: Vec<_> = (0..threshold)
        .map(|_| Arc::new(AtomicBool::new(false)))
        .collect();

    for flag in flags.iter().take(threshold - 1) {
        unsafe { session.retire(alloc(flag)) };
    }
    assert_eq!(session.retired_len(), threshold - 1);
    assert!(flags.iter().all(|f| !f.load(Ordering::SeqCst)));

    // The retire that fills the batch triggers a scan, and with no slot
    // published everything goes at once.
    unsafe { session.retire(alloc(&flags[threshold - 1])) };
    assert_eq!(session.retired_len(), 0);
    assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
}

#[test]
fn scan_keeps_protected_frees_the_rest() {
    let registry = HazardRegistry::new(2);
    let holder = registry.register().unwrap();
    let retirer = registry.register().unwrap();

    let freed_a = Arc::new(AtomicBool::new(false));
    let freed_b = Arc::new(AtomicBool::new(false));
    let src = Atomic::new(alloc(&freed_a).as_ptr());
    let a = holder.protect(&src, 0);
    let b = alloc(&freed_b);

    src.store(Shared::null(), Ordering::SeqCst);
    unsafe {
        retirer.retire(a);
        retirer.retire(b);
    }
    retirer.scan();

    assert!(!freed_a.load(Ordering::SeqCst));
    assert!(freed_b.load(Ordering::SeqCst));
    assert_eq!(retirer.retired_len(), 1);

    holder.clear();
    retirer.scan();
    assert!(freed_a.load(Ordering::SeqCst));
    assert_eq!(retirer.retired_len(), 0);
}

#[test]
fn publish_pins_without_a_load_loop() {
    let registry = HazardRegistry::new(2);
    let holder = registry.register().unwrap();
    let retirer = registry.register().unwrap();

    let freed = Arc::new(AtomicBool::new(false));
    let ptr = alloc(&freed);
    holder.publish(1, ptr);

    unsafe { retirer.retire(ptr) };
    retirer.scan();
    assert!(!freed.load(Ordering::SeqCst));

    holder.clear();
    retirer.scan();
    assert!(freed.load(Ordering::SeqCst));
}
