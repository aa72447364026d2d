//! Bounded exponential spin backoff for CAS retry loops.

/// Spins exponentially longer on each call, capped so a stalled
/// competitor never parks us for long.
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    const MAX_SHIFT: u32 = 6;

    #[inline]
    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    pub(crate) fn spin(&mut self) {
        for _ in 0..(1u32 << self.step.min(Self::MAX_SHIFT)) {
            core::hint::spin_loop();
        }
        if self.step <= Self::MAX_SHIFT {
            self.step += 1;
        }
    }
}
