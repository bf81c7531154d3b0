/// Single-slot admission control for ranging sessions.
///
/// The ranging engine runs one exchange at a time. The gate is taken before a
/// request is submitted and released when the engine reports the result, so
/// at most one request is ever outstanding. Acquisition is a lock-free
/// compare-and-swap, safe to call from any radio callback context.
use core::sync::atomic::{AtomicBool, Ordering};

pub struct SessionGate {
    held: AtomicBool,
}

impl SessionGate {
    /// A free gate.
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// A gate that starts held, for nodes that must finish bring-up before
    /// admitting the first session.
    pub const fn closed() -> Self {
        Self {
            held: AtomicBool::new(true),
        }
    }

    /// Take the session slot without blocking. Exactly one of any number of
    /// racing callers gets `true`.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Free the slot. Harmless when the gate is not held.
    #[inline]
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}
