//! Single-pass execution guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Allows at most one pipeline pass in flight.
#[derive(Debug, Clone, Default)]
pub struct PassGuard {
    running: Arc<AtomicBool>,
}

impl PassGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the running flag, or `None` if a pass already holds it.
    ///
    /// The flag stays set until the returned permit is dropped.
    pub fn try_acquire(&self) -> Option<PassPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the current pass.
#[derive(Debug)]
pub struct PassPermit {
    running: Arc<AtomicBool>,
}

impl Drop for PassPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
