//! Single-flight guard for rotation attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-local flag that is set for exactly the lifetime of one rotation.
#[derive(Debug, Clone, Default)]
pub struct RotationGuard {
    flag: Arc<AtomicBool>,
}

impl RotationGuard {
    /// Take the guard, or `None` while another rotation holds it.
    pub fn try_acquire(&self) -> Option<RotationPermit> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RotationPermit {
                flag: self.flag.clone(),
            })
    }

    pub fn is_held(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Held by the running rotation; dropping it releases the guard.
#[derive(Debug)]
pub struct RotationPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for RotationPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
