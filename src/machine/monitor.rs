//! Read-only view of the current phase, shareable across threads.

use crate::core::Phase;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cloneable observer updated by the machine on every transition.
#[derive(Debug, Clone, Default)]
pub struct PhaseMonitor {
    inner: Arc<(Mutex<Phase>, Condvar)>,
}

impl PhaseMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Phase {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, phase: Phase) {
        let (lock, changed) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        changed.notify_all();
    }

    /// Block until the machine is in `phase` or `timeout` passes.
    pub fn wait_for(&self, phase: Phase, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, changed) = &*self.inner;
        let mut current = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while *current != phase {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = changed
                .wait_timeout(current, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            current = guard;
        }
        true
    }
}
