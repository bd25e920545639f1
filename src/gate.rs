//! Single-permit blocking signal between a notification context and the
//! state machine thread.
//!
//! The radio driver raises its "connected" and "address assigned" events on
//! its own context. Those callbacks hold only a [`GateHandle`] and call
//! [`GateHandle::signal`]; the machine blocks in [`EventGate::wait`].
//!
//! At most one permit is retained. Signalling twice before anyone waits
//! leaves a single permit behind.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How long a waiter is willing to block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitPolicy {
    /// Block until signalled. The embedded behaviour.
    #[default]
    Forever,
    /// Give up with [`GateError::TimedOut`] after the duration.
    Timeout(Duration),
}

impl WaitPolicy {
    /// `None` maps to [`WaitPolicy::Forever`].
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            Some(ms) => Self::Timeout(Duration::from_millis(ms)),
            None => Self::Forever,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("no signal within {0:?}")]
    TimedOut(Duration),

    #[error("wait cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
struct Slot {
    permit: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The waiting side of the gate, owned by the state machine.
///
/// # Example
///
/// ```rust
/// use tether::gate::EventGate;
///
/// let gate = EventGate::new();
/// let handle = gate.handle();
///
/// let notifier = std::thread::spawn(move || handle.signal());
/// gate.wait_forever().unwrap();
/// notifier.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct EventGate {
    shared: Arc<Shared>,
}

/// The signalling side of an [`EventGate`]. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct GateHandle {
    shared: Arc<Shared>,
}

impl EventGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for the notifier.
    pub fn handle(&self) -> GateHandle {
        GateHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Signal from the owning side. Same semantics as [`GateHandle::signal`].
    pub fn signal(&self) {
        self.handle().signal();
    }

    /// Block until a pending or future signal is observed, then consume it.
    ///
    /// Only a [`GateHandle::cancel`] can end this wait early.
    pub fn wait_forever(&self) -> Result<(), GateError> {
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = take(&mut slot) {
                return result;
            }
            slot = self
                .shared
                .wake
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`EventGate::wait_forever`] but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), GateError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = take(&mut slot) {
                return result;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GateError::TimedOut(timeout));
            }
            let (guard, _) = self
                .shared
                .wake
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    pub fn wait(&self, policy: WaitPolicy) -> Result<(), GateError> {
        match policy {
            WaitPolicy::Forever => self.wait_forever(),
            WaitPolicy::Timeout(timeout) => self.wait_timeout(timeout),
        }
    }

    /// Consume a retained permit without blocking. Returns whether one was
    /// pending.
    pub fn try_take(&self) -> bool {
        self.handle().try_take()
    }

    /// `true` if a signal is retained and nobody has consumed it yet.
    pub fn is_pending(&self) -> bool {
        self.shared.lock().permit
    }
}

impl GateHandle {
    /// Post the permit and wake a blocked waiter, if any.
    pub fn signal(&self) {
        let mut slot = self.shared.lock();
        slot.permit = true;
        self.shared.wake.notify_one();
    }

    /// Drain a retained permit.
    pub fn try_take(&self) -> bool {
        let mut slot = self.shared.lock();
        std::mem::replace(&mut slot.permit, false)
    }

    /// Make the current and every later wait return [`GateError::Cancelled`].
    pub fn cancel(&self) {
        let mut slot = self.shared.lock();
        slot.cancelled = true;
        self.shared.wake.notify_all();
    }
}

fn take(slot: &mut Slot) -> Option<Result<(), GateError>> {
    if slot.cancelled {
        return Some(Err(GateError::Cancelled));
    }
    if slot.permit {
        slot.permit = false;
        return Some(Ok(()));
    }
    None
}
