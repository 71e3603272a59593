//! One-shot stop signals shared between the controller and the units.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A settable flag that threads can wait on with a timeout.
///
/// Cloning yields another handle to the same flag. Once set, a signal stays
/// set for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Signal {
    /// Create a cleared signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal and wake every waiter
    pub fn set(&self) {
        let (lock, cvar) = &*self.inner;
        let mut set = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *set = true;
        cvar.notify_all();
    }

    /// Whether the signal is set
    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut set = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*set {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            set = cvar
                .wait_timeout(set, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        *set
    }
}
