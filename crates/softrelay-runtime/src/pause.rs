//! Pause barrier: cooperative hand-off between the config manager and the
//! scan executor for atomic store swaps.
//!
//! The manager requests a pause; the scan executor acknowledges at a safe
//! point between ticks and stays out of the card store until released. The
//! manager's wait is bounded so a wedged executor fails the commit instead of
//! hanging the portal.

#![allow(missing_docs)]

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Default bound for waiting on the scan executor's acknowledgement.
pub const PAUSE_ACK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct BarrierState {
    requested: bool,
    paused: bool,
}

/// Request/acknowledge pause handshake.
#[derive(Debug, Default)]
pub struct PauseBarrier {
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl PauseBarrier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager side: ask the scan executor to pause.
    pub fn request_pause(&self) {
        let mut state = self.state.lock().expect("pause barrier poisoned");
        state.requested = true;
        self.cvar.notify_all();
    }

    /// Manager side: wait up to `timeout` for the executor to acknowledge.
    /// Returns false on timeout (the request stays set until released).
    #[must_use]
    pub fn wait_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("pause barrier poisoned");
        while !state.paused {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (next, result) = self
                .cvar
                .wait_timeout(state, remaining)
                .expect("pause barrier wait poisoned");
            state = next;
            if result.timed_out() && !state.paused {
                return false;
            }
        }
        true
    }

    /// Manager side: release the barrier after the swap (or abort).
    pub fn release(&self) {
        let mut state = self.state.lock().expect("pause barrier poisoned");
        state.requested = false;
        self.cvar.notify_all();
    }

    /// Executor side: true while a pause is requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.state.lock().expect("pause barrier poisoned").requested
    }

    /// Executor side: acknowledge the pause at a safe point.
    pub fn acknowledge(&self) {
        let mut state = self.state.lock().expect("pause barrier poisoned");
        if state.requested {
            state.paused = true;
            self.cvar.notify_all();
        }
    }

    /// Executor side: resume once the request has been cleared.
    /// Returns true when the executor left the paused state.
    pub fn try_resume(&self) -> bool {
        let mut state = self.state.lock().expect("pause barrier poisoned");
        if state.paused && !state.requested {
            state.paused = false;
            self.cvar.notify_all();
            return true;
        }
        false
    }

    /// True while the executor sits behind the barrier.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().expect("pause barrier poisoned").paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn handshake_round_trip() {
        let barrier = Arc::new(PauseBarrier::new());
        assert!(!barrier.is_requested());

        barrier.request_pause();
        assert!(barrier.is_requested());
        assert!(!barrier.is_paused());

        let waiter = {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait_paused(Duration::from_secs(2)))
        };
        barrier.acknowledge();
        assert!(waiter.join().unwrap());
        assert!(barrier.is_paused());

        barrier.release();
        assert!(barrier.try_resume());
        assert!(!barrier.is_paused());
    }

    #[test]
    fn wait_times_out_without_acknowledgement() {
        let barrier = PauseBarrier::new();
        barrier.request_pause();
        assert!(!barrier.wait_paused(Duration::from_millis(20)));
        barrier.release();
    }

    #[test]
    fn resume_requires_release() {
        let barrier = PauseBarrier::new();
        barrier.request_pause();
        barrier.acknowledge();
        assert!(!barrier.try_resume());
        barrier.release();
        assert!(barrier.try_resume());
    }
}
