//! The guarded frame-grab callback slot.
//!
//! One slot can be shared by several engines.  Each engine registers its
//! grabber under its own owner token, so an engine being torn down can only
//! clear the grabber it installed and never a newer engine's.  Scripts call
//! [`FrameSlot::grab`] from their workers; unregistering waits (bounded) for
//! any grab still in progress so the grabber is not released mid-call.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::application::lock;
use crate::application::script_bridge::{Frame, FrameGrabber};

#[derive(Default)]
struct SlotState {
    grabber: Option<Arc<dyn FrameGrabber>>,
    owner: u64,
    in_flight: usize,
}

#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    idle: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `grabber` and makes `owner` the active token.
    pub fn register(&self, owner: u64, grabber: Arc<dyn FrameGrabber>) {
        let mut state = lock(&self.state);
        state.grabber = Some(grabber);
        state.owner = owner;
        debug!(owner, "frame grabber registered");
    }

    /// Clears the grabber if `owner` still holds the slot, then waits up to
    /// `wait` for in-flight grabs to finish.
    ///
    /// Returns `false` if another owner holds the slot or the wait timed out.
    pub fn unregister(&self, owner: u64, wait: Duration) -> bool {
        let mut state = lock(&self.state);
        if state.owner != owner {
            return false;
        }
        state.grabber = None;
        state.owner = 0;

        let deadline = Instant::now() + wait;
        while state.in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                warn!(in_flight = state.in_flight, "frame grab still running at unregister");
                return false;
            }
            state = match self.idle.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        debug!(owner, "frame grabber unregistered");
        true
    }

    /// Token of the engine currently holding the slot, `0` when empty.
    pub fn owner(&self) -> u64 {
        lock(&self.state).owner
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight
    }

    /// Grabs a frame through the registered grabber, if any.
    pub fn grab(&self) -> Option<Frame> {
        let grabber = {
            let mut state = lock(&self.state);
            let grabber = state.grabber.clone()?;
            state.in_flight += 1;
            grabber
        };
        let _guard = InFlight(self);
        grabber.grab().filter(|frame| !frame.is_empty())
    }
}

/// Decrements the in-flight count even if the grabber panics.
struct InFlight<'a>(&'a FrameSlot);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.0.state);
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.0.idle.notify_all();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
