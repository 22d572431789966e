//! Time source and single-shot timers for the main event loop.
//!
//! # How timers work here (for beginners)
//!
//! Gesture handlers need delayed work: "send the next joystick step in 5 ms",
//! "lift the camera finger after 1 s of idle".  Instead of spawning tasks, a
//! handler owns plain [`Timer`] values that only remember a deadline.  The
//! session asks every handler for its earliest deadline and, on each poll,
//! fires whatever is due.  All firing therefore happens on the thread that
//! drives the session, so handler state never needs a lock.
//!
//! The current instant comes from a [`Clock`].  Production code uses
//! [`SystemClock`]; tests use [`ManualClock`] and advance it explicitly, which
//! makes timer-driven gestures fully deterministic.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// A single-shot timer: armed with a deadline, disarmed when it fires.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// (Re)arms the timer to fire `delay` after `now`.
    pub fn start(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn start_ms(&mut self, now: Instant, ms: u64) {
        self.start(now, Duration::from_millis(ms));
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if d <= now)
    }

    /// Disarms the timer and returns `true` if it was due at `now`.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.deadline = None;
            return true;
        }
        false
    }
}

/// Earliest of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
