//! Two-stage watchdog guarding one script sandbox.
//!
//! # How it works (for beginners)
//!
//! A script that never calls `sleep` could spin forever and hold its touches
//! down.  Each sandbox therefore gets a small watchdog thread:
//!
//! ```text
//!   Idle ──arm()──▶ Armed ──no feed for `soft`──▶ SoftExpired ──`hard` later──▶ HardExpired
//!                    ▲  │                              │
//!                    └──┘ feed()                       └──▶ stop() at any point ▶ Stopped
//! ```
//!
//! `feed()` only restarts the window while `Armed`; once the soft deadline has
//! passed the script is already being asked to stop and feeding no longer
//! helps.  The callbacks run on the watchdog thread without the state lock
//! held.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::application::lock;

/// Where a watchdog is in its escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Armed,
    SoftExpired,
    HardExpired,
    Stopped,
}

struct Inner {
    state: WatchdogState,
    deadline: Instant,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
}

/// Handle to a running watchdog thread.  Dropping it stops the thread.
pub struct Watchdog {
    shared: Arc<Shared>,
    soft: Duration,
}

type Callback = Box<dyn FnOnce() + Send>;

impl Watchdog {
    /// Spawns the watchdog thread in the `Idle` state.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread could not be created.
    pub fn spawn(
        name: String,
        soft: Duration,
        hard: Duration,
        on_soft: impl FnOnce() + Send + 'static,
        on_hard: impl FnOnce() + Send + 'static,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: WatchdogState::Idle,
                deadline: Instant::now(),
            }),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        thread::Builder::new().name(name).spawn(move || {
            run(&thread_shared, hard, Box::new(on_soft), Box::new(on_hard));
        })?;

        Ok(Self { shared, soft })
    }

    /// Starts the soft window.  Has no effect unless `Idle`.
    pub fn arm(&self) {
        let mut inner = lock(&self.shared.inner);
        if inner.state == WatchdogState::Idle {
            inner.state = WatchdogState::Armed;
            inner.deadline = Instant::now() + self.soft;
            self.shared.wake.notify_all();
        }
    }

    /// Restarts the soft window.  Only honoured while `Armed`.
    pub fn feed(&self) {
        let mut inner = lock(&self.shared.inner);
        if inner.state == WatchdogState::Armed {
            inner.deadline = Instant::now() + self.soft;
        }
    }

    /// Ends the watchdog.  Terminal: a stopped watchdog never fires.
    pub fn stop(&self) {
        let mut inner = lock(&self.shared.inner);
        if inner.state != WatchdogState::HardExpired {
            inner.state = WatchdogState::Stopped;
        }
        self.shared.wake.notify_all();
    }

    pub fn state(&self) -> WatchdogState {
        lock(&self.shared.inner).state
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared, hard: Duration, on_soft: Callback, on_hard: Callback) {
    let mut on_soft = Some(on_soft);
    let mut inner = lock(&shared.inner);
    loop {
        match inner.state {
            WatchdogState::Idle => inner = wait(shared, inner),
            WatchdogState::Armed | WatchdogState::SoftExpired => {
                let now = Instant::now();
                if now < inner.deadline {
                    let timeout = inner.deadline - now;
                    inner = wait_timeout(shared, inner, timeout);
                    continue;
                }

                if inner.state == WatchdogState::Armed {
                    inner.state = WatchdogState::SoftExpired;
                    inner.deadline = now + hard;
                    drop(inner);
                    trace!("watchdog soft deadline passed");
                    if let Some(callback) = on_soft.take() {
                        callback();
                    }
                    inner = lock(&shared.inner);
                } else {
                    inner.state = WatchdogState::HardExpired;
                    drop(inner);
                    trace!("watchdog hard deadline passed");
                    on_hard();
                    return;
                }
            }
            WatchdogState::HardExpired | WatchdogState::Stopped => return,
        }
    }
}

fn wait<'a>(shared: &'a Shared, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
    match shared.wake.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait_timeout<'a>(
    shared: &'a Shared,
    guard: MutexGuard<'a, Inner>,
    timeout: Duration,
) -> MutexGuard<'a, Inner> {
    match shared.wake.wait_timeout(guard, timeout) {
        Ok((guard, _)) => guard,
        Err(poisoned) => poisoned.into_inner().0,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counters {
        soft: Arc<AtomicUsize>,
        hard: Arc<AtomicUsize>,
    }

    fn spawn(soft_ms: u64, hard_ms: u64) -> (Watchdog, Counters) {
        let soft = Arc::new(AtomicUsize::new(0));
        let hard = Arc::new(AtomicUsize::new(0));
        let (s, h) = (Arc::clone(&soft), Arc::clone(&hard));
        let dog = Watchdog::spawn(
            "watchdog-test".into(),
            Duration::from_millis(soft_ms),
            Duration::from_millis(hard_ms),
            move || {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                h.fetch_add(1, Ordering::SeqCst);
            },
        )
        .expect("spawn watchdog");
        (dog, Counters { soft, hard })
    }

    fn wait_for(dog: &Watchdog, state: WatchdogState, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if dog.state() == state {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        dog.state() == state
    }

    #[test]
    fn test_idle_watchdog_never_fires() {
        let (dog, counters) = spawn(20, 20);

        thread::sleep(Duration::from_millis(80));

        assert_eq!(dog.state(), WatchdogState::Idle);
        assert_eq!(counters.soft.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unfed_watchdog_escalates_soft_then_hard() {
        // Arrange
        let (dog, counters) = spawn(40, 40);
        let armed_at = Instant::now();

        // Act
        dog.arm();
        assert!(wait_for(&dog, WatchdogState::SoftExpired, Duration::from_secs(2)));
        let soft_elapsed = armed_at.elapsed();
        assert!(wait_for(&dog, WatchdogState::HardExpired, Duration::from_secs(2)));
        let hard_elapsed = armed_at.elapsed();

        // Assert
        assert!(soft_elapsed >= Duration::from_millis(40));
        assert!(hard_elapsed >= Duration::from_millis(80));
        assert_eq!(counters.soft.load(Ordering::SeqCst), 1);
        assert_eq!(counters.hard.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_feeding_keeps_watchdog_armed() {
        let (dog, counters) = spawn(60, 20);
        dog.arm();

        for _ in 0..8 {
            thread::sleep(Duration::from_millis(20));
            dog.feed();
        }

        assert_eq!(dog.state(), WatchdogState::Armed);
        assert_eq!(counters.soft.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_after_soft_prevents_hard() {
        // Arrange
        let (dog, counters) = spawn(20, 200);
        dog.arm();
        assert!(wait_for(&dog, WatchdogState::SoftExpired, Duration::from_secs(2)));

        // Act
        dog.stop();
        thread::sleep(Duration::from_millis(300));

        // Assert
        assert_eq!(dog.state(), WatchdogState::Stopped);
        assert_eq!(counters.hard.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_feed_after_soft_expiry_does_not_rearm() {
        let (dog, _counters) = spawn(20, 500);
        dog.arm();
        assert!(wait_for(&dog, WatchdogState::SoftExpired, Duration::from_secs(2)));

        dog.feed();

        assert_eq!(dog.state(), WatchdogState::SoftExpired);
    }

    #[test]
    fn test_stop_is_terminal() {
        let (dog, counters) = spawn(20, 20);

        dog.stop();
        dog.arm();
        thread::sleep(Duration::from_millis(80));

        assert_eq!(dog.state(), WatchdogState::Stopped);
        assert_eq!(counters.soft.load(Ordering::SeqCst), 0);
    }
}
