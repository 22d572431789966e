//! Gesture handlers: the state machines that turn host input into touches.
//!
//! # The handler contract (for beginners)
//!
//! Every handler implements [`InputHandler`].  The chain offers key, mouse
//! and wheel events to handlers in priority order; a handler returns `true`
//! to consume the event and stop the walk.
//!
//! Handlers never talk to the transport, the clock or the random generator
//! directly.  Each call receives a [`HandlerContext`] that lends them for the
//! duration of the call.  That keeps the handlers single-threaded plain data
//! and lets tests drive them with a manual clock and a seeded generator.
//!
//! A handler owns at most one active touch-sequence id (`0` = none).  On
//! `reset()` or `on_focus_lost()` an active touch is always lifted with an Up
//! at its last position first, so no finger is left on the glass.
//!
//! # Sub-modules
//!
//! - **`steer_wheel`** – WASD virtual joystick with humanized paths.
//! - **`viewport`**    – mouse-look emulated as a repeated drag.
//! - **`free_look`**   – hotkey-gated secondary look touch.
//! - **`cursor`**      – tap-through when the pointer is visible.
//! - **`keyboard`**    – Android key translation.

pub mod cursor;
pub mod free_look;
pub mod keyboard;
pub mod steer_wheel;
pub mod viewport;

use std::time::Instant;

use keytouch_core::{KeyMap, PointF, SizeF};
use rand::rngs::StdRng;
use rand::Rng;

use super::input::{KeyInput, MouseInput, ViewSizes, WheelInput};
use super::output::ControlChannel;
use super::settings::HumanizeSettings;

pub use cursor::CursorHandler;
pub use free_look::FreeLookHandler;
pub use keyboard::KeyboardHandler;
pub use steer_wheel::SteerWheelHandler;
pub use viewport::ViewportHandler;

/// Everything a handler may use during one call.
pub struct HandlerContext<'a> {
    pub out: &'a ControlChannel,
    pub keymap: &'a KeyMap,
    pub humanize: &'a HumanizeSettings,
    pub rng: &'a mut StdRng,
    /// Logical time of the call.  For timer callbacks this is the deadline
    /// that fired, so re-armed timers keep a stable cadence.
    pub now: Instant,
    pub sizes: ViewSizes,
    reset_view_requested: bool,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        out: &'a ControlChannel,
        keymap: &'a KeyMap,
        humanize: &'a HumanizeSettings,
        rng: &'a mut StdRng,
        now: Instant,
        sizes: ViewSizes,
    ) -> Self {
        Self {
            out,
            keymap,
            humanize,
            rng,
            now,
            sizes,
            reset_view_requested: false,
        }
    }

    /// Asks the owner to re-center the Viewport after the current call.
    pub fn request_reset_view(&mut self) {
        self.reset_view_requested = true;
    }

    /// Returns and clears the pending re-center request.
    pub fn take_reset_view_request(&mut self) -> bool {
        std::mem::take(&mut self.reset_view_requested)
    }

    /// Applies the configured anchor jitter to a normalized position.
    pub fn jittered(&mut self, pos: PointF) -> PointF {
        random_offset(pos, self.humanize.random_offset, self.sizes.target(), self.rng)
    }
}

/// Common interface of the gesture handlers.
pub trait InputHandler {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    /// Called once when the handler joins a live chain.
    fn init(&mut self, _ctx: &mut HandlerContext<'_>) {}

    fn handle_key(&mut self, _input: &KeyInput, _ctx: &mut HandlerContext<'_>) -> bool {
        false
    }

    fn handle_mouse(&mut self, _input: &MouseInput, _ctx: &mut HandlerContext<'_>) -> bool {
        false
    }

    fn handle_wheel(&mut self, _input: &WheelInput, _ctx: &mut HandlerContext<'_>) -> bool {
        false
    }

    fn on_focus_lost(&mut self, ctx: &mut HandlerContext<'_>) {
        self.reset(ctx);
    }

    /// Lifts any active touch and clears all transient state.  Must be
    /// idempotent.
    fn reset(&mut self, ctx: &mut HandlerContext<'_>);

    /// Earliest armed timer, if any.
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    /// Runs every timer due at `ctx.now`.
    fn on_timer(&mut self, _ctx: &mut HandlerContext<'_>) {}
}

/// Jitters `pos` by up to `level * 0.5` pixels of `size` on each axis.
///
/// Returns `pos` unchanged when the level is zero or the size is unusable.
/// The result stays inside `0.001..=0.999` so a jittered touch never lands
/// exactly on the screen edge.
pub fn random_offset(pos: PointF, level: u32, size: SizeF, rng: &mut StdRng) -> PointF {
    if level == 0 || !size.is_valid() {
        return pos;
    }
    let max_px = f64::from(level) * 0.5;
    let dx = (rng.random::<f64>() - 0.5) * 2.0 * max_px / size.width;
    let dy = (rng.random::<f64>() - 0.5) * 2.0 * max_px / size.height;
    PointF::new(
        (pos.x + dx).clamp(0.001, 0.999),
        (pos.y + dy).clamp(0.001, 0.999),
    )
}

/// Shared fixtures for handler unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use keytouch_core::protocol::{decode_all, Packet};
    use keytouch_core::TouchSequence;
    use rand::SeedableRng;

    use super::*;
    use crate::application::output::ControlSink;

    #[derive(Default)]
    pub struct PacketLog {
        pub bytes: Mutex<Vec<u8>>,
    }

    impl ControlSink for PacketLog {
        fn send(&self, bytes: &[u8]) -> i64 {
            self.bytes.lock().unwrap().extend_from_slice(bytes);
            bytes.len() as i64
        }
    }

    impl PacketLog {
        pub fn packets(&self) -> Vec<Packet> {
            decode_all(&self.bytes.lock().unwrap()).unwrap()
        }

        pub fn clear(&self) {
            self.bytes.lock().unwrap().clear();
        }
    }

    /// Owns everything a [`HandlerContext`] borrows.
    pub struct Harness {
        pub log: Arc<PacketLog>,
        pub out: ControlChannel,
        pub keymap: KeyMap,
        pub humanize: HumanizeSettings,
        pub rng: StdRng,
        pub now: Instant,
        pub sizes: ViewSizes,
    }

    impl Harness {
        pub fn new(keymap: KeyMap) -> Self {
            let log = Arc::new(PacketLog::default());
            let out = ControlChannel::new(log.clone(), Arc::new(TouchSequence::new()));
            Self {
                log,
                out,
                keymap,
                humanize: HumanizeSettings::default(),
                rng: StdRng::seed_from_u64(7),
                now: Instant::now(),
                sizes: ViewSizes::new(SizeF::new(1920.0, 1080.0), SizeF::new(960.0, 540.0)),
            }
        }

        pub fn ctx(&mut self) -> HandlerContext<'_> {
            HandlerContext::new(
                &self.out,
                &self.keymap,
                &self.humanize,
                &mut self.rng,
                self.now,
                self.sizes,
            )
        }

        pub fn advance_ms(&mut self, ms: u64) {
            self.now += std::time::Duration::from_millis(ms);
        }

        /// Fires the handler's timers in deadline order up to `self.now`.
        pub fn run_timers(&mut self, handler: &mut dyn InputHandler) {
            let until = self.now;
            while let Some(deadline) = handler.next_deadline() {
                if deadline > until {
                    break;
                }
                let mut ctx = HandlerContext::new(
                    &self.out,
                    &self.keymap,
                    &self.humanize,
                    &mut self.rng,
                    deadline,
                    self.sizes,
                );
                handler.on_timer(&mut ctx);
            }
        }
    }

    pub fn touches(packets: &[Packet]) -> Vec<(u8, keytouch_core::TouchAction, u16, u16)> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::Touch { seq, action, x, y } => Some((*seq, *action, *x, *y)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_random_offset_level_zero_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = PointF::new(0.3, 0.7);
        assert_eq!(random_offset(p, 0, SizeF::new(100.0, 100.0), &mut rng), p);
    }

    #[test]
    fn test_random_offset_invalid_size_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = PointF::new(0.3, 0.7);
        assert_eq!(random_offset(p, 50, SizeF::default(), &mut rng), p);
    }

    #[test]
    fn test_random_offset_is_bounded_by_level() {
        // Arrange
        let mut rng = StdRng::seed_from_u64(9);
        let size = SizeF::new(1000.0, 500.0);
        let level = 20;

        // Act / Assert – 10 px max on each axis
        for _ in 0..200 {
            let p = random_offset(PointF::CENTER, level, size, &mut rng);
            assert!((p.x - 0.5).abs() <= 10.0 / 1000.0 + 1e-12);
            assert!((p.y - 0.5).abs() <= 10.0 / 500.0 + 1e-12);
        }
    }

    #[test]
    fn test_random_offset_stays_off_the_edge() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let p = random_offset(PointF::new(0.0, 1.0), 100, SizeF::new(100.0, 100.0), &mut rng);
            assert!(p.within(0.001, 0.999));
        }
    }
}
