//! ViewportHandler: mouse-look emulated as an endless drag.
//!
//! # How mouse-look becomes touches (for beginners)
//!
//! Touch games turn the camera when a finger drags across the right half of
//! the screen.  A mouse has no edges, a screen does.  So the handler keeps one
//! finger down and moves it by each mouse delta; when the finger would leave
//! the inner 5–95 % box it is lifted at the edge and, 5 ms later, put down
//! again at the start position carrying the part of the motion that did not
//! fit.  After one second without motion the finger is also lifted and
//! re-centered so the next flick has the whole screen available.
//!
//! Deltas are not applied directly.  They are accumulated until the next
//! event-loop turn (a zero-delay timer) and passed through a tiny jitter gate
//! and an exponential moving average, which removes sensor noise without
//! adding visible lag.

use std::time::Instant;

use keytouch_core::{PointF, TouchAction};
use tracing::debug;

use super::{HandlerContext, InputHandler};
use crate::application::timer::{earliest, Timer};

pub const DEFAULT_PRIORITY: i32 = 80;

const EDGE_MIN: f64 = 0.05;
const EDGE_MAX: f64 = 0.95;
const REPRESS_DELAY_MS: u64 = 5;
const IDLE_RELEASE_MS: u64 = 1_000;
const JITTER_THRESHOLD: f64 = 0.000_08;
const EMA_FACTOR: f64 = 0.85;
const MAX_OVERSHOOT: f64 = 0.25;
const NEAR_CENTER: f64 = 0.01;

pub struct ViewportHandler {
    priority: i32,
    seq_id: u32,
    touching: bool,
    last_pos: PointF,
    waiting_for_center_repress: bool,
    pending_center: PointF,
    pending_overshoot: PointF,
    idle_completed: bool,
    pending_delta: PointF,
    remainder: PointF,
    smoothed: PointF,
    flush_timer: Timer,
    repress_timer: Timer,
    idle_timer: Timer,
}

impl ViewportHandler {
    pub fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            seq_id: 0,
            touching: false,
            last_pos: PointF::default(),
            waiting_for_center_repress: false,
            pending_center: PointF::CENTER,
            pending_overshoot: PointF::default(),
            idle_completed: false,
            pending_delta: PointF::default(),
            remainder: PointF::default(),
            smoothed: PointF::default(),
            flush_timer: Timer::new(),
            repress_timer: Timer::new(),
            idle_timer: Timer::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn waiting_for_center_repress(&self) -> bool {
        self.waiting_for_center_repress
    }

    pub fn last_pos(&self) -> PointF {
        self.last_pos
    }

    pub fn seq_id(&self) -> u32 {
        self.seq_id
    }

    fn start_pos(ctx: &HandlerContext<'_>) -> PointF {
        ctx.keymap
            .mouse_move()
            .map(|m| m.start_pos)
            .unwrap_or(PointF::CENTER)
    }

    /// Puts the look finger down at the configured start position.
    pub fn start_touch(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.touching {
            return;
        }
        let pos = ctx.jittered(Self::start_pos(ctx));
        self.seq_id = ctx.out.next_seq();
        ctx.out.send_touch(self.seq_id, TouchAction::Down, pos);
        self.last_pos = pos;
        self.touching = true;
        debug!(seq_id = self.seq_id, "viewport touch down");
    }

    /// Queues a normalized delta; it is applied on the next loop turn.
    pub fn add_move_delta(&mut self, delta: PointF, ctx: &mut HandlerContext<'_>) {
        self.pending_delta += delta;
        if !self.flush_timer.is_active() {
            self.flush_timer.start_ms(ctx.now, 0);
        }
    }

    /// Lifts the look finger and drops any queued delta or pending re-center.
    pub fn stop_touch(&mut self, ctx: &mut HandlerContext<'_>) {
        self.flush_timer.stop();
        self.pending_delta = PointF::default();
        self.repress_timer.stop();
        self.waiting_for_center_repress = false;
        self.pending_overshoot = PointF::default();
        self.idle_timer.stop();
        self.idle_completed = false;
        self.remainder = PointF::default();
        self.smoothed = PointF::default();
        if self.touching {
            ctx.out.send_touch(self.seq_id, TouchAction::Up, self.last_pos);
            self.touching = false;
            self.seq_id = 0;
            debug!("viewport touch up");
        }
    }

    /// Re-centers the look finger.  Does nothing when no finger is down, a
    /// re-center is already pending or the finger is already at the start
    /// position.
    pub fn reset_view(&mut self, ctx: &mut HandlerContext<'_>) {
        if !self.touching || self.waiting_for_center_repress {
            return;
        }
        let center = Self::start_pos(ctx);
        if (self.last_pos - center).length() < NEAR_CENTER {
            return;
        }
        self.idle_timer.stop();
        ctx.out.send_touch(self.seq_id, TouchAction::Up, self.last_pos);
        self.touching = false;
        self.begin_recenter(center, PointF::default(), ctx);
    }

    fn begin_recenter(&mut self, center: PointF, overshoot: PointF, ctx: &mut HandlerContext<'_>) {
        self.waiting_for_center_repress = true;
        self.pending_center = center;
        self.pending_overshoot = overshoot;
        self.repress_timer.start_ms(ctx.now, REPRESS_DELAY_MS);
    }

    fn flush(&mut self, ctx: &mut HandlerContext<'_>) {
        let delta = std::mem::take(&mut self.pending_delta);
        if self.waiting_for_center_repress {
            self.pending_overshoot += delta;
            return;
        }
        if delta == PointF::default() {
            return;
        }
        self.idle_completed = false;
        self.idle_timer.start_ms(ctx.now, IDLE_RELEASE_MS);
        self.process_move(delta, ctx);
    }

    fn process_move(&mut self, delta: PointF, ctx: &mut HandlerContext<'_>) {
        self.remainder += delta;
        if self.remainder.length() < JITTER_THRESHOLD {
            return;
        }
        let sample = std::mem::take(&mut self.remainder);
        self.smoothed = sample * EMA_FACTOR + self.smoothed * (1.0 - EMA_FACTOR);

        let next = self.last_pos + self.smoothed;
        if self.touching && !next.within(EDGE_MIN, EDGE_MAX) {
            self.idle_timer.stop();
            let edge = next.clamped(EDGE_MIN, EDGE_MAX);
            ctx.out.send_touch(self.seq_id, TouchAction::Move, edge);
            ctx.out.send_touch(self.seq_id, TouchAction::Up, edge);
            self.touching = false;
            self.last_pos = edge;
            let overshoot = cap_length(next - edge, MAX_OVERSHOOT);
            self.begin_recenter(Self::start_pos(ctx), overshoot, ctx);
            return;
        }

        self.last_pos = next;
        if self.touching {
            ctx.out.send_touch(self.seq_id, TouchAction::Move, next);
        }
    }

    fn on_repress(&mut self, ctx: &mut HandlerContext<'_>) {
        if !self.waiting_for_center_repress {
            return;
        }
        let pos = ctx.jittered(self.pending_center);
        self.seq_id = ctx.out.next_seq();
        ctx.out.send_touch(self.seq_id, TouchAction::Down, pos);
        self.touching = true;

        let target = (pos + cap_length(self.pending_overshoot, MAX_OVERSHOOT)).clamped(EDGE_MIN, EDGE_MAX);
        ctx.out.send_touch(self.seq_id, TouchAction::Move, target);
        self.last_pos = target;

        self.waiting_for_center_repress = false;
        self.pending_overshoot = PointF::default();
        if !self.idle_completed {
            self.idle_timer.start_ms(ctx.now, IDLE_RELEASE_MS);
        }
    }

    fn on_idle(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.waiting_for_center_repress || !self.touching {
            return;
        }
        ctx.out.send_touch(self.seq_id, TouchAction::Up, self.last_pos);
        self.touching = false;
        self.idle_completed = true;
        self.smoothed = PointF::default();
        self.begin_recenter(Self::start_pos(ctx), PointF::default(), ctx);
    }
}

impl Default for ViewportHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler for ViewportHandler {
    fn name(&self) -> &'static str {
        "Viewport"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn reset(&mut self, ctx: &mut HandlerContext<'_>) {
        self.stop_touch(ctx);
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest(
            earliest(self.flush_timer.deadline(), self.repress_timer.deadline()),
            self.idle_timer.deadline(),
        )
    }

    fn on_timer(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.flush_timer.fire_if_due(ctx.now) {
            self.flush(ctx);
        }
        if self.repress_timer.fire_if_due(ctx.now) {
            self.on_repress(ctx);
        }
        if self.idle_timer.fire_if_due(ctx.now) {
            self.on_idle(ctx);
        }
    }
}

fn cap_length(v: PointF, max: f64) -> PointF {
    let len = v.length();
    if len > max {
        v * (max / len)
    } else {
        v
    }
}
