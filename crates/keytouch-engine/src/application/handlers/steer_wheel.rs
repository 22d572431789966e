//! SteerWheelHandler: WASD keys drive a virtual joystick thumb.
//!
//! # How the joystick moves (for beginners)
//!
//! The first direction key puts a finger down at the wheel center; the
//! finger is then dragged toward `center + offset`, where the offset is the
//! sum of the held directions.  Releasing every key lifts the finger.
//!
//! A real thumb never jumps, so the drag is split into a queue of small steps
//! along a gently bowed path and one step is sent per timer tick.  Each time
//! the set of held keys changes the handler draws a small random rotation and
//! length error for diagonals, and while the keys stay held an idle "fidget"
//! timer draws smaller ones every few seconds.  Both are low-pass filtered so
//! the thumb drifts rather than snaps.
//!
//! Pressing the first key arms a 5 ms timer before anything is sent.  A second
//! key landing inside that window (W then D for a diagonal) is committed
//! together with the first, avoiding a brief straight-up move.

use std::collections::VecDeque;
use std::f64::consts::{FRAC_PI_4, PI};

use keytouch_core::keymap::{Direction, SteerWheelBinding};
use keytouch_core::{InputKey, PointF, TouchAction};
use rand::Rng;
use tracing::debug;

use super::{HandlerContext, InputHandler};
use crate::application::input::KeyInput;
use crate::application::timer::{earliest, Timer};

pub const DEFAULT_PRIORITY: i32 = 20;

const FIRST_PRESS_DELAY_MS: u64 = 5;

const CHANGE_ANGLE_VARIATION: f64 = 0.30;
const CHANGE_LENGTH_VARIATION: f64 = 0.10;
const FIDGET_ANGLE_VARIATION: f64 = 0.10;
const FIDGET_LENGTH_VARIATION: f64 = 0.05;
const FIDGET_MIN_MS: u64 = 2_000;
const FIDGET_SPAN_MS: u64 = 6_000;
const SMOOTH_FACTOR: f64 = 0.2;

// Path generation.
const DISTANCE_STEP: f64 = 0.01;
const LOWEST_STEP_MS: u64 = 2;
const HIGHEST_STEP_MS: u64 = 8;

pub struct SteerWheelHandler {
    priority: i32,
    pressed: [bool; 4],
    seq_id: u32,
    is_first_press: bool,
    current_pos: PointF,
    path: VecDeque<(PointF, u64)>,
    last_state: u8,
    target_angle: f64,
    current_angle: f64,
    target_length: f64,
    current_length: f64,
    coefficients: [f64; 4],
    first_press_timer: Timer,
    step_timer: Timer,
    fidget_timer: Timer,
}

impl SteerWheelHandler {
    pub fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            pressed: [false; 4],
            seq_id: 0,
            is_first_press: true,
            current_pos: PointF::default(),
            path: VecDeque::new(),
            last_state: 0,
            target_angle: 0.0,
            current_angle: 0.0,
            target_length: 1.0,
            current_length: 1.0,
            coefficients: [1.0; 4],
            first_press_timer: Timer::new(),
            step_timer: Timer::new(),
            fidget_timer: Timer::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Active touch id, `0` when the thumb is up.
    pub fn seq_id(&self) -> u32 {
        self.seq_id
    }

    pub fn current_pos(&self) -> PointF {
        self.current_pos
    }

    pub fn coefficients(&self) -> [f64; 4] {
        self.coefficients
    }

    fn pressed_count(&self) -> usize {
        self.pressed.iter().filter(|p| **p).count()
    }

    fn state_mask(&self) -> u8 {
        Direction::ALL
            .iter()
            .filter(|d| self.pressed[**d as usize])
            .fold(0, |mask, d| mask | d.bit())
    }

    /// Scales each direction's offset.  Applied immediately when the thumb
    /// is down with keys held.
    pub fn set_coefficient(&mut self, up: f64, down: f64, left: f64, right: f64, ctx: &mut HandlerContext<'_>) {
        self.coefficients = [up, down, left, right];
        if self.seq_id != 0 && self.pressed_count() > 0 {
            let keymap = ctx.keymap;
            if let Some(wheel) = keymap.steer_wheel() {
                self.step_timer.stop();
                self.path.clear();
                self.execute_move(wheel, ctx);
            }
        }
    }

    pub fn reset_coefficient(&mut self) {
        self.coefficients = [1.0; 4];
    }

    /// Re-syncs after the remote scene reset its own joystick: lifts the
    /// thumb and, if keys are still held, puts it back down at once without
    /// the first-press delay.
    pub fn reset_wheel(&mut self, ctx: &mut HandlerContext<'_>) {
        self.first_press_timer.stop();
        self.step_timer.stop();
        self.path.clear();
        self.lift(ctx);
        self.is_first_press = true;

        if self.pressed_count() > 0 {
            let keymap = ctx.keymap;
            if let Some(wheel) = keymap.steer_wheel() {
                self.is_first_press = false;
                self.execute_move(wheel, ctx);
            }
        }
    }

    fn process_key(
        &mut self,
        direction: Direction,
        pressed: bool,
        wheel: &SteerWheelBinding,
        ctx: &mut HandlerContext<'_>,
    ) {
        self.pressed[direction as usize] = pressed;

        if self.pressed_count() == 0 {
            self.first_press_timer.stop();
            self.is_first_press = true;
            self.step_timer.stop();
            self.path.clear();
            self.lift(ctx);
            return;
        }

        if self.is_first_press && pressed {
            self.is_first_press = false;
            self.first_press_timer.start_ms(ctx.now, FIRST_PRESS_DELAY_MS);
            return;
        }

        if self.first_press_timer.is_active() {
            return;
        }

        self.execute_move(wheel, ctx);
    }

    fn execute_move(&mut self, wheel: &SteerWheelBinding, ctx: &mut HandlerContext<'_>) {
        let state = self.state_mask();
        if state != self.last_state {
            self.last_state = state;
            self.draw_targets(CHANGE_ANGLE_VARIATION, CHANGE_LENGTH_VARIATION, ctx);
            if !self.fidget_timer.is_active() && state != 0 {
                self.arm_fidget(ctx);
            }
        }

        self.current_angle += (self.target_angle - self.current_angle) * SMOOTH_FACTOR;
        self.current_length += (self.target_length - self.current_length) * SMOOTH_FACTOR;

        let mut offset = PointF::default();
        if self.pressed[Direction::Up as usize] {
            offset.y -= wheel.up.offset * self.coefficients[0];
        }
        if self.pressed[Direction::Down as usize] {
            offset.y += wheel.down.offset * self.coefficients[1];
        }
        if self.pressed[Direction::Left as usize] {
            offset.x -= wheel.left.offset * self.coefficients[2];
        }
        if self.pressed[Direction::Right as usize] {
            offset.x += wheel.right.offset * self.coefficients[3];
        }

        if self.pressed_count() > 1 && (offset.x != 0.0 || offset.y != 0.0) {
            let (sin, cos) = self.current_angle.sin_cos();
            offset = PointF::new(offset.x * cos - offset.y * sin, offset.x * sin + offset.y * cos);
        }
        offset = offset * self.current_length;

        self.step_timer.stop();
        self.path.clear();

        if self.seq_id == 0 {
            let anchor = ctx.jittered(wheel.center);
            self.seq_id = ctx.out.next_seq();
            self.current_pos = anchor;
            ctx.out.send_touch(self.seq_id, TouchAction::Down, anchor);
            debug!(seq_id = self.seq_id, "steer wheel down");
            self.path = build_path(anchor, anchor + offset, ctx);
        } else {
            self.path = build_path(self.current_pos, wheel.center + offset, ctx);
        }

        if !self.path.is_empty() {
            self.step_timer.start_ms(ctx.now, 0);
        }

        if state == 0 {
            self.fidget_timer.stop();
        }
    }

    fn draw_targets(&mut self, angle_variation: f64, length_variation: f64, ctx: &mut HandlerContext<'_>) {
        self.target_angle = (ctx.rng.random::<f64>() * 2.0 - 1.0) * angle_variation * FRAC_PI_4;
        self.target_length = 1.0 + (ctx.rng.random::<f64>() * 2.0 - 1.0) * length_variation;
    }

    fn arm_fidget(&mut self, ctx: &mut HandlerContext<'_>) {
        let delay = FIDGET_MIN_MS + ctx.rng.random_range(0..FIDGET_SPAN_MS);
        self.fidget_timer.start_ms(ctx.now, delay);
    }

    fn on_step(&mut self, ctx: &mut HandlerContext<'_>) {
        let Some((pos, delay)) = self.path.pop_front() else {
            return;
        };
        self.current_pos = pos;
        ctx.out.send_touch(self.seq_id, TouchAction::Move, pos);

        if self.path.is_empty() && self.pressed_count() == 0 {
            ctx.out.send_touch(self.seq_id, TouchAction::Up, pos);
            self.seq_id = 0;
            return;
        }
        if !self.path.is_empty() {
            self.step_timer.start_ms(ctx.now, delay);
        }
    }

    fn on_first_press(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.pressed_count() == 0 {
            return;
        }
        let keymap = ctx.keymap;
        if let Some(wheel) = keymap.steer_wheel() {
            self.execute_move(wheel, ctx);
        }
    }

    fn on_fidget(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.seq_id == 0 || self.pressed_count() == 0 {
            return;
        }
        self.draw_targets(FIDGET_ANGLE_VARIATION, FIDGET_LENGTH_VARIATION, ctx);
        let keymap = ctx.keymap;
        if let Some(wheel) = keymap.steer_wheel() {
            self.execute_move(wheel, ctx);
        }
        self.arm_fidget(ctx);
    }

    fn lift(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.seq_id != 0 {
            ctx.out.send_touch(self.seq_id, TouchAction::Up, self.current_pos);
            debug!(seq_id = self.seq_id, "steer wheel up");
            self.seq_id = 0;
        }
    }
}

impl Default for SteerWheelHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler for SteerWheelHandler {
    fn name(&self) -> &'static str {
        "SteerWheel"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle_key(&mut self, input: &KeyInput, ctx: &mut HandlerContext<'_>) -> bool {
        let keymap = ctx.keymap;
        let Some(wheel) = keymap.steer_wheel() else {
            return false;
        };
        let Some(direction) = wheel.direction_of(InputKey::Key(input.key)) else {
            return false;
        };
        self.process_key(direction, input.pressed, wheel, ctx);
        true
    }

    fn reset(&mut self, ctx: &mut HandlerContext<'_>) {
        self.first_press_timer.stop();
        self.fidget_timer.stop();
        self.step_timer.stop();
        self.lift(ctx);
        self.pressed = [false; 4];
        self.is_first_press = true;
        self.path.clear();
    }

    fn next_deadline(&self) -> Option<std::time::Instant> {
        earliest(
            earliest(self.first_press_timer.deadline(), self.step_timer.deadline()),
            self.fidget_timer.deadline(),
        )
    }

    fn on_timer(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.first_press_timer.fire_if_due(ctx.now) {
            self.on_first_press(ctx);
        }
        if self.step_timer.fire_if_due(ctx.now) {
            self.on_step(ctx);
        }
        if self.fidget_timer.fire_if_due(ctx.now) {
            self.on_fidget(ctx);
        }
    }
}

/// Splits `start → end` into timed steps along a bowed path.
///
/// Three sine components of rising frequency are added perpendicular to the
/// straight line; each is windowed by `sin(πt)` so the path leaves `start`
/// and reaches `end` exactly.  Higher smoothness gives more, slower steps.
fn build_path(start: PointF, end: PointF, ctx: &mut HandlerContext<'_>) -> VecDeque<(PointF, u64)> {
    let smooth = f64::from(ctx.humanize.steer_wheel_smooth);
    let curve = f64::from(ctx.humanize.steer_wheel_curve);
    let rng = &mut *ctx.rng;

    let delta = end - start;
    let distance = delta.length();
    let mut path = VecDeque::new();
    if distance < 0.0001 {
        path.push_back((end, LOWEST_STEP_MS));
        return path;
    }

    let smooth_mul = 1.0 + (smooth / 100.0) * 4.0;
    let steps = ((distance / (DISTANCE_STEP / smooth_mul)) as usize).max(1);
    let perp = PointF::new(-delta.y / distance, delta.x / distance);

    let mut sign = || if rng.random_bool(0.5) { 1.0 } else { -1.0 };
    let main_amp = (curve / 100.0) * 0.2 * distance * sign();
    let second_amp = (curve / 100.0) * 0.08 * distance * sign();
    let micro_amp = (curve / 100.0) * 0.03 * distance * sign();
    let second_freq = 1.5 + rng.random::<f64>();
    let micro_freq = 3.0 + rng.random::<f64>() * 2.0;
    let main_phase = rng.random::<f64>() * 0.2;
    let second_phase = rng.random::<f64>() * PI;
    let micro_phase = rng.random::<f64>() * PI * 2.0;

    let base_delay = (LOWEST_STEP_MS + HIGHEST_STEP_MS) as f64 / 2.0;
    let step_delay = (base_delay * (1.0 + smooth / 50.0)) as u64;

    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let window = (PI * t).sin();
        let bow = ((PI * (t + main_phase)).sin() * main_amp
            + (second_freq * PI * t + second_phase).sin() * second_amp
            + (micro_freq * PI * t + micro_phase).sin() * micro_amp)
            * window;
        let point = start + delta * t + perp * bow;
        path.push_back((point, step_delay));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{touches, Harness};
    use keytouch_core::{HostKey, KeyMap};

    const WHEEL_JSON: &str = r#"{
        "keyMapNodes": [{
            "type": "KMT_STEER_WHEEL",
            "centerPos": {"x": 0.2, "y": 0.7},
            "leftKey": "A", "rightKey": "D", "upKey": "W", "downKey": "S",
            "leftOffset": 0.1, "rightOffset": 0.1, "upOffset": 0.1, "downOffset": 0.1
        }]
    }"#;

    fn harness() -> Harness {
        Harness::new(KeyMap::from_json(WHEEL_JSON).unwrap())
    }

    fn key(h: &mut Harness, wheel: &mut SteerWheelHandler, input: KeyInput) -> bool {
        let mut ctx = h.ctx();
        wheel.handle_key(&input, &mut ctx)
    }

    #[test]
    fn test_unbound_key_is_not_consumed() {
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();

        assert!(!key(&mut h, &mut wheel, KeyInput::press(HostKey::Q)));
    }

    #[test]
    fn test_first_press_waits_for_combo_window() {
        // Arrange
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();

        // Act
        key(&mut h, &mut wheel, KeyInput::press(HostKey::W));

        // Assert – nothing until the 5 ms timer fires
        assert!(h.log.packets().is_empty());
        h.advance_ms(5);
        h.run_timers(&mut wheel);
        let sent = touches(&h.log.packets());
        assert_eq!(sent[0].1, TouchAction::Down);
        assert!(wheel.seq_id() != 0);
    }

    #[test]
    fn test_single_direction_reaches_offset_target() {
        // Arrange
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();

        // Act
        key(&mut h, &mut wheel, KeyInput::press(HostKey::W));
        h.advance_ms(1_000);
        h.run_timers(&mut wheel);

        // Assert – a single direction is never rotated, only scaled by 0.9..1.1
        let pos = wheel.current_pos();
        assert!((pos.x - 0.2).abs() < 1e-9);
        let travel = 0.7 - pos.y;
        assert!(travel > 0.1 * 0.9 - 1e-9 && travel < 0.1 * 1.1 + 1e-9, "travel {travel}");
    }

    #[test]
    fn test_release_all_sends_up_and_clears_seq() {
        // Arrange
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();
        key(&mut h, &mut wheel, KeyInput::press(HostKey::D));
        h.advance_ms(50);
        h.run_timers(&mut wheel);

        // Act
        key(&mut h, &mut wheel, KeyInput::release(HostKey::D));

        // Assert
        let sent = touches(&h.log.packets());
        assert_eq!(sent.last().unwrap().1, TouchAction::Up);
        assert_eq!(wheel.seq_id(), 0);
        assert!(!wheel.step_timer.is_active());
    }

    #[test]
    fn test_reset_is_idempotent() {
        // Arrange
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();
        key(&mut h, &mut wheel, KeyInput::press(HostKey::S));
        h.advance_ms(20);
        h.run_timers(&mut wheel);

        // Act
        {
            let mut ctx = h.ctx();
            wheel.reset(&mut ctx);
        }
        let after_first = h.log.packets().len();
        {
            let mut ctx = h.ctx();
            wheel.reset(&mut ctx);
        }

        // Assert
        let sent = touches(&h.log.packets());
        assert_eq!(sent.last().unwrap().1, TouchAction::Up);
        assert_eq!(h.log.packets().len(), after_first, "second reset must not send");
        assert_eq!(wheel.seq_id(), 0);
        assert!(wheel.next_deadline().is_none());
    }

    #[test]
    fn test_reset_wheel_resumes_without_delay() {
        // Arrange
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();
        key(&mut h, &mut wheel, KeyInput::press(HostKey::A));
        h.advance_ms(100);
        h.run_timers(&mut wheel);
        let first_seq = wheel.seq_id();
        h.log.clear();

        // Act
        {
            let mut ctx = h.ctx();
            wheel.reset_wheel(&mut ctx);
        }

        // Assert – Up for the old touch, Down for a new one, same call
        let sent = touches(&h.log.packets());
        assert_eq!(sent[0].1, TouchAction::Up);
        assert_eq!(sent[1].1, TouchAction::Down);
        assert_ne!(wheel.seq_id(), first_seq);
    }

    #[test]
    fn test_coefficient_scales_offset() {
        // Arrange
        let mut h = harness();
        let mut wheel = SteerWheelHandler::new();
        key(&mut h, &mut wheel, KeyInput::press(HostKey::W));
        h.advance_ms(500);
        h.run_timers(&mut wheel);
        let before = 0.7 - wheel.current_pos().y;

        // Act
        {
            let mut ctx = h.ctx();
            wheel.set_coefficient(2.0, 1.0, 1.0, 1.0, &mut ctx);
        }
        h.advance_ms(1_000);
        h.run_timers(&mut wheel);

        // Assert
        let after = 0.7 - wheel.current_pos().y;
        assert!(after > before * 1.5, "before {before}, after {after}");

        wheel.reset_coefficient();
        assert_eq!(wheel.coefficients(), [1.0; 4]);
    }

    #[test]
    fn test_build_path_ends_at_target() {
        let mut h = harness();
        let mut ctx = h.ctx();
        let start = PointF::new(0.2, 0.7);
        let end = PointF::new(0.3, 0.6);

        let path = build_path(start, end, &mut ctx);

        let (last, delay) = *path.back().unwrap();
        assert!((last - end).length() < 1e-9);
        assert_eq!(delay, 10);
        assert!(path.len() > 1);
    }

    #[test]
    fn test_build_path_short_distance_is_single_point() {
        let mut h = harness();
        let mut ctx = h.ctx();
        let p = PointF::new(0.5, 0.5);

        let path = build_path(p, p, &mut ctx);

        assert_eq!(path.len(), 1);
        assert_eq!(path[0], (p, LOWEST_STEP_MS));
    }
}
