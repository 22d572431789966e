//! InputDispatcher: routes host input to the handlers.
//!
//! The dispatcher owns the [`HandlerChain`] and the cursor-capture mode.
//!
//! - **Cursor visible**: mouse input taps through via the Cursor handler.
//! - **Cursor captured**: the pointer is pinned to the widget center; every
//!   move sample is turned into a delta, the pointer is warped back, and the
//!   delta drives the Viewport (or FreeLook while its key is held).
//!
//! Keys are offered to the chain first.  Whatever the chain does not consume
//! is resolved against the binding table and executed directly: Android keys
//! and scripts run here, unbound keys take the Keyboard default path.

use std::collections::HashSet;
use std::sync::Arc;

use keytouch_core::{Binding, HostKey, InputKey, Modifiers, PointF, SizeF};
use tracing::{debug, info, trace, warn};

use super::chain::HandlerChain;
use super::handlers::HandlerContext;
use super::input::{KeyInput, MouseInput, MouseKind, ViewSizes, WheelInput};
use super::script_bridge::ScriptBridge;

/// Slots in the multi-touch table.
pub const MULTI_TOUCH_SLOTS: usize = 10;

/// Controls the host pointer while input is captured.
///
/// The window layer implements this; tests use the generated mock.
#[cfg_attr(test, mockall::automock)]
pub trait CursorController: Send + Sync {
    /// Moves the pointer to a widget-local pixel position.
    fn warp_to(&self, local: PointF);

    /// Grabs (hides and confines) or releases the pointer.
    fn set_grabbed(&self, grabbed: bool);
}

/// A controller for hosts without a pointer, such as the headless runner.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedCursor;

impl CursorController for DetachedCursor {
    fn warp_to(&self, _local: PointF) {}

    fn set_grabbed(&self, _grabbed: bool) {}
}

pub struct InputDispatcher {
    chain: HandlerChain,
    cursor: Arc<dyn CursorController>,
    captured: bool,
    ignore_moves: u32,
    held: HashSet<InputKey>,
    last_modifier: Option<HostKey>,
    modifier_combo: bool,
    multi_touch: [i64; MULTI_TOUCH_SLOTS],
    mobile_size: SizeF,
}

impl InputDispatcher {
    pub fn new(chain: HandlerChain, cursor: Arc<dyn CursorController>) -> Self {
        Self {
            chain,
            cursor,
            captured: false,
            ignore_moves: 0,
            held: HashSet::new(),
            last_modifier: None,
            modifier_combo: false,
            multi_touch: [0; MULTI_TOUCH_SLOTS],
            mobile_size: SizeF::default(),
        }
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut HandlerChain {
        &mut self.chain
    }

    pub fn is_key_held(&self, key: InputKey) -> bool {
        self.held.contains(&key)
    }

    /// Move samples still to be discarded.
    pub fn pending_ignored_moves(&self) -> u32 {
        self.ignore_moves
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    pub fn key_event(&mut self, input: &KeyInput, scripts: &ScriptBridge, ctx: &mut HandlerContext<'_>) {
        let mut input = *input;
        if input.key == HostKey::Backtab {
            input.key = HostKey::Tab;
        }
        let key = InputKey::Key(input.key);

        if !input.auto_repeat {
            self.track_key(key, input.pressed, scripts);
            if input.pressed {
                if input.key.is_modifier() {
                    self.last_modifier = Some(input.key);
                    self.modifier_combo = false;
                } else if self
                    .last_modifier
                    .is_some_and(|m| self.held.contains(&InputKey::Key(m)))
                {
                    self.modifier_combo = true;
                }
            }
        }
        input.modifier_combo = self.modifier_combo;

        let keymap = ctx.keymap;
        if keymap.switch_key() == key {
            if input.pressed && !input.auto_repeat {
                self.toggle_cursor_captured(ctx);
            }
            return;
        }

        let modifiers = if input.key.is_modifier() {
            Modifiers::NONE
        } else {
            input.modifiers.binding_mask()
        };
        let mut binding = keymap.lookup_key(input.key, modifiers);
        if binding.is_none() && modifiers.contains(Modifiers::SHIFT) {
            if let Some(base) = input.key.unshifted() {
                binding = keymap.lookup_key(base, modifiers);
                if binding.is_some() {
                    input.key = base;
                }
            }
        }

        if input.auto_repeat {
            return;
        }

        if self.chain.dispatch_key(&input, ctx) {
            self.apply_view_reset(ctx);
            return;
        }

        match binding {
            Some(Binding::SteerWheel(_)) | Some(Binding::MouseMove(_)) => {}
            Some(Binding::AndroidKey { keycode, .. }) => {
                if let Some(keyboard) = self.chain.keyboard() {
                    keyboard.process_android_key(*keycode, input.pressed, ctx);
                }
            }
            Some(Binding::Script { trigger, pos, script }) => {
                self.track_script_slot(trigger.key.id(), input.pressed);
                scripts.run_binding_script(trigger.key, *pos, script, input.pressed);
            }
            Some(Binding::FreeLook(free_look)) => {
                if let Some(handler) = self.chain.free_look_mut() {
                    handler.process_key(free_look, &input, ctx);
                }
            }
            None => {
                if let Some(keyboard) = self.chain.keyboard() {
                    keyboard.process_default_key(&input, ctx);
                }
            }
        }
        self.apply_view_reset(ctx);
    }

    // ── Mouse ─────────────────────────────────────────────────────────────────

    pub fn mouse_event(&mut self, input: &MouseInput, scripts: &ScriptBridge, ctx: &mut HandlerContext<'_>) {
        let keymap = ctx.keymap;

        if let Some(button) = input.button {
            let key = InputKey::Mouse(button);
            match input.kind {
                MouseKind::Press => self.track_key(key, true, scripts),
                MouseKind::Release => self.track_key(key, false, scripts),
                MouseKind::Move => {}
            }
            if keymap.switch_key() == key {
                if input.kind == MouseKind::Press {
                    self.toggle_cursor_captured(ctx);
                }
                return;
            }
        }

        if !self.captured {
            if let Some(cursor) = self.chain.cursor_mut() {
                cursor.process_mouse(input, ctx);
            }
            return;
        }

        if self.chain.dispatch_mouse(input, ctx) {
            return;
        }

        if let (Some(button), MouseKind::Press | MouseKind::Release) = (input.button, input.kind) {
            if let Some(Binding::Script { trigger, pos, script }) = keymap.lookup_other(InputKey::Mouse(button)) {
                let pressed = input.kind == MouseKind::Press;
                self.track_script_slot(trigger.key.id(), pressed);
                scripts.run_binding_script(trigger.key, *pos, script, pressed);
            }
            return;
        }

        if keymap.is_valid_mouse_move_map() {
            self.process_mouse_move(input.local, ctx);
        }
    }

    fn process_mouse_move(&mut self, local: PointF, ctx: &mut HandlerContext<'_>) {
        if self.ignore_moves > 0 {
            self.ignore_moves -= 1;
            return;
        }
        let center = ctx.sizes.show.center();
        let delta = local - center;
        if delta.manhattan_length() < 1.0 {
            return;
        }
        self.ignore_moves = 1;
        self.cursor.warp_to(center);

        if let Some(free_look) = self.chain.free_look_mut() {
            if free_look.has_touch() {
                free_look.process_mouse_delta(delta, ctx);
                return;
            }
        }

        let keymap = ctx.keymap;
        let Some(mouse_move) = keymap.mouse_move() else {
            return;
        };
        let target = self.target_size(ctx.sizes);
        let speed = mouse_move.speed_ratio;
        let Some(viewport) = self.chain.viewport_mut() else {
            return;
        };
        if !viewport.is_touching() && !viewport.waiting_for_center_repress() {
            viewport.start_touch(ctx);
        }
        if target.is_valid() && speed.x > 0.0 && speed.y > 0.0 {
            let distance = PointF::new(
                delta.x / speed.x / target.width,
                delta.y / speed.y / target.height,
            );
            viewport.add_move_delta(distance, ctx);
        }
    }

    // ── Wheel ─────────────────────────────────────────────────────────────────

    /// Runs the script bound to the wheel direction as press then release.
    pub fn wheel_event(&mut self, input: &WheelInput, scripts: &ScriptBridge, ctx: &mut HandlerContext<'_>) {
        if self.chain.dispatch_wheel(input, ctx) || input.angle_delta == 0 {
            return;
        }
        let key = if input.angle_delta > 0 {
            InputKey::WheelUp
        } else {
            InputKey::WheelDown
        };
        let keymap = ctx.keymap;
        if let Some(Binding::Script { trigger, pos, script }) = keymap.lookup_other(key) {
            scripts.run_binding_script(trigger.key, *pos, script, true);
            scripts.run_binding_script(trigger.key, *pos, script, false);
        } else {
            trace!(?key, "wheel without script binding");
        }
    }

    // ── Capture mode ──────────────────────────────────────────────────────────

    pub fn is_cursor_captured(&self) -> bool {
        self.captured
    }

    pub fn set_cursor_captured(&mut self, captured: bool, ctx: &mut HandlerContext<'_>) {
        self.captured = captured;
        if captured {
            if ctx.keymap.is_valid_mouse_move_map() {
                self.cursor.set_grabbed(true);
            }
            self.ignore_moves = 1;
        } else {
            self.cursor.set_grabbed(false);
            if let Some(viewport) = self.chain.viewport_mut() {
                viewport.stop_touch(ctx);
            }
        }
        info!(captured, "cursor capture changed");
    }

    pub fn toggle_cursor_captured(&mut self, ctx: &mut HandlerContext<'_>) -> bool {
        self.set_cursor_captured(!self.captured, ctx);
        self.captured
    }

    // ── Focus and geometry ────────────────────────────────────────────────────

    pub fn on_focus_lost(&mut self, scripts: &ScriptBridge, ctx: &mut HandlerContext<'_>) {
        self.chain.on_focus_lost(ctx);
        self.held.clear();
        self.multi_touch = [0; MULTI_TOUCH_SLOTS];
        scripts.host().clear_key_states();
        self.last_modifier = None;
        self.modifier_combo = false;
        debug!("focus lost, transient input state cleared");
    }

    /// Discards the next move sample, which still refers to the old size.
    pub fn on_size_changed(&mut self) {
        self.ignore_moves = 1;
    }

    pub fn set_mobile_size(&mut self, size: SizeF) {
        self.mobile_size = size;
        self.on_size_changed();
    }

    /// Size used for normalized touch math: the device size oriented like
    /// the video when known, else the frame size.
    pub fn target_size(&self, sizes: ViewSizes) -> SizeF {
        if !self.mobile_size.is_valid() {
            return sizes.frame;
        }
        let reference = if sizes.frame.is_valid() { sizes.frame } else { sizes.show };
        if self.mobile_size.is_landscape() != reference.is_landscape() {
            self.mobile_size.transposed()
        } else {
            self.mobile_size
        }
    }

    pub fn calc_frame_absolute_pos(&self, normalized: PointF, sizes: ViewSizes) -> PointF {
        self.target_size(sizes).denormalize(normalized)
    }

    pub fn calc_screen_absolute_pos(&self, normalized: PointF, sizes: ViewSizes) -> PointF {
        sizes.show.denormalize(normalized)
    }

    // ── Multi-touch slots ─────────────────────────────────────────────────────

    /// Held script bindings own a slot from press to release.
    fn track_script_slot(&mut self, key_id: i64, pressed: bool) {
        if !pressed {
            self.detach_touch_id(key_id);
        } else if self.touch_id(key_id).is_none() && self.attach_touch_id(key_id).is_none() {
            warn!(key_id, "no free multi-touch slot for script key");
        }
    }

    /// Claims the first free slot for `key_id`.
    pub fn attach_touch_id(&mut self, key_id: i64) -> Option<usize> {
        if key_id == 0 {
            return None;
        }
        let slot = self.multi_touch.iter().position(|&k| k == 0)?;
        self.multi_touch[slot] = key_id;
        Some(slot)
    }

    pub fn detach_touch_id(&mut self, key_id: i64) {
        if let Some(slot) = self.touch_id(key_id) {
            self.multi_touch[slot] = 0;
        }
    }

    pub fn touch_id(&self, key_id: i64) -> Option<usize> {
        if key_id == 0 {
            return None;
        }
        self.multi_touch.iter().position(|&k| k == key_id)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn track_key(&mut self, key: InputKey, pressed: bool, scripts: &ScriptBridge) {
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
        scripts.host().set_key_state(key, pressed);
    }

    fn apply_view_reset(&mut self, ctx: &mut HandlerContext<'_>) {
        if ctx.take_reset_view_request() {
            if let Some(viewport) = self.chain.viewport_mut() {
                viewport.reset_view(ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{touches, Harness};
    use crate::application::output::ControlChannel;
    use crate::application::script_bridge::test_support::{FakeRuntime, Launch};
    use crate::application::script_bridge::ScriptHost;
    use crate::application::session_vars::SessionVars;
    use crate::application::settings::HumanizeSettings;
    use keytouch_core::protocol::Packet;
    use keytouch_core::{KeyAction, KeyEvent, KeyMap, MouseButton, TouchAction, TouchSequence};

    const MAP: &str = r#"{
        "switchKey": "`",
        "mouseMoveMap": { "startPos": {"x": 0.6, "y": 0.4}, "speedRatioX": 2.0, "speedRatioY": 2.0 },
        "keyMapNodes": [
            { "type": "KMT_ANDROID_KEY", "key": "1", "androidKey": "BACK" },
            { "type": "KMT_SCRIPT", "key": "J", "pos": {"x": 0.3, "y": 0.3}, "script": "mapi.click()" },
            { "type": "KMT_SCRIPT", "key": "RMB", "pos": {"x": 0.8, "y": 0.8}, "script": "mapi.click()" },
            { "type": "KMT_SCRIPT", "key": "WheelUp", "pos": {"x": 0.1, "y": 0.1}, "script": "mapi.click()" }
        ]
    }"#;

    struct Fixture {
        h: Harness,
        runtime: Arc<FakeRuntime>,
        scripts: ScriptBridge,
        dispatcher: InputDispatcher,
    }

    fn fixture(cursor: Arc<dyn CursorController>) -> Fixture {
        let h = Harness::new(KeyMap::from_json(MAP).unwrap());
        let out = ControlChannel::new(h.log.clone(), Arc::new(TouchSequence::new()));
        let host = Arc::new(ScriptHost::new(Arc::new(SessionVars::new()), out, HumanizeSettings::default()));
        let runtime = Arc::new(FakeRuntime::default());
        let scripts = ScriptBridge::new(runtime.clone(), host);
        let dispatcher = InputDispatcher::new(HandlerChain::with_default_handlers(), cursor);
        Fixture { h, runtime, scripts, dispatcher }
    }

    impl Fixture {
        fn key(&mut self, input: KeyInput) {
            let mut ctx = self.h.ctx();
            self.dispatcher.key_event(&input, &self.scripts, &mut ctx);
        }

        fn mouse(&mut self, input: MouseInput) {
            let mut ctx = self.h.ctx();
            self.dispatcher.mouse_event(&input, &self.scripts, &mut ctx);
        }
    }

    #[test]
    fn test_switch_key_toggles_capture_on_press_only() {
        // Arrange
        let mut cursor = MockCursorController::new();
        cursor.expect_set_grabbed().withf(|g| *g).times(1).return_const(());
        cursor.expect_set_grabbed().withf(|g| !*g).times(1).return_const(());
        let mut f = fixture(Arc::new(cursor));

        // Act / Assert
        f.key(KeyInput::press(HostKey::QuoteLeft));
        assert!(f.dispatcher.is_cursor_captured());
        f.key(KeyInput::release(HostKey::QuoteLeft));
        assert!(f.dispatcher.is_cursor_captured());
        f.key(KeyInput::press(HostKey::QuoteLeft));
        assert!(!f.dispatcher.is_cursor_captured());
        assert!(f.h.log.packets().is_empty());
    }

    #[test]
    fn test_shifted_symbol_falls_back_to_unshifted_binding() {
        let mut f = fixture(Arc::new(DetachedCursor));

        f.key(KeyInput::press(HostKey::Exclam).with_modifiers(Modifiers::SHIFT));

        assert_eq!(
            f.h.log.packets(),
            vec![Packet::Key(KeyEvent { action: KeyAction::Down, keycode: 4 })]
        );
    }

    #[test]
    fn test_script_key_runs_press_and_release_scripts() {
        // Arrange
        let mut f = fixture(Arc::new(DetachedCursor));

        // Act
        f.key(KeyInput::press(HostKey::J));
        f.key(KeyInput::press(HostKey::J).repeated());
        f.key(KeyInput::release(HostKey::J));

        // Assert – the auto-repeat is dropped
        let launches = f.runtime.launches();
        assert_eq!(launches.len(), 2);
        assert!(matches!(launches[0], Launch::Inline { is_press: true, .. }));
        assert!(matches!(launches[1], Launch::Inline { is_press: false, .. }));
    }

    #[test]
    fn test_script_key_holds_a_touch_slot_until_release() {
        // Arrange
        let mut f = fixture(Arc::new(DetachedCursor));
        let key_id = InputKey::Key(HostKey::J).id();

        // Act
        f.key(KeyInput::press(HostKey::J));
        let while_held = f.dispatcher.touch_id(key_id);
        f.key(KeyInput::release(HostKey::J));

        // Assert
        assert_eq!(while_held, Some(0));
        assert_eq!(f.dispatcher.touch_id(key_id), None);
        assert_eq!(f.dispatcher.attach_touch_id(7), Some(0));
    }

    #[test]
    fn test_key_state_is_published_to_scripts() {
        let mut f = fixture(Arc::new(DetachedCursor));

        f.key(KeyInput::press(HostKey::J));

        assert!(f.scripts.host().is_key_pressed(InputKey::Key(HostKey::J)));
        assert!(f.dispatcher.is_key_held(InputKey::Key(HostKey::J)));
    }

    #[test]
    fn test_unbound_key_takes_default_path() {
        let mut f = fixture(Arc::new(DetachedCursor));

        f.key(KeyInput::press(HostKey::B));

        assert_eq!(
            f.h.log.packets(),
            vec![Packet::Key(KeyEvent { action: KeyAction::Down, keycode: 30 })]
        );
    }

    #[test]
    fn test_modifier_combo_is_flagged_after_shortcut() {
        let mut f = fixture(Arc::new(DetachedCursor));

        f.key(KeyInput::press(HostKey::Alt));
        f.key(KeyInput::press(HostKey::Tab).with_modifiers(Modifiers::ALT));

        assert!(f.dispatcher.modifier_combo);
        f.key(KeyInput::press(HostKey::Alt));
        assert!(!f.dispatcher.modifier_combo);
    }

    #[test]
    fn test_captured_move_warps_and_drives_viewport() {
        // Arrange – show size 960x540, center (480, 270)
        let mut cursor = MockCursorController::new();
        cursor.expect_set_grabbed().return_const(());
        cursor
            .expect_warp_to()
            .withf(|p| *p == PointF::new(480.0, 270.0))
            .times(1)
            .return_const(());
        let mut f = fixture(Arc::new(cursor));
        {
            let mut ctx = f.h.ctx();
            f.dispatcher.set_cursor_captured(true, &mut ctx);
        }

        // Act – first sample is the warp echo and is discarded
        f.mouse(MouseInput::moved(PointF::new(600.0, 270.0), false));
        f.mouse(MouseInput::moved(PointF::new(600.0, 270.0), false));
        f.mouse(MouseInput::moved(PointF::new(480.0, 270.0), false));

        // Assert
        let viewport = f.dispatcher.chain().viewport().unwrap();
        assert!(viewport.is_touching());
        let sent = touches(&f.h.log.packets());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, TouchAction::Down);
    }

    #[test]
    fn test_sub_pixel_move_is_ignored() {
        let mut f = fixture(Arc::new(DetachedCursor));
        {
            let mut ctx = f.h.ctx();
            f.dispatcher.set_cursor_captured(true, &mut ctx);
        }
        f.mouse(MouseInput::moved(PointF::new(480.0, 270.0), false));

        f.mouse(MouseInput::moved(PointF::new(480.4, 270.4), false));

        assert!(!f.dispatcher.chain().viewport().unwrap().is_touching());
    }

    #[test]
    fn test_release_capture_lifts_viewport_touch() {
        let mut f = fixture(Arc::new(DetachedCursor));
        {
            let mut ctx = f.h.ctx();
            f.dispatcher.set_cursor_captured(true, &mut ctx);
        }
        f.mouse(MouseInput::moved(PointF::new(480.0, 270.0), false));
        f.mouse(MouseInput::moved(PointF::new(700.0, 270.0), false));

        {
            let mut ctx = f.h.ctx();
            f.dispatcher.set_cursor_captured(false, &mut ctx);
        }

        let actions: Vec<_> = touches(&f.h.log.packets()).iter().map(|t| t.1).collect();
        assert_eq!(actions, vec![TouchAction::Down, TouchAction::Up]);
    }

    #[test]
    fn test_captured_click_runs_mouse_script() {
        let mut f = fixture(Arc::new(DetachedCursor));
        {
            let mut ctx = f.h.ctx();
            f.dispatcher.set_cursor_captured(true, &mut ctx);
        }

        f.mouse(MouseInput::press(MouseButton::Right, PointF::new(1.0, 1.0)));
        f.mouse(MouseInput::release(MouseButton::Right, PointF::new(1.0, 1.0)));

        assert_eq!(f.runtime.launches().len(), 2);
        assert!(f.h.log.packets().is_empty());
    }

    #[test]
    fn test_visible_cursor_click_taps_through() {
        let mut f = fixture(Arc::new(DetachedCursor));

        f.mouse(MouseInput::press(MouseButton::Left, PointF::new(480.0, 270.0)));

        assert_eq!(touches(&f.h.log.packets())[0].1, TouchAction::Down);
        assert!(f.runtime.launches().is_empty());
    }

    #[test]
    fn test_wheel_runs_press_then_release() {
        let mut f = fixture(Arc::new(DetachedCursor));

        {
            let mut ctx = f.h.ctx();
            let up = WheelInput { angle_delta: 120, local: PointF::default() };
            f.dispatcher.wheel_event(&up, &f.scripts, &mut ctx);
            let down = WheelInput { angle_delta: -120, local: PointF::default() };
            f.dispatcher.wheel_event(&down, &f.scripts, &mut ctx);
        }

        let launches = f.runtime.launches();
        assert_eq!(launches.len(), 2);
        assert!(matches!(launches[0], Launch::Inline { is_press: true, key_id, .. } if key_id == InputKey::WheelUp.id()));
        assert!(matches!(launches[1], Launch::Inline { is_press: false, .. }));
    }

    #[test]
    fn test_focus_lost_clears_key_state() {
        let mut f = fixture(Arc::new(DetachedCursor));
        f.key(KeyInput::press(HostKey::J));

        {
            let mut ctx = f.h.ctx();
            f.dispatcher.on_focus_lost(&f.scripts, &mut ctx);
        }

        assert!(!f.dispatcher.is_key_held(InputKey::Key(HostKey::J)));
        assert!(!f.scripts.host().is_key_pressed(InputKey::Key(HostKey::J)));
    }

    #[test]
    fn test_multi_touch_slots() {
        let mut d = InputDispatcher::new(HandlerChain::new(), Arc::new(DetachedCursor));

        assert_eq!(d.attach_touch_id(11), Some(0));
        assert_eq!(d.attach_touch_id(12), Some(1));
        d.detach_touch_id(11);
        assert_eq!(d.touch_id(11), None);
        assert_eq!(d.attach_touch_id(13), Some(0));
        assert_eq!(d.touch_id(12), Some(1));
        assert_eq!(d.attach_touch_id(0), None);

        for id in 20..28 {
            d.attach_touch_id(id);
        }
        assert_eq!(d.attach_touch_id(99), None);
    }

    #[test]
    fn test_target_size_orients_mobile_size_like_frame() {
        // Arrange
        let mut d = InputDispatcher::new(HandlerChain::new(), Arc::new(DetachedCursor));
        let sizes = ViewSizes::new(SizeF::new(1920.0, 1080.0), SizeF::new(960.0, 540.0));

        // Act / Assert
        assert_eq!(d.target_size(sizes), SizeF::new(1920.0, 1080.0));
        d.set_mobile_size(SizeF::new(1080.0, 2400.0));
        assert_eq!(d.target_size(sizes), SizeF::new(2400.0, 1080.0));
        assert_eq!(d.pending_ignored_moves(), 1);
        assert_eq!(
            d.calc_frame_absolute_pos(PointF::new(0.5, 0.5), sizes),
            PointF::new(1200.0, 540.0)
        );
        assert_eq!(
            d.calc_screen_absolute_pos(PointF::new(0.5, 0.5), sizes),
            PointF::new(480.0, 270.0)
        );
    }
}
