//! FreeLookHandler: a hotkey-held secondary look touch.
//!
//! While the bound key is held, mouse motion drags a second finger that
//! starts at its own anchor; releasing the key lifts it and can ask the
//! Viewport to re-center.  There is no edge or idle re-centering: the drag
//! simply clamps to the screen.
//!
//! A modifier key (Alt, Ctrl...) can be the hotkey.  When it was used as part
//! of a shortcut instead (Alt+Tab), the dispatcher flags the release as a
//! combo and the handler drops its state without sending the Up.

use keytouch_core::keymap::FreeLookBinding;
use keytouch_core::{Binding, Modifiers, PointF, TouchAction};
use tracing::debug;

use super::{HandlerContext, InputHandler};
use crate::application::input::KeyInput;

pub const DEFAULT_PRIORITY: i32 = 70;

pub struct FreeLookHandler {
    priority: i32,
    active: bool,
    seq_id: u32,
    speed_ratio: PointF,
    current_pos: PointF,
    reset_view_on_release: bool,
}

impl FreeLookHandler {
    pub fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            active: false,
            seq_id: 0,
            speed_ratio: PointF::new(1.0, 1.0),
            current_pos: PointF::default(),
            reset_view_on_release: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// `true` while the look finger is down.
    pub fn has_touch(&self) -> bool {
        self.active && self.seq_id != 0
    }

    pub fn current_pos(&self) -> PointF {
        self.current_pos
    }

    /// Applies a bound free-look key transition.
    pub fn process_key(&mut self, binding: &FreeLookBinding, input: &KeyInput, ctx: &mut HandlerContext<'_>) {
        if input.key.is_modifier() && input.pressed && input.modifier_combo {
            return;
        }

        if input.pressed && !self.active {
            self.active = true;
            self.speed_ratio = binding.speed_ratio;
            self.reset_view_on_release = binding.reset_view_on_release;
            self.current_pos = binding.start_pos;
            self.seq_id = ctx.out.next_seq();
            ctx.out.send_touch(self.seq_id, TouchAction::Down, self.current_pos);
            debug!(seq_id = self.seq_id, "free look down");
        } else if !input.pressed && self.active {
            if input.key.is_modifier() && input.modifier_combo {
                // Used as a shortcut modifier: drop the touch silently.
                debug!("free look cancelled by modifier combo");
                self.clear();
                return;
            }
            ctx.out.send_touch(self.seq_id, TouchAction::Up, self.current_pos);
            debug!(seq_id = self.seq_id, "free look up");
            if self.reset_view_on_release {
                ctx.request_reset_view();
            }
            self.clear();
        }
    }

    /// Drags the look finger by a pixel delta.
    pub fn process_mouse_delta(&mut self, delta: PointF, ctx: &mut HandlerContext<'_>) {
        if !self.has_touch() {
            return;
        }
        let size = ctx.sizes.target();
        if !size.is_valid() || self.speed_ratio.x == 0.0 || self.speed_ratio.y == 0.0 {
            return;
        }
        let distance = PointF::new(
            delta.x / self.speed_ratio.x / size.width,
            delta.y / self.speed_ratio.y / size.height,
        );
        self.current_pos = (self.current_pos + distance).clamped(0.0, 1.0);
        ctx.out.send_touch(self.seq_id, TouchAction::Move, self.current_pos);
    }

    fn clear(&mut self) {
        self.active = false;
        self.seq_id = 0;
        self.reset_view_on_release = false;
    }
}

impl Default for FreeLookHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler for FreeLookHandler {
    fn name(&self) -> &'static str {
        "FreeLook"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle_key(&mut self, input: &KeyInput, ctx: &mut HandlerContext<'_>) -> bool {
        let keymap = ctx.keymap;
        match keymap.lookup_key(input.key, Modifiers::NONE) {
            Some(Binding::FreeLook(binding)) => {
                self.process_key(binding, input, ctx);
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.active && self.seq_id != 0 {
            ctx.out.send_touch(self.seq_id, TouchAction::Up, self.current_pos);
        }
        self.clear();
    }
}
