//! CursorHandler: tap-through while the pointer is visible.
//!
//! The primary button maps one-to-one to a touch at the pointer position.
//! Other buttons are swallowed because the remote surface only understands a
//! single primary contact.

use keytouch_core::{MouseButton, PointF, TouchAction};

use super::{HandlerContext, InputHandler};
use crate::application::input::{MouseInput, MouseKind};

pub const DEFAULT_PRIORITY: i32 = 50;

pub struct CursorHandler {
    priority: i32,
    seq_id: u32,
    touching: bool,
    last_pos: PointF,
}

impl CursorHandler {
    pub fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            seq_id: 0,
            touching: false,
            last_pos: PointF::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Last pointer position, normalized to the widget.
    pub fn last_pos(&self) -> PointF {
        self.last_pos
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn process_mouse(&mut self, input: &MouseInput, ctx: &mut HandlerContext<'_>) {
        let Some(pos) = ctx.sizes.show.normalize(input.local) else {
            return;
        };
        self.last_pos = pos;

        match input.kind {
            MouseKind::Press if input.button == Some(MouseButton::Left) => {
                self.seq_id = ctx.out.next_seq();
                self.touching = true;
                ctx.out.send_touch(self.seq_id, TouchAction::Down, pos);
            }
            MouseKind::Release if input.button == Some(MouseButton::Left) => {
                if self.touching {
                    ctx.out.send_touch(self.seq_id, TouchAction::Up, pos);
                    self.touching = false;
                    self.seq_id = 0;
                }
            }
            MouseKind::Move if input.left_held && self.touching => {
                ctx.out.send_touch(self.seq_id, TouchAction::Move, pos);
            }
            _ => {}
        }
    }
}

impl Default for CursorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler for CursorHandler {
    fn name(&self) -> &'static str {
        "Cursor"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn reset(&mut self, ctx: &mut HandlerContext<'_>) {
        if self.touching {
            ctx.out.send_touch(self.seq_id, TouchAction::Up, self.last_pos);
            self.touching = false;
            self.seq_id = 0;
        }
    }
}
