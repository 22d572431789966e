//! HandlerChain: priority-ordered dispatch over the gesture handlers.
//!
//! The handler kinds are a closed set, so the chain stores them as the
//! [`Handler`] enum instead of trait objects.  That lets the dispatcher reach
//! a specific handler (`viewport_mut()`) without downcasting while the walk
//! itself stays generic over [`InputHandler`].
//!
//! Ordering is ascending priority, stable on ties, and is computed lazily on
//! the first dispatch after the handler set changes.

use std::time::Instant;

use tracing::debug;

use super::handlers::{
    CursorHandler, FreeLookHandler, HandlerContext, InputHandler, KeyboardHandler,
    SteerWheelHandler, ViewportHandler,
};
use super::input::{KeyInput, MouseInput, WheelInput};
use super::timer::earliest;

/// One of the five gesture handlers.
pub enum Handler {
    SteerWheel(SteerWheelHandler),
    Viewport(ViewportHandler),
    FreeLook(FreeLookHandler),
    Cursor(CursorHandler),
    Keyboard(KeyboardHandler),
}

impl Handler {
    fn as_dyn(&self) -> &dyn InputHandler {
        match self {
            Handler::SteerWheel(h) => h,
            Handler::Viewport(h) => h,
            Handler::FreeLook(h) => h,
            Handler::Cursor(h) => h,
            Handler::Keyboard(h) => h,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn InputHandler {
        match self {
            Handler::SteerWheel(h) => h,
            Handler::Viewport(h) => h,
            Handler::FreeLook(h) => h,
            Handler::Cursor(h) => h,
            Handler::Keyboard(h) => h,
        }
    }

    pub fn name(&self) -> &'static str {
        self.as_dyn().name()
    }

    pub fn priority(&self) -> i32 {
        self.as_dyn().priority()
    }
}

/// The ordered handler set.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Handler>,
    sorted: bool,
    live: bool,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard set with default priorities.
    pub fn with_default_handlers() -> Self {
        let mut chain = Self::new();
        chain.handlers = vec![
            Handler::SteerWheel(SteerWheelHandler::new()),
            Handler::Cursor(CursorHandler::new()),
            Handler::FreeLook(FreeLookHandler::new()),
            Handler::Viewport(ViewportHandler::new()),
            Handler::Keyboard(KeyboardHandler::new()),
        ];
        chain
    }

    /// Marks the chain live and initializes every handler.
    pub fn init(&mut self, ctx: &mut HandlerContext<'_>) {
        self.ensure_sorted();
        for handler in &mut self.handlers {
            handler.as_dyn_mut().init(ctx);
        }
        self.live = true;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Adds a handler; it is initialized at once when the chain is live.
    pub fn add_handler(&mut self, mut handler: Handler, ctx: &mut HandlerContext<'_>) {
        if self.live {
            handler.as_dyn_mut().init(ctx);
        }
        debug!(name = handler.name(), priority = handler.priority(), "handler added");
        self.handlers.push(handler);
        self.sorted = false;
    }

    /// Detaches the first handler with `name` without resetting it.
    pub fn remove_handler(&mut self, name: &str) -> Option<Handler> {
        let index = self.handlers.iter().position(|h| h.name() == name)?;
        Some(self.handlers.remove(index))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in dispatch order.
    pub fn dispatch_order(&mut self) -> Vec<&'static str> {
        self.ensure_sorted();
        self.handlers.iter().map(Handler::name).collect()
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            // `sort_by_key` is stable, so ties keep insertion order.
            self.handlers.sort_by_key(Handler::priority);
            self.sorted = true;
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub fn dispatch_key(&mut self, input: &KeyInput, ctx: &mut HandlerContext<'_>) -> bool {
        self.ensure_sorted();
        self.handlers
            .iter_mut()
            .any(|h| h.as_dyn_mut().handle_key(input, ctx))
    }

    pub fn dispatch_mouse(&mut self, input: &MouseInput, ctx: &mut HandlerContext<'_>) -> bool {
        self.ensure_sorted();
        self.handlers
            .iter_mut()
            .any(|h| h.as_dyn_mut().handle_mouse(input, ctx))
    }

    pub fn dispatch_wheel(&mut self, input: &WheelInput, ctx: &mut HandlerContext<'_>) -> bool {
        self.ensure_sorted();
        self.handlers
            .iter_mut()
            .any(|h| h.as_dyn_mut().handle_wheel(input, ctx))
    }

    pub fn on_focus_lost(&mut self, ctx: &mut HandlerContext<'_>) {
        for handler in &mut self.handlers {
            handler.as_dyn_mut().on_focus_lost(ctx);
        }
    }

    pub fn reset(&mut self, ctx: &mut HandlerContext<'_>) {
        for handler in &mut self.handlers {
            handler.as_dyn_mut().reset(ctx);
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    pub fn next_deadline(&self) -> Option<Instant> {
        self.handlers
            .iter()
            .map(|h| h.as_dyn().next_deadline())
            .fold(None, earliest)
    }

    /// Fires the handler owning the earliest deadline, if it is due at
    /// `now`.  Returns `false` when nothing was due.  `ctx.now` is set to the
    /// deadline that fired.
    pub fn fire_next_due(&mut self, now: Instant, ctx: &mut HandlerContext<'_>) -> bool {
        let next = self
            .handlers
            .iter_mut()
            .filter_map(|h| h.as_dyn().next_deadline().map(|d| (d, h)))
            .min_by_key(|(d, _)| *d);
        match next {
            Some((deadline, handler)) if deadline <= now => {
                ctx.now = deadline;
                handler.as_dyn_mut().on_timer(ctx);
                true
            }
            _ => false,
        }
    }

    // ── Typed access ──────────────────────────────────────────────────────────

    pub fn steer_wheel(&self) -> Option<&SteerWheelHandler> {
        self.handlers.iter().find_map(|h| match h {
            Handler::SteerWheel(s) => Some(s),
            _ => None,
        })
    }

    pub fn steer_wheel_mut(&mut self) -> Option<&mut SteerWheelHandler> {
        self.handlers.iter_mut().find_map(|h| match h {
            Handler::SteerWheel(s) => Some(s),
            _ => None,
        })
    }

    pub fn viewport(&self) -> Option<&ViewportHandler> {
        self.handlers.iter().find_map(|h| match h {
            Handler::Viewport(v) => Some(v),
            _ => None,
        })
    }

    pub fn viewport_mut(&mut self) -> Option<&mut ViewportHandler> {
        self.handlers.iter_mut().find_map(|h| match h {
            Handler::Viewport(v) => Some(v),
            _ => None,
        })
    }

    pub fn free_look(&self) -> Option<&FreeLookHandler> {
        self.handlers.iter().find_map(|h| match h {
            Handler::FreeLook(f) => Some(f),
            _ => None,
        })
    }

    pub fn free_look_mut(&mut self) -> Option<&mut FreeLookHandler> {
        self.handlers.iter_mut().find_map(|h| match h {
            Handler::FreeLook(f) => Some(f),
            _ => None,
        })
    }

    pub fn cursor(&self) -> Option<&CursorHandler> {
        self.handlers.iter().find_map(|h| match h {
            Handler::Cursor(c) => Some(c),
            _ => None,
        })
    }

    pub fn cursor_mut(&mut self) -> Option<&mut CursorHandler> {
        self.handlers.iter_mut().find_map(|h| match h {
            Handler::Cursor(c) => Some(c),
            _ => None,
        })
    }

    pub fn keyboard(&self) -> Option<&KeyboardHandler> {
        self.handlers.iter().find_map(|h| match h {
            Handler::Keyboard(k) => Some(k),
            _ => None,
        })
    }
}
