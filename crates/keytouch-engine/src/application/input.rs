//! Host input events as the engine receives them.
//!
//! The window layer converts its toolkit events into these plain structs
//! before calling the session facade.  Positions are in window-local pixels.

use keytouch_core::{HostKey, Modifiers, MouseButton, PointF, SizeF};

/// A keyboard transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyInput {
    pub key: HostKey,
    pub modifiers: Modifiers,
    pub pressed: bool,
    pub auto_repeat: bool,
    /// Set by the dispatcher: a non-modifier key was pressed while the last
    /// modifier was still held.
    pub modifier_combo: bool,
}

impl KeyInput {
    pub fn press(key: HostKey) -> Self {
        Self {
            key,
            modifiers: Modifiers::NONE,
            pressed: true,
            auto_repeat: false,
            modifier_combo: false,
        }
    }

    pub fn release(key: HostKey) -> Self {
        Self {
            pressed: false,
            ..Self::press(key)
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.auto_repeat = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Press,
    Release,
    Move,
}

/// A mouse button transition or pointer move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseInput {
    pub kind: MouseKind,
    /// The button that changed.  `None` for moves.
    pub button: Option<MouseButton>,
    /// Whether the primary button is held after this event.
    pub left_held: bool,
    pub local: PointF,
}

impl MouseInput {
    pub fn press(button: MouseButton, local: PointF) -> Self {
        Self {
            kind: MouseKind::Press,
            button: Some(button),
            left_held: button == MouseButton::Left,
            local,
        }
    }

    pub fn release(button: MouseButton, local: PointF) -> Self {
        Self {
            kind: MouseKind::Release,
            button: Some(button),
            left_held: false,
            local,
        }
    }

    pub fn moved(local: PointF, left_held: bool) -> Self {
        Self {
            kind: MouseKind::Move,
            button: None,
            left_held,
            local,
        }
    }
}

/// Vertical wheel rotation; positive is away from the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelInput {
    pub angle_delta: i32,
    pub local: PointF,
}

/// The two sizes every event is interpreted against.
///
/// `frame` is the decoded video size (device pixels); `show` is the size of
/// the widget the video is painted in (window pixels).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewSizes {
    pub frame: SizeF,
    pub show: SizeF,
}

impl ViewSizes {
    pub fn new(frame: SizeF, show: SizeF) -> Self {
        Self { frame, show }
    }

    /// The size normalized coordinates are relative to: the frame when one
    /// has been decoded, else the widget.
    pub fn target(&self) -> SizeF {
        if self.frame.is_valid() {
            self.frame
        } else {
            self.show
        }
    }
}
