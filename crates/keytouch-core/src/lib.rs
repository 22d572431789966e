//! # keytouch-core
//!
//! Shared library for KeyTouch containing the control-channel wire codec,
//! geometry value types and the key-binding tables.
//!
//! It has no threads, no I/O and no dependency on any window toolkit or
//! transport.  The engine crate builds the real-time handlers on top of it.
//!
//! # Architecture overview (for beginners)
//!
//! KeyTouch lets a keyboard and mouse drive a touchscreen device: key presses
//! become virtual touches (a joystick thumb, a camera drag, a button tap) or
//! Android key events, and small scripts can automate sequences of them.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How touches and keys travel to the device.  Each event
//!   is a tiny fixed-layout packet (1, 3 or 6 bytes) written straight into a
//!   caller buffer, plus the atomic generator for touch-sequence ids.
//!
//! - **`domain`** – Geometry: points, sizes and rectangles, and the
//!   conversions between pixels and normalized `0.0..=1.0` coordinates.
//!
//! - **`keymap`** – Which physical input triggers which action, loaded from
//!   a JSON key-map document, and the default key → Android keycode table.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `keytouch_core::KeyMap` instead of `keytouch_core::keymap::binding::KeyMap`.
pub use domain::geometry::{PointF, RectF, SizeF};
pub use keymap::{Binding, HostKey, InputKey, KeyMap, KeyMapError, Modifiers, MouseButton};
pub use protocol::codec::{to_wire, CodecError};
pub use protocol::messages::{KeyAction, KeyEvent, TouchAction, TouchEvent};
pub use protocol::sequence::TouchSequence;
