//! Key identities, Android keycodes and the binding table.
//!
//! - **`keys`** – the host-side vocabulary: keyboard keys, mouse buttons,
//!   wheel directions and modifier masks, plus key-name parsing.
//! - **`android`** – Android keycode constants and the fixed table used for
//!   keys that have no explicit binding.
//! - **`binding`** – [`KeyMap`], the loaded set of [`Binding`]s.

pub mod android;
pub mod binding;
pub mod keys;

pub use android::{default_keycode, keycode_by_name, AndroidKeycode};
pub use binding::{
    Binding, Direction, DirectionKey, FreeLookBinding, KeyMap, KeyMapError, MouseMoveBinding,
    SteerWheelBinding, Trigger,
};
pub use keys::{parse_key_name, HostKey, InputKey, Modifiers, MouseButton};
