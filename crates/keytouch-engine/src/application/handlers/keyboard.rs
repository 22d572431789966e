//! KeyboardHandler: forwards keys as Android key events.
//!
//! It sits last in the chain but never consumes anything there; the
//! dispatcher calls it directly for bound Android keys and for keys that have
//! no binding at all.

use keytouch_core::keymap::{default_keycode, AndroidKeycode};
use keytouch_core::KeyAction;
use tracing::trace;

use super::{HandlerContext, InputHandler};
use crate::application::input::KeyInput;

pub const DEFAULT_PRIORITY: i32 = 200;

pub struct KeyboardHandler {
    priority: i32,
}

impl KeyboardHandler {
    pub fn new() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sends a configured keycode.  Keycode `0` is ignored.
    pub fn process_android_key(&self, keycode: AndroidKeycode, pressed: bool, ctx: &mut HandlerContext<'_>) {
        if keycode == 0 {
            return;
        }
        let action = if pressed { KeyAction::Down } else { KeyAction::Up };
        ctx.out.send_key(action, keycode);
    }

    /// Translates an unbound key through the default table.
    pub fn process_default_key(&self, input: &KeyInput, ctx: &mut HandlerContext<'_>) {
        match default_keycode(input.key, input.modifiers) {
            Some(code) => self.process_android_key(code, input.pressed, ctx),
            None => trace!(key = ?input.key, "no default keycode"),
        }
    }
}

impl Default for KeyboardHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler for KeyboardHandler {
    fn name(&self) -> &'static str {
        "Keyboard"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn reset(&mut self, _ctx: &mut HandlerContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::Harness;
    use keytouch_core::protocol::Packet;
    use keytouch_core::{HostKey, KeyEvent, KeyMap, Modifiers};

    #[test]
    fn test_default_key_press_and_release() {
        // Arrange
        let mut h = Harness::new(KeyMap::default());
        let keyboard = KeyboardHandler::new();

        // Act
        {
            let mut ctx = h.ctx();
            keyboard.process_default_key(&KeyInput::press(HostKey::A), &mut ctx);
            keyboard.process_default_key(&KeyInput::release(HostKey::A), &mut ctx);
        }

        // Assert
        assert_eq!(
            h.log.packets(),
            vec![
                Packet::Key(KeyEvent { action: KeyAction::Down, keycode: 29 }),
                Packet::Key(KeyEvent { action: KeyAction::Up, keycode: 29 }),
            ]
        );
    }

    #[test]
    fn test_alt_shortcut_is_not_forwarded() {
        let mut h = Harness::new(KeyMap::default());
        let keyboard = KeyboardHandler::new();

        {
            let mut ctx = h.ctx();
            let input = KeyInput::press(HostKey::F4).with_modifiers(Modifiers::ALT);
            keyboard.process_default_key(&input, &mut ctx);
            let input = KeyInput::press(HostKey::C).with_modifiers(Modifiers::ALT);
            keyboard.process_default_key(&input, &mut ctx);
        }

        assert!(h.log.packets().is_empty());
    }

    #[test]
    fn test_zero_keycode_is_ignored() {
        let mut h = Harness::new(KeyMap::default());
        let keyboard = KeyboardHandler::new();

        {
            let mut ctx = h.ctx();
            keyboard.process_android_key(0, true, &mut ctx);
        }

        assert!(h.log.packets().is_empty());
    }

    #[test]
    fn test_never_consumes_in_chain() {
        let mut h = Harness::new(KeyMap::default());
        let mut keyboard = KeyboardHandler::new();
        let mut ctx = h.ctx();

        assert!(!keyboard.handle_key(&KeyInput::press(HostKey::A), &mut ctx));
    }
}
