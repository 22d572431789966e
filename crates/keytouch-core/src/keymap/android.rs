//! Android `KeyEvent` keycodes and the default host-key translation table.
//!
//! Reference: `android.view.KeyEvent` `KEYCODE_*` constants.
//!
//! # How this table is used
//!
//! A binding can name an Android keycode directly (`KMT_ANDROID_KEY`).  Keys
//! without a binding fall through to [`default_keycode`], which forwards
//! editing keys, letters, digits and symbols so typing into a remote text field
//! works without any configuration.

use super::keys::{HostKey, Modifiers};

/// An Android keycode as carried on the wire.
pub type AndroidKeycode = u16;

pub const KEYCODE_UNKNOWN: AndroidKeycode = 0;
pub const KEYCODE_HOME: AndroidKeycode = 3;
pub const KEYCODE_BACK: AndroidKeycode = 4;
pub const KEYCODE_0: AndroidKeycode = 7;
pub const KEYCODE_STAR: AndroidKeycode = 17;
pub const KEYCODE_POUND: AndroidKeycode = 18;
pub const KEYCODE_DPAD_UP: AndroidKeycode = 19;
pub const KEYCODE_DPAD_DOWN: AndroidKeycode = 20;
pub const KEYCODE_DPAD_LEFT: AndroidKeycode = 21;
pub const KEYCODE_DPAD_RIGHT: AndroidKeycode = 22;
pub const KEYCODE_VOLUME_UP: AndroidKeycode = 24;
pub const KEYCODE_VOLUME_DOWN: AndroidKeycode = 25;
pub const KEYCODE_POWER: AndroidKeycode = 26;
pub const KEYCODE_A: AndroidKeycode = 29;
pub const KEYCODE_COMMA: AndroidKeycode = 55;
pub const KEYCODE_PERIOD: AndroidKeycode = 56;
pub const KEYCODE_TAB: AndroidKeycode = 61;
pub const KEYCODE_SPACE: AndroidKeycode = 62;
pub const KEYCODE_ENTER: AndroidKeycode = 66;
pub const KEYCODE_DEL: AndroidKeycode = 67;
pub const KEYCODE_GRAVE: AndroidKeycode = 68;
pub const KEYCODE_MINUS: AndroidKeycode = 69;
pub const KEYCODE_EQUALS: AndroidKeycode = 70;
pub const KEYCODE_LEFT_BRACKET: AndroidKeycode = 71;
pub const KEYCODE_RIGHT_BRACKET: AndroidKeycode = 72;
pub const KEYCODE_BACKSLASH: AndroidKeycode = 73;
pub const KEYCODE_SEMICOLON: AndroidKeycode = 74;
pub const KEYCODE_APOSTROPHE: AndroidKeycode = 75;
pub const KEYCODE_SLASH: AndroidKeycode = 76;
pub const KEYCODE_AT: AndroidKeycode = 77;
pub const KEYCODE_PLUS: AndroidKeycode = 81;
pub const KEYCODE_MENU: AndroidKeycode = 82;
pub const KEYCODE_PAGE_UP: AndroidKeycode = 92;
pub const KEYCODE_PAGE_DOWN: AndroidKeycode = 93;
pub const KEYCODE_ESCAPE: AndroidKeycode = 111;
pub const KEYCODE_FORWARD_DEL: AndroidKeycode = 112;
pub const KEYCODE_MOVE_HOME: AndroidKeycode = 122;
pub const KEYCODE_MOVE_END: AndroidKeycode = 123;
pub const KEYCODE_NUMPAD_ENTER: AndroidKeycode = 160;
pub const KEYCODE_NUMPAD_LEFT_PAREN: AndroidKeycode = 162;
pub const KEYCODE_NUMPAD_RIGHT_PAREN: AndroidKeycode = 163;
pub const KEYCODE_APP_SWITCH: AndroidKeycode = 187;

/// Translates an unbound host key into an Android keycode.
///
/// Editing and navigation keys are translated regardless of modifiers.  With
/// Alt or Meta held, everything else is treated as a host shortcut and
/// `None` is returned.
pub fn default_keycode(key: HostKey, modifiers: Modifiers) -> Option<AndroidKeycode> {
    if let Some(code) = function_keycode(key) {
        return Some(code);
    }
    if modifiers.contains(Modifiers::ALT) || modifiers.contains(Modifiers::META) {
        return None;
    }
    if let Some(i) = key.letter_index() {
        return Some(KEYCODE_A + AndroidKeycode::from(i));
    }
    if let Some(d) = key.digit_value() {
        return Some(KEYCODE_0 + AndroidKeycode::from(d));
    }
    symbol_keycode(key)
}

fn function_keycode(key: HostKey) -> Option<AndroidKeycode> {
    let code = match key {
        HostKey::Return => KEYCODE_ENTER,
        HostKey::Enter => KEYCODE_NUMPAD_ENTER,
        HostKey::Escape => KEYCODE_ESCAPE,
        HostKey::Backspace => KEYCODE_DEL,
        HostKey::Delete => KEYCODE_FORWARD_DEL,
        HostKey::Tab => KEYCODE_TAB,
        HostKey::Home => KEYCODE_MOVE_HOME,
        HostKey::End => KEYCODE_MOVE_END,
        HostKey::PageUp => KEYCODE_PAGE_UP,
        HostKey::PageDown => KEYCODE_PAGE_DOWN,
        HostKey::Left => KEYCODE_DPAD_LEFT,
        HostKey::Right => KEYCODE_DPAD_RIGHT,
        HostKey::Up => KEYCODE_DPAD_UP,
        HostKey::Down => KEYCODE_DPAD_DOWN,
        _ => return None,
    };
    Some(code)
}

fn symbol_keycode(key: HostKey) -> Option<AndroidKeycode> {
    // Shifted symbols share the keycode of their unshifted key where Android
    // has no dedicated code.
    let code = match key {
        HostKey::Exclam => KEYCODE_0 + 1,
        HostKey::Dollar => KEYCODE_0 + 4,
        HostKey::Percent => KEYCODE_0 + 5,
        HostKey::AsciiCircum => KEYCODE_0 + 6,
        HostKey::Ampersand => KEYCODE_0 + 7,
        HostKey::Space => KEYCODE_SPACE,
        HostKey::Comma | HostKey::Less => KEYCODE_COMMA,
        HostKey::Period | HostKey::Greater => KEYCODE_PERIOD,
        HostKey::Minus | HostKey::Underscore => KEYCODE_MINUS,
        HostKey::Equal => KEYCODE_EQUALS,
        HostKey::BracketLeft | HostKey::BraceLeft => KEYCODE_LEFT_BRACKET,
        HostKey::BracketRight | HostKey::BraceRight => KEYCODE_RIGHT_BRACKET,
        HostKey::Backslash | HostKey::Bar => KEYCODE_BACKSLASH,
        HostKey::Semicolon | HostKey::Colon => KEYCODE_SEMICOLON,
        HostKey::Apostrophe | HostKey::QuoteDbl => KEYCODE_APOSTROPHE,
        HostKey::Slash | HostKey::Question => KEYCODE_SLASH,
        HostKey::At => KEYCODE_AT,
        HostKey::Plus => KEYCODE_PLUS,
        HostKey::QuoteLeft | HostKey::AsciiTilde => KEYCODE_GRAVE,
        HostKey::NumberSign => KEYCODE_POUND,
        HostKey::ParenLeft => KEYCODE_NUMPAD_LEFT_PAREN,
        HostKey::ParenRight => KEYCODE_NUMPAD_RIGHT_PAREN,
        HostKey::Asterisk => KEYCODE_STAR,
        _ => return None,
    };
    Some(code)
}

/// Resolves a keycode by name for script use (`"BACK"`, `"KEYCODE_HOME"`, `"VOLUME_UP"`).
pub fn keycode_by_name(name: &str) -> Option<AndroidKeycode> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("KEYCODE_").unwrap_or(&upper);
    let code = match bare {
        "HOME" => KEYCODE_HOME,
        "BACK" => KEYCODE_BACK,
        "MENU" => KEYCODE_MENU,
        "APP_SWITCH" => KEYCODE_APP_SWITCH,
        "VOLUME_UP" => KEYCODE_VOLUME_UP,
        "VOLUME_DOWN" => KEYCODE_VOLUME_DOWN,
        "POWER" => KEYCODE_POWER,
        "ENTER" => KEYCODE_ENTER,
        "DEL" => KEYCODE_DEL,
        "ESCAPE" => KEYCODE_ESCAPE,
        "TAB" => KEYCODE_TAB,
        "SPACE" => KEYCODE_SPACE,
        _ => return None,
    };
    Some(code)
}
