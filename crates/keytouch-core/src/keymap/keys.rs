//! Host-side key and button identities.
//!
//! # Why a host-neutral key set? (for beginners)
//!
//! The window layer that feeds this engine reports keys in its own toolkit's
//! vocabulary.  Rather than leaking that vocabulary into every handler, the
//! boundary translates once into [`HostKey`].  The set is closed and small:
//! it only contains keys a binding can name or the Keyboard handler can
//! forward.
//!
//! Mouse buttons and the two wheel directions live in [`InputKey`] next to
//! keyboard keys so a binding can be attached to any of them uniformly.

use serde::{Deserialize, Serialize};

/// A keyboard key as reported by the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HostKey {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    /// Main-block Return.
    Return,
    /// Keypad Enter.
    Enter,
    Escape,
    Backspace,
    Delete,
    Insert,
    Tab,
    /// Shift+Tab as reported by some hosts.
    Backtab,
    Space,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    // Unshifted symbols
    QuoteLeft,
    Minus,
    Equal,
    BracketLeft,
    BracketRight,
    Backslash,
    Semicolon,
    Apostrophe,
    Comma,
    Period,
    Slash,
    // Shifted symbols
    AsciiTilde,
    Exclam,
    At,
    NumberSign,
    Dollar,
    Percent,
    AsciiCircum,
    Ampersand,
    Asterisk,
    ParenLeft,
    ParenRight,
    Underscore,
    Plus,
    BraceLeft,
    BraceRight,
    Bar,
    Colon,
    QuoteDbl,
    Less,
    Greater,
    Question,
}

const LETTERS: [HostKey; 26] = [
    HostKey::A, HostKey::B, HostKey::C, HostKey::D, HostKey::E, HostKey::F, HostKey::G,
    HostKey::H, HostKey::I, HostKey::J, HostKey::K, HostKey::L, HostKey::M, HostKey::N,
    HostKey::O, HostKey::P, HostKey::Q, HostKey::R, HostKey::S, HostKey::T, HostKey::U,
    HostKey::V, HostKey::W, HostKey::X, HostKey::Y, HostKey::Z,
];

const DIGITS: [HostKey; 10] = [
    HostKey::Digit0, HostKey::Digit1, HostKey::Digit2, HostKey::Digit3, HostKey::Digit4,
    HostKey::Digit5, HostKey::Digit6, HostKey::Digit7, HostKey::Digit8, HostKey::Digit9,
];

const FUNCTION_KEYS: [HostKey; 12] = [
    HostKey::F1, HostKey::F2, HostKey::F3, HostKey::F4, HostKey::F5, HostKey::F6,
    HostKey::F7, HostKey::F8, HostKey::F9, HostKey::F10, HostKey::F11, HostKey::F12,
];

impl HostKey {
    /// `true` for Shift, Control, Alt and Meta.
    pub fn is_modifier(self) -> bool {
        matches!(self, HostKey::Shift | HostKey::Control | HostKey::Alt | HostKey::Meta)
    }

    /// Index of a letter key (`A` → 0), if this is one.
    pub fn letter_index(self) -> Option<u8> {
        LETTERS.iter().position(|&k| k == self).map(|i| i as u8)
    }

    /// Value of a digit key (`Digit7` → 7), if this is one.
    pub fn digit_value(self) -> Option<u8> {
        DIGITS.iter().position(|&k| k == self).map(|i| i as u8)
    }

    /// The letter key for `c` (case-insensitive).
    pub fn from_letter(c: char) -> Option<HostKey> {
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            Some(LETTERS[(upper as u8 - b'A') as usize])
        } else {
            None
        }
    }

    /// The digit key for `c`.
    pub fn from_digit(c: char) -> Option<HostKey> {
        c.to_digit(10).map(|d| DIGITS[d as usize])
    }

    /// `F1`..=`F12` by number.
    pub fn function(n: u8) -> Option<HostKey> {
        (1..=12).contains(&n).then(|| FUNCTION_KEYS[(n - 1) as usize])
    }

    /// The unshifted key that produces this symbol with Shift on a US layout.
    ///
    /// `!`→`1`, `@`→`2`, `#`→`3`, `$`→`4`, `%`→`5`, `^`→`6`, `&`→`7`, `*`→`8`,
    /// `(`→`9`, `)`→`0`, `_`→`-`, `+`→`=`.
    pub fn unshifted(self) -> Option<HostKey> {
        let base = match self {
            HostKey::Exclam => HostKey::Digit1,
            HostKey::At => HostKey::Digit2,
            HostKey::NumberSign => HostKey::Digit3,
            HostKey::Dollar => HostKey::Digit4,
            HostKey::Percent => HostKey::Digit5,
            HostKey::AsciiCircum => HostKey::Digit6,
            HostKey::Ampersand => HostKey::Digit7,
            HostKey::Asterisk => HostKey::Digit8,
            HostKey::ParenLeft => HostKey::Digit9,
            HostKey::ParenRight => HostKey::Digit0,
            HostKey::Underscore => HostKey::Minus,
            HostKey::Plus => HostKey::Equal,
            _ => return None,
        };
        Some(base)
    }
}

/// A physical mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

/// Anything a binding can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InputKey {
    Key(HostKey),
    Mouse(MouseButton),
    /// Virtual key synthesized from a wheel notch away from the user.
    WheelUp,
    /// Virtual key synthesized from a wheel notch toward the user.
    WheelDown,
}

impl InputKey {
    pub fn is_keyboard(&self) -> bool {
        matches!(self, InputKey::Key(_))
    }

    /// Stable numeric identity, used as the script `keyId` and as the
    /// session-variable bucket for touches owned by this key.
    pub fn id(&self) -> i64 {
        match self {
            InputKey::Key(k) => 0x1000 + *k as i64,
            InputKey::Mouse(b) => 0x2000 + *b as i64,
            InputKey::WheelUp => 0x3000,
            InputKey::WheelDown => 0x3001,
        }
    }
}

impl From<HostKey> for InputKey {
    fn from(k: HostKey) -> Self {
        InputKey::Key(k)
    }
}

// ── Modifiers ────────────────────────────────────────────────────────────────

/// Bitmask of held keyboard modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(0x01);
    pub const CONTROL: Modifiers = Modifiers(0x02);
    pub const ALT: Modifiers = Modifiers(0x04);
    pub const META: Modifiers = Modifiers(0x08);

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Keeps only Shift, Control and Alt; the set used for binding lookup.
    pub fn binding_mask(self) -> Modifiers {
        Modifiers(self.0 & (Self::SHIFT.0 | Self::CONTROL.0 | Self::ALT.0))
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Modifiers) {
        self.0 |= rhs.0;
    }
}

// ── Name parsing ─────────────────────────────────────────────────────────────

/// Parses a display name such as `"W"`, `"Ctrl+J"`, `"LMB"` or `"WheelUp"`.
///
/// Modifier prefixes are separated by `+`; the last part names the key.
/// Returns `None` for names that do not identify a key.
///
/// ```rust
/// use keytouch_core::keymap::{parse_key_name, HostKey, InputKey, Modifiers};
///
/// assert_eq!(parse_key_name("w"), Some((InputKey::Key(HostKey::W), Modifiers::NONE)));
/// assert_eq!(
///     parse_key_name("Ctrl+Shift+A"),
///     Some((InputKey::Key(HostKey::A), Modifiers::CONTROL | Modifiers::SHIFT)),
/// );
/// ```
pub fn parse_key_name(name: &str) -> Option<(InputKey, Modifiers)> {
    let name = name.trim();
    // A lone "+" names the Plus key, not an empty combination.
    if name == "+" {
        return Some((InputKey::Key(HostKey::Plus), Modifiers::NONE));
    }
    let parts: Vec<&str> = name.split('+').map(str::trim).filter(|p| !p.is_empty()).collect();
    let (key_part, modifier_parts) = parts.split_last()?;

    let mut modifiers = Modifiers::NONE;
    for part in modifier_parts {
        modifiers |= match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Modifiers::CONTROL,
            "shift" => Modifiers::SHIFT,
            "alt" => Modifiers::ALT,
            "meta" | "win" | "cmd" => Modifiers::META,
            _ => return None,
        };
    }

    Some((parse_single_key(key_part)?, modifiers))
}

fn parse_single_key(part: &str) -> Option<InputKey> {
    let lower = part.to_ascii_lowercase();
    let key = match lower.as_str() {
        "lmb" | "leftbutton" => return Some(InputKey::Mouse(MouseButton::Left)),
        "rmb" | "rightbutton" => return Some(InputKey::Mouse(MouseButton::Right)),
        "mmb" | "middlebutton" => return Some(InputKey::Mouse(MouseButton::Middle)),
        "xbutton1" | "backbutton" => return Some(InputKey::Mouse(MouseButton::Back)),
        "xbutton2" | "forwardbutton" => return Some(InputKey::Mouse(MouseButton::Forward)),
        "wheelup" | "滚上" => return Some(InputKey::WheelUp),
        "wheeldown" | "滚下" => return Some(InputKey::WheelDown),
        "space" => HostKey::Space,
        "tab" => HostKey::Tab,
        "enter" | "return" => HostKey::Return,
        "numpadenter" => HostKey::Enter,
        "esc" | "escape" => HostKey::Escape,
        "backspace" => HostKey::Backspace,
        "delete" | "del" => HostKey::Delete,
        "insert" | "ins" => HostKey::Insert,
        "home" => HostKey::Home,
        "end" => HostKey::End,
        "pageup" | "pgup" => HostKey::PageUp,
        "pagedown" | "pgdown" => HostKey::PageDown,
        "shift" => HostKey::Shift,
        "ctrl" | "control" => HostKey::Control,
        "alt" => HostKey::Alt,
        "meta" | "win" | "cmd" => HostKey::Meta,
        "capslock" => HostKey::CapsLock,
        "up" | "↑" => HostKey::Up,
        "down" | "↓" => HostKey::Down,
        "left" | "←" => HostKey::Left,
        "right" | "→" => HostKey::Right,
        "=" | "equal" => HostKey::Equal,
        "plus" => HostKey::Plus,
        "-" | "minus" => HostKey::Minus,
        "*" | "asterisk" => HostKey::Asterisk,
        "/" | "slash" => HostKey::Slash,
        "`" | "quoteleft" => HostKey::QuoteLeft,
        "~" | "asciitilde" => HostKey::AsciiTilde,
        "\\" | "backslash" => HostKey::Backslash,
        "[" | "bracketleft" => HostKey::BracketLeft,
        "]" | "bracketright" => HostKey::BracketRight,
        ";" | "semicolon" => HostKey::Semicolon,
        "'" | "apostrophe" => HostKey::Apostrophe,
        "," | "comma" => HostKey::Comma,
        "." | "period" => HostKey::Period,
        _ => return parse_letter_digit_or_function(part).map(InputKey::Key),
    };
    Some(InputKey::Key(key))
}

fn parse_letter_digit_or_function(part: &str) -> Option<HostKey> {
    let mut chars = part.chars();
    let first = chars.next()?;
    if chars.as_str().is_empty() {
        return HostKey::from_letter(first).or_else(|| HostKey::from_digit(first));
    }
    if first.eq_ignore_ascii_case(&'f') {
        let n: u8 = chars.as_str().parse().ok()?;
        return HostKey::function(n);
    }
    None
}
