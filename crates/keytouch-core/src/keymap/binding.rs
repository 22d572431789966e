//! The binding table: which physical input triggers which action.
//!
//! A key-map file is JSON:
//!
//! ```json
//! {
//!   "switchKey": "`",
//!   "mouseMoveMap": { "startPos": {"x": 0.6, "y": 0.4}, "speedRatioX": 4.0, "speedRatioY": 2.0 },
//!   "keyMapNodes": [
//!     { "type": "KMT_STEER_WHEEL", "centerPos": {"x": 0.2, "y": 0.7},
//!       "upKey": "W", "downKey": "S", "leftKey": "A", "rightKey": "D",
//!       "upOffset": 0.1, "downOffset": 0.1, "leftOffset": 0.08, "rightOffset": 0.08 },
//!     { "type": "KMT_ANDROID_KEY", "key": "Escape", "androidKey": "BACK" },
//!     { "type": "KMT_SCRIPT", "key": "LMB", "pos": {"x": 0.8, "y": 0.8}, "script": "mapi.click()" },
//!     { "type": "KMT_FREE_LOOK", "key": "Alt", "startPos": {"x": 0.7, "y": 0.3},
//!       "speedRatioX": 3.0, "speedRatioY": 3.0, "resetViewOnRelease": true }
//!   ]
//! }
//! ```
//!
//! Loading never fails on a single bad entry: a malformed node is skipped and
//! logged, and the rest of the table still loads.  Only unparseable JSON is an
//! error.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::android::{keycode_by_name, AndroidKeycode};
use super::keys::{parse_key_name, HostKey, InputKey, Modifiers};
use crate::domain::geometry::PointF;

/// Error loading a key-map document.
#[derive(Debug, Error)]
pub enum KeyMapError {
    #[error("key map is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key map root must be a JSON object")]
    NotAnObject,
}

/// The input that triggers a binding, with the modifiers that must be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub key: InputKey,
    pub modifiers: Modifiers,
}

impl Trigger {
    pub fn new(key: InputKey, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

/// One direction of the virtual joystick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionKey {
    pub trigger: Trigger,
    /// Base offset from the center, in normalized units.
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteerWheelBinding {
    pub center: PointF,
    pub up: DirectionKey,
    pub down: DirectionKey,
    pub left: DirectionKey,
    pub right: DirectionKey,
}

impl SteerWheelBinding {
    /// Which direction `key` drives, if any.
    pub fn direction_of(&self, key: InputKey) -> Option<Direction> {
        [
            (Direction::Up, &self.up),
            (Direction::Down, &self.down),
            (Direction::Left, &self.left),
            (Direction::Right, &self.right),
        ]
        .into_iter()
        .find(|(_, d)| d.trigger.key == key)
        .map(|(dir, _)| dir)
    }

    pub fn offset(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Up => self.up.offset,
            Direction::Down => self.down.offset,
            Direction::Left => self.left.offset,
            Direction::Right => self.right.offset,
        }
    }
}

/// Joystick direction.  The discriminant indexes coefficient arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    /// Bit used in the pressed-state mask.
    pub fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Mouse-look configuration used by the Viewport handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseMoveBinding {
    pub start_pos: PointF,
    pub speed_ratio: PointF,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeLookBinding {
    pub trigger: Trigger,
    pub start_pos: PointF,
    pub speed_ratio: PointF,
    pub reset_view_on_release: bool,
}

/// One configured key → action mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    SteerWheel(SteerWheelBinding),
    MouseMove(MouseMoveBinding),
    AndroidKey { trigger: Trigger, keycode: AndroidKeycode },
    Script { trigger: Trigger, pos: PointF, script: String },
    FreeLook(FreeLookBinding),
}

impl Binding {
    /// Anchor position shown for the binding, if it has one.
    pub fn position(&self) -> Option<PointF> {
        match self {
            Binding::SteerWheel(sw) => Some(sw.center),
            Binding::Script { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    fn triggers(&self) -> Vec<Trigger> {
        match self {
            Binding::SteerWheel(sw) => vec![
                sw.left.trigger,
                sw.right.trigger,
                sw.up.trigger,
                sw.down.trigger,
            ],
            Binding::MouseMove(_) => Vec::new(),
            Binding::AndroidKey { trigger, .. } | Binding::Script { trigger, .. } => vec![*trigger],
            Binding::FreeLook(fl) => vec![fl.trigger],
        }
    }
}

/// The loaded binding table.
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: Vec<Binding>,
    by_key: HashMap<(HostKey, Modifiers), usize>,
    by_other: HashMap<InputKey, usize>,
    steer_wheel: Option<usize>,
    mouse_move: Option<usize>,
    switch_key: InputKey,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            by_key: HashMap::new(),
            by_other: HashMap::new(),
            steer_wheel: None,
            mouse_move: None,
            switch_key: InputKey::Key(HostKey::QuoteLeft),
        }
    }
}

impl KeyMap {
    /// Parses a key-map document.
    ///
    /// # Errors
    ///
    /// Returns [`KeyMapError`] only when the document itself is not a JSON
    /// object; individual malformed nodes are skipped.
    pub fn from_json(json: &str) -> Result<Self, KeyMapError> {
        let root: Value = serde_json::from_str(json)?;
        let root = root.as_object().ok_or(KeyMapError::NotAnObject)?;

        let mut map = KeyMap::default();

        if let Some(name) = root.get("switchKey").and_then(Value::as_str) {
            match parse_key_name(name) {
                Some((key, _)) => map.switch_key = key,
                None => warn!("key map: unknown switchKey {name:?}, keeping default"),
            }
        }

        if let Some(legacy) = root.get("mouseMoveMap").and_then(Value::as_object) {
            match parse_legacy_mouse_move(legacy) {
                Some(binding) => {
                    map.mouse_move = Some(map.bindings.len());
                    map.bindings.push(Binding::MouseMove(binding));
                }
                None => warn!("key map: mouseMoveMap is missing startPos or speed ratio"),
            }
        }

        if let Some(nodes) = root.get("keyMapNodes").and_then(Value::as_array) {
            for (index, node) in nodes.iter().enumerate() {
                let Some(node) = node.as_object() else {
                    warn!(index, "key map: node is not an object, skipped");
                    continue;
                };
                if let Err(reason) = map.push_node(node) {
                    warn!(index, %reason, "key map: node skipped");
                }
            }
        }

        map.rebuild_index();
        debug!(bindings = map.bindings.len(), "key map loaded");
        Ok(map)
    }

    fn push_node(&mut self, node: &Map<String, Value>) -> Result<(), String> {
        let kind = node
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing type".to_string())?;

        match kind {
            "KMT_STEER_WHEEL" => {
                let binding = SteerWheelBinding {
                    center: pos(node, "centerPos")?,
                    up: direction(node, "upKey", "upOffset")?,
                    down: direction(node, "downKey", "downOffset")?,
                    left: direction(node, "leftKey", "leftOffset")?,
                    right: direction(node, "rightKey", "rightOffset")?,
                };
                self.steer_wheel = Some(self.bindings.len());
                self.bindings.push(Binding::SteerWheel(binding));
            }
            "KMT_ANDROID_KEY" => {
                let trigger = trigger(node, "key")?;
                let keycode = match node.get("androidKey") {
                    Some(Value::Number(n)) => n
                        .as_u64()
                        .and_then(|v| AndroidKeycode::try_from(v).ok())
                        .ok_or_else(|| "androidKey out of range".to_string())?,
                    Some(Value::String(s)) => {
                        keycode_by_name(s).ok_or_else(|| format!("unknown androidKey {s:?}"))?
                    }
                    _ => return Err("missing androidKey".to_string()),
                };
                self.bindings.push(Binding::AndroidKey { trigger, keycode });
            }
            "KMT_SCRIPT" => {
                let trigger = trigger(node, "key")?;
                let script = node
                    .get("script")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing script".to_string())?
                    .to_string();
                let pos = pos(node, "pos")?;
                self.bindings.push(Binding::Script { trigger, pos, script });
            }
            "KMT_CAMERA_MOVE" => {
                // The camera node's key doubles as the capture switch key.
                if let Ok(t) = trigger(node, "key") {
                    self.switch_key = t.key;
                }
                let binding = MouseMoveBinding {
                    start_pos: pos(node, "pos")?,
                    speed_ratio: PointF::new(
                        number(node, "speedRatioX")?,
                        number(node, "speedRatioY")?,
                    ),
                };
                self.mouse_move = Some(self.bindings.len());
                self.bindings.push(Binding::MouseMove(binding));
            }
            "KMT_FREE_LOOK" => {
                let binding = FreeLookBinding {
                    trigger: trigger(node, "key")?,
                    start_pos: pos(node, "startPos")?,
                    speed_ratio: PointF::new(
                        number(node, "speedRatioX")?,
                        number(node, "speedRatioY")?,
                    ),
                    reset_view_on_release: node
                        .get("resetViewOnRelease")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                };
                self.bindings.push(Binding::FreeLook(binding));
            }
            other => return Err(format!("unsupported type {other:?}")),
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.by_key.clear();
        self.by_other.clear();
        for (i, binding) in self.bindings.iter().enumerate() {
            for t in binding.triggers() {
                match t.key {
                    InputKey::Key(k) => {
                        self.by_key.insert((k, t.modifiers.binding_mask()), i);
                    }
                    other => {
                        self.by_other.insert(other, i);
                    }
                }
            }
        }
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Looks up a keyboard binding, first with the exact modifier mask and
    /// then with no modifiers.
    pub fn lookup_key(&self, key: HostKey, modifiers: Modifiers) -> Option<&Binding> {
        self.by_key
            .get(&(key, modifiers.binding_mask()))
            .or_else(|| self.by_key.get(&(key, Modifiers::NONE)))
            .map(|&i| &self.bindings[i])
    }

    /// Looks up a mouse-button or wheel binding.
    pub fn lookup_other(&self, key: InputKey) -> Option<&Binding> {
        self.by_other.get(&key).map(|&i| &self.bindings[i])
    }

    pub fn lookup(&self, key: InputKey, modifiers: Modifiers) -> Option<&Binding> {
        match key {
            InputKey::Key(k) => self.lookup_key(k, modifiers),
            other => self.lookup_other(other),
        }
    }

    /// Looks up a binding by display name such as `"Ctrl+J"` or `"LMB"`.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Binding> {
        let (key, modifiers) = parse_key_name(name)?;
        self.lookup(key, modifiers)
    }

    pub fn steer_wheel(&self) -> Option<&SteerWheelBinding> {
        match self.steer_wheel.map(|i| &self.bindings[i]) {
            Some(Binding::SteerWheel(sw)) => Some(sw),
            _ => None,
        }
    }

    pub fn mouse_move(&self) -> Option<&MouseMoveBinding> {
        match self.mouse_move.map(|i| &self.bindings[i]) {
            Some(Binding::MouseMove(mm)) => Some(mm),
            _ => None,
        }
    }

    pub fn is_valid_mouse_move_map(&self) -> bool {
        self.mouse_move().is_some()
    }

    pub fn switch_key(&self) -> InputKey {
        self.switch_key
    }

    pub fn is_switch_on_keyboard(&self) -> bool {
        self.switch_key.is_keyboard()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// All script bindings with their triggers.
    pub fn scripts(&self) -> impl Iterator<Item = (Trigger, PointF, &str)> {
        self.bindings.iter().filter_map(|b| match b {
            Binding::Script { trigger, pos, script } => Some((*trigger, *pos, script.as_str())),
            _ => None,
        })
    }
}

// ── JSON field helpers ────────────────────────────────────────────────────────

fn number(node: &Map<String, Value>, name: &str) -> Result<f64, String> {
    node.get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("missing number {name}"))
}

fn pos(node: &Map<String, Value>, name: &str) -> Result<PointF, String> {
    let obj = node
        .get(name)
        .and_then(Value::as_object)
        .ok_or_else(|| format!("missing position {name}"))?;
    Ok(PointF::new(number(obj, "x")?, number(obj, "y")?))
}

fn trigger(node: &Map<String, Value>, name: &str) -> Result<Trigger, String> {
    let text = node
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing key {name}"))?;
    let (key, modifiers) = parse_key_name(text).ok_or_else(|| format!("unknown key {text:?}"))?;
    Ok(Trigger::new(key, modifiers))
}

fn direction(node: &Map<String, Value>, key: &str, offset: &str) -> Result<DirectionKey, String> {
    Ok(DirectionKey {
        trigger: trigger(node, key)?,
        offset: number(node, offset)?,
    })
}

fn parse_legacy_mouse_move(node: &Map<String, Value>) -> Option<MouseMoveBinding> {
    let mut ratio = None;
    if let Some(r) = node.get("speedRatio").and_then(Value::as_f64) {
        ratio = Some(PointF::new(r, r / 2.25));
    }
    if let Some(x) = node.get("speedRatioX").and_then(Value::as_f64) {
        ratio = Some(PointF::new(x, ratio.map_or(1.0, |r| r.y)));
    }
    if let Some(y) = node.get("speedRatioY").and_then(Value::as_f64) {
        ratio = Some(PointF::new(ratio.map_or(1.0, |r| r.x), y));
    }
    Some(MouseMoveBinding {
        start_pos: pos(node, "startPos").ok()?,
        speed_ratio: ratio?,
    })
}
