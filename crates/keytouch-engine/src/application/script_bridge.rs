//! ScriptBridge: the seam between the event loop and the script runtime.
//!
//! # Who talks to whom (for beginners)
//!
//! Scripts run on their own worker threads, the handlers run on the event
//! loop.  The two sides share exactly one object, [`ScriptHost`], which only
//! holds thread-safe state: the session variables, a clone of the control
//! channel, a snapshot of the input state and the current binding table.
//!
//! Touches and keys a script sends go straight through the host's control
//! channel.  Everything that has to change event-loop state (re-center the
//! camera, toggle capture, show a tip) is sent back as a [`ScriptEvent`] over
//! a bounded channel and applied on the loop's own turn by
//! [`ScriptBridge::drain_events`].
//!
//! The runtime itself lives in the infrastructure layer and is reached only
//! through the [`ScriptRuntime`] port.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use keytouch_core::keymap::parse_key_name;
use keytouch_core::{Binding, HostKey, InputKey, KeyMap, Modifiers, PointF, RectF, SizeF, TouchAction};
use regex::Regex;
use tracing::{debug, error, info, warn};

use super::lock;
use super::output::ControlChannel;
use super::session_vars::SessionVars;
use super::settings::HumanizeSettings;

// ── Events ────────────────────────────────────────────────────────────────────

/// A script-originated action that must run on the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Tip { message: String, duration_ms: u32, key_id: i64 },
    ShotMode(bool),
    RadialParam { up: f64, down: f64, left: f64, right: f64 },
    ResetView,
    ResetWheel,
    SimulateKey { name: String, pressed: bool },
    KeyUiPos { name: String, pos: PointF },
    SoftTimeout { sandbox_id: i64 },
    HardTimeout { sandbox_id: i64 },
    Error { sandbox_id: i64, message: String },
    Finished { sandbox_id: i64 },
}

// ── Collaborator ports ───────────────────────────────────────────────────────

/// One captured video frame, tightly packed RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.rgba.is_empty()
    }
}

/// Supplies the most recent video frame.  May return `None` when no frame
/// has been decoded yet.
pub trait FrameGrabber: Send + Sync {
    fn grab(&self) -> Option<Frame>;
}

/// Result of a template search, in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MatchResult {
    pub found: bool,
    pub pos: PointF,
    pub confidence: f64,
}

impl MatchResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Finds a named template image inside a normalized region of a frame.
#[cfg_attr(test, mockall::automock)]
pub trait ImageMatcher: Send + Sync {
    fn find(&self, frame: &Frame, template: &str, region: RectF, threshold: f64) -> MatchResult;
}

/// The script runtime as seen from the event loop.
///
/// Sandbox ids are positive and increasing for key-triggered scripts and
/// negative and decreasing for auto-start scripts.
pub trait ScriptRuntime: Send + Sync {
    /// Gives running and future sandboxes access to the session.
    fn attach_session(&self, host: Arc<ScriptHost>);

    /// Clears the session reference; API calls needing it become no-ops.
    fn detach_session(&self);

    fn run_inline(&self, script: &str, key_id: i64, anchor: PointF, is_press: bool) -> i64;

    fn run_file(&self, path: &Path, key_id: i64, anchor: PointF, is_press: bool) -> i64;

    fn run_auto_start(&self, script: &str) -> i64;

    /// Stops every sandbox and waits (bounded) for the workers to exit.
    fn stop_all(&self);

    fn running_count(&self) -> usize;

    /// Next queued event, without blocking.
    fn try_next_event(&self) -> Option<ScriptEvent>;

    fn set_frame_grabber(&self, grabber: Option<Arc<dyn FrameGrabber>>);
}

// ── Host state shared with scripts ───────────────────────────────────────────

/// Input state published by the event loop for scripts to read.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    pub mouse_pos: PointF,
    pub captured: bool,
    pub key_states: HashMap<InputKey, bool>,
    /// Pixel size touch jitter is scaled against.
    pub target_size: SizeF,
}

/// Thread-safe session state handed to script workers.
pub struct ScriptHost {
    vars: Arc<SessionVars>,
    out: ControlChannel,
    humanize: HumanizeSettings,
    input: Mutex<InputSnapshot>,
    keymap: RwLock<Arc<KeyMap>>,
}

impl ScriptHost {
    pub fn new(vars: Arc<SessionVars>, out: ControlChannel, humanize: HumanizeSettings) -> Self {
        Self {
            vars,
            out,
            humanize,
            input: Mutex::new(InputSnapshot::default()),
            keymap: RwLock::new(Arc::new(KeyMap::default())),
        }
    }

    pub fn vars(&self) -> &Arc<SessionVars> {
        &self.vars
    }

    pub fn out(&self) -> &ControlChannel {
        &self.out
    }

    pub fn humanize(&self) -> &HumanizeSettings {
        &self.humanize
    }

    pub fn keymap(&self) -> Arc<KeyMap> {
        match self.keymap.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn set_keymap(&self, keymap: Arc<KeyMap>) {
        match self.keymap.write() {
            Ok(mut guard) => *guard = keymap,
            Err(poisoned) => *poisoned.into_inner() = keymap,
        }
    }

    pub fn snapshot(&self) -> InputSnapshot {
        lock(&self.input).clone()
    }

    pub fn mouse_pos(&self) -> PointF {
        lock(&self.input).mouse_pos
    }

    pub fn set_mouse_pos(&self, pos: PointF) {
        lock(&self.input).mouse_pos = pos;
    }

    pub fn is_captured(&self) -> bool {
        lock(&self.input).captured
    }

    pub fn set_captured(&self, captured: bool) {
        lock(&self.input).captured = captured;
    }

    pub fn target_size(&self) -> SizeF {
        lock(&self.input).target_size
    }

    pub fn set_target_size(&self, size: SizeF) {
        lock(&self.input).target_size = size;
    }

    pub fn set_key_state(&self, key: InputKey, pressed: bool) {
        lock(&self.input).key_states.insert(key, pressed);
    }

    pub fn is_key_pressed(&self, key: InputKey) -> bool {
        lock(&self.input).key_states.get(&key).copied().unwrap_or(false)
    }

    pub fn clear_key_states(&self) {
        lock(&self.input).key_states.clear();
    }

    /// Whether the script binding named `name` is currently held, including
    /// every modifier its trigger requires.  Non-script bindings read `false`.
    pub fn key_state_by_name(&self, name: &str) -> bool {
        let keymap = self.keymap();
        let Some((key, modifiers)) = parse_key_name(name) else {
            return false;
        };
        let Some(Binding::Script { trigger, .. }) = keymap.lookup(key, modifiers) else {
            return false;
        };

        let input = lock(&self.input);
        let held = |k: InputKey| input.key_states.get(&k).copied().unwrap_or(false);
        if !held(trigger.key) {
            return false;
        }
        [
            (Modifiers::CONTROL, HostKey::Control),
            (Modifiers::SHIFT, HostKey::Shift),
            (Modifiers::ALT, HostKey::Alt),
        ]
        .into_iter()
        .filter(|(m, _)| trigger.modifiers.contains(*m))
        .all(|(_, k)| held(InputKey::Key(k)))
    }

    /// Anchor of the steer-wheel or script binding named `name`, rounded to
    /// four decimals.
    pub fn key_pos_by_name(&self, name: &str) -> Option<PointF> {
        let keymap = self.keymap();
        match keymap.lookup_by_name(name)? {
            b @ (Binding::SteerWheel(_) | Binding::Script { .. }) => b.position().map(|p| p.rounded4()),
            _ => None,
        }
    }
}

// ── Auto-start detection ─────────────────────────────────────────────────────

/// `true` when a script carries the `@autoStart` marker on a comment line.
pub fn is_auto_start_script(script: &str) -> bool {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"(?mi)^\s*(//|--)\s*@(autoStart|自动启动)\s*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(script))
}

/// Treats a single-line script ending in `.lua` as a file reference.
fn as_script_path(script: &str) -> Option<&Path> {
    let trimmed = script.trim();
    (!trimmed.contains('\n') && trimmed.ends_with(".lua")).then(|| Path::new(trimmed))
}

// ── Bridge ───────────────────────────────────────────────────────────────────

pub type TipListener = Box<dyn FnMut(&str, u32, i64) + Send>;
pub type OverlayListener = Box<dyn FnMut(&str, PointF) + Send>;

/// Upper bound on events applied per drain so one chatty script cannot
/// starve the event loop.
pub const MAX_EVENTS_PER_DRAIN: usize = 256;

pub struct ScriptBridge {
    runtime: Arc<dyn ScriptRuntime>,
    host: Arc<ScriptHost>,
    tip_listener: Option<TipListener>,
    overlay_listener: Option<OverlayListener>,
    key_ui_overrides: HashMap<String, PointF>,
}

impl ScriptBridge {
    pub fn new(runtime: Arc<dyn ScriptRuntime>, host: Arc<ScriptHost>) -> Self {
        runtime.attach_session(Arc::clone(&host));
        Self {
            runtime,
            host,
            tip_listener: None,
            overlay_listener: None,
            key_ui_overrides: HashMap::new(),
        }
    }

    pub fn host(&self) -> &Arc<ScriptHost> {
        &self.host
    }

    pub fn runtime(&self) -> &Arc<dyn ScriptRuntime> {
        &self.runtime
    }

    /// Replaces the tip consumer.  `None` falls back to logging.
    pub fn set_tip_listener(&mut self, listener: Option<TipListener>) {
        self.tip_listener = listener;
    }

    /// Replaces the overlay consumer and replays current overrides to it.
    pub fn set_overlay_listener(&mut self, listener: Option<OverlayListener>) {
        self.overlay_listener = listener;
        if let Some(listener) = self.overlay_listener.as_mut() {
            for (name, pos) in &self.key_ui_overrides {
                listener(name, *pos);
            }
        }
    }

    pub fn key_ui_pos(&self, name: &str) -> Option<PointF> {
        self.key_ui_overrides.get(name).copied()
    }

    pub fn set_frame_grabber(&self, grabber: Option<Arc<dyn FrameGrabber>>) {
        self.runtime.set_frame_grabber(grabber);
    }

    pub fn running_count(&self) -> usize {
        self.runtime.running_count()
    }

    /// Starts a fresh sandbox for a script binding transition.
    pub fn run_binding_script(&self, key: InputKey, anchor: PointF, script: &str, is_press: bool) -> i64 {
        let key_id = key.id();
        match as_script_path(script) {
            Some(path) => self.runtime.run_file(path, key_id, anchor, is_press),
            None => self.runtime.run_inline(script, key_id, anchor, is_press),
        }
    }

    pub fn run_inline_script(&self, script: &str, key_id: i64, anchor: PointF, is_press: bool) -> i64 {
        self.runtime.run_inline(script, key_id, anchor, is_press)
    }

    /// Starts every script binding carrying the auto-start marker.
    pub fn run_auto_start_scripts(&self, keymap: &KeyMap) -> usize {
        let mut started = 0;
        for (_, _, script) in keymap.scripts() {
            if is_auto_start_script(script) {
                let id = self.runtime.run_auto_start(script);
                debug!(sandbox_id = id, "auto-start script launched");
                started += 1;
            }
        }
        if started > 0 {
            info!(count = started, "auto-start scripts running");
        }
        started
    }

    /// Lifts every touch a script still holds.
    pub fn release_all_script_touches(&self) -> usize {
        let seqs = self.host.vars().take_all_touch_seqs();
        for &seq in &seqs {
            self.host.out().send_touch(seq, TouchAction::Up, PointF::default());
        }
        if !seqs.is_empty() {
            debug!(count = seqs.len(), "released script touches");
        }
        seqs.len()
    }

    /// Stops every sandbox and lifts their touches.
    pub fn reset_script_state(&mut self) {
        self.runtime.stop_all();
        self.release_all_script_touches();
        self.host.vars().set_radial_owner("");
        self.key_ui_overrides.clear();
    }

    /// Applies bridge-local events and returns the ones the session owns.
    pub fn drain_events(&mut self) -> Vec<ScriptEvent> {
        let mut forwarded = Vec::new();
        for _ in 0..MAX_EVENTS_PER_DRAIN {
            let Some(event) = self.runtime.try_next_event() else {
                break;
            };
            match event {
                ScriptEvent::Tip { message, duration_ms, key_id } => {
                    self.show_tip(&message, duration_ms, key_id);
                }
                ScriptEvent::KeyUiPos { name, pos } => {
                    if let Some(listener) = self.overlay_listener.as_mut() {
                        listener(&name, pos);
                    }
                    self.key_ui_overrides.insert(name, pos);
                }
                ScriptEvent::Error { sandbox_id, message } => {
                    warn!(sandbox_id, %message, "script error");
                    self.show_tip(&message, 3_000, sandbox_id);
                }
                ScriptEvent::SoftTimeout { sandbox_id } => {
                    warn!(sandbox_id, "script soft timeout, interrupting");
                }
                ScriptEvent::HardTimeout { sandbox_id } => {
                    error!(sandbox_id, "script hard timeout, worker terminated");
                }
                ScriptEvent::Finished { sandbox_id } => {
                    debug!(sandbox_id, "script finished");
                }
                other => forwarded.push(other),
            }
        }
        forwarded
    }

    /// Detaches the session and stops every sandbox.  Must run before any
    /// handler is reset.
    pub fn shutdown(&self) {
        self.runtime.detach_session();
        self.runtime.stop_all();
    }

    fn show_tip(&mut self, message: &str, duration_ms: u32, key_id: i64) {
        match self.tip_listener.as_mut() {
            Some(listener) => listener(message, duration_ms, key_id),
            None => info!(key_id, duration_ms, "tip: {message}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! An in-memory runtime that records launches and replays queued events.

    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Launch {
        Inline { script: String, key_id: i64, anchor: PointF, is_press: bool },
        File { path: String, key_id: i64, is_press: bool },
        AutoStart { script: String },
    }

    #[derive(Default)]
    pub struct FakeRuntime {
        pub launches: Mutex<Vec<Launch>>,
        pub events: Mutex<VecDeque<ScriptEvent>>,
        pub attached: Mutex<bool>,
        pub stop_all_calls: Mutex<u32>,
        next_id: Mutex<i64>,
    }

    impl FakeRuntime {
        pub fn push_event(&self, event: ScriptEvent) {
            self.events.lock().unwrap().push_back(event);
        }

        pub fn launches(&self) -> Vec<Launch> {
            self.launches.lock().unwrap().clone()
        }

        fn id(&self) -> i64 {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        }
    }

    impl ScriptRuntime for FakeRuntime {
        fn attach_session(&self, _host: Arc<ScriptHost>) {
            *self.attached.lock().unwrap() = true;
        }

        fn detach_session(&self) {
            *self.attached.lock().unwrap() = false;
        }

        fn run_inline(&self, script: &str, key_id: i64, anchor: PointF, is_press: bool) -> i64 {
            self.launches.lock().unwrap().push(Launch::Inline {
                script: script.to_string(),
                key_id,
                anchor,
                is_press,
            });
            self.id()
        }

        fn run_file(&self, path: &Path, key_id: i64, _anchor: PointF, is_press: bool) -> i64 {
            self.launches.lock().unwrap().push(Launch::File {
                path: path.display().to_string(),
                key_id,
                is_press,
            });
            self.id()
        }

        fn run_auto_start(&self, script: &str) -> i64 {
            self.launches
                .lock()
                .unwrap()
                .push(Launch::AutoStart { script: script.to_string() });
            -self.id()
        }

        fn stop_all(&self) {
            *self.stop_all_calls.lock().unwrap() += 1;
        }

        fn running_count(&self) -> usize {
            0
        }

        fn try_next_event(&self) -> Option<ScriptEvent> {
            self.events.lock().unwrap().pop_front()
        }

        fn set_frame_grabber(&self, _grabber: Option<Arc<dyn FrameGrabber>>) {}
    }
}
