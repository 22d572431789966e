//! SessionContext: the per-device aggregate and its public facade.
//!
//! # What lives here (for beginners)
//!
//! One connected device gets one `SessionContext`.  It builds and owns, in
//! this order:
//!
//! 1. [`SessionVars`], shared with script workers;
//! 2. the [`ScriptBridge`] and its [`ScriptHost`];
//! 3. the [`HandlerChain`] with the five gesture handlers;
//! 4. the [`InputDispatcher`] that routes host input into the chain.
//!
//! Everything the window layer needs goes through the methods on this type:
//! input intake, key-map loading, capture control, script control and
//! coordinate conversion.
//!
//! # Time
//!
//! Nothing here blocks.  Handlers arm [`Timer`](super::timer::Timer)s, and the
//! host calls [`SessionContext::poll`] from its event loop.  `poll` fires every
//! due timer in deadline order and then applies queued script events.
//!
//! # Teardown
//!
//! Dropping the session first detaches the script runtime from it and stops
//! every sandbox, and only then resets the handlers.  A script worker can
//! therefore never observe a half-destroyed session.

use std::sync::Arc;
use std::time::Instant;

use keytouch_core::keymap::parse_key_name;
use keytouch_core::{InputKey, KeyMap, KeyMapError, PointF, SizeF, TouchSequence};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::chain::HandlerChain;
use super::dispatcher::{CursorController, InputDispatcher};
use super::handlers::HandlerContext;
use super::input::{KeyInput, MouseInput, ViewSizes, WheelInput};
use super::output::{ControlChannel, ControlSink};
use super::script_bridge::{
    FrameGrabber, OverlayListener, ScriptBridge, ScriptEvent, ScriptHost, ScriptRuntime, TipListener,
};
use super::session_vars::SessionVars;
use super::settings::HumanizeSettings;
use super::timer::Clock;

/// Upper bound on timer callbacks per `poll`, so a handler that keeps
/// re-arming a zero-delay timer cannot stall the loop.
const MAX_TIMER_FIRES_PER_POLL: usize = 10_000;

/// Collaborators injected into a session.
pub struct SessionServices {
    pub sink: Arc<dyn ControlSink>,
    pub sequence: Arc<TouchSequence>,
    pub runtime: Arc<dyn ScriptRuntime>,
    pub cursor: Arc<dyn CursorController>,
    pub clock: Arc<dyn Clock>,
    pub humanize: HumanizeSettings,
    pub rng: StdRng,
}

pub struct SessionContext {
    vars: Arc<SessionVars>,
    out: ControlChannel,
    scripts: ScriptBridge,
    dispatcher: InputDispatcher,
    keymap: Arc<KeyMap>,
    humanize: HumanizeSettings,
    rng: StdRng,
    clock: Arc<dyn Clock>,
    sizes: ViewSizes,
    first_frame_seen: bool,
    auto_start_pending: bool,
    shut_down: bool,
}

impl SessionContext {
    pub fn new(services: SessionServices) -> Self {
        let SessionServices { sink, sequence, runtime, cursor, clock, humanize, rng } = services;

        let vars = Arc::new(SessionVars::new());
        let out = ControlChannel::new(sink, sequence);
        let host = Arc::new(ScriptHost::new(Arc::clone(&vars), out.clone(), humanize));
        let scripts = ScriptBridge::new(runtime, host);
        let dispatcher = InputDispatcher::new(HandlerChain::with_default_handlers(), cursor);

        let mut session = Self {
            vars,
            out,
            scripts,
            dispatcher,
            keymap: Arc::new(KeyMap::default()),
            humanize,
            rng,
            clock,
            sizes: ViewSizes::default(),
            first_frame_seen: false,
            auto_start_pending: false,
            shut_down: false,
        };
        session.with_ctx(|dispatcher, _, ctx| {
            dispatcher.chain_mut().init(ctx);
            dispatcher.set_cursor_captured(false, ctx);
        });
        session
    }

    /// Runs `f` with a handler context borrowing this session's state.
    fn with_ctx<R>(
        &mut self,
        f: impl FnOnce(&mut InputDispatcher, &mut ScriptBridge, &mut HandlerContext<'_>) -> R,
    ) -> R {
        let now = self.clock.now();
        let Self { out, keymap, humanize, rng, sizes, dispatcher, scripts, .. } = self;
        let mut ctx = HandlerContext::new(out, keymap.as_ref(), humanize, rng, now, *sizes);
        f(dispatcher, scripts, &mut ctx)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn vars(&self) -> &Arc<SessionVars> {
        &self.vars
    }

    pub fn keymap(&self) -> &Arc<KeyMap> {
        &self.keymap
    }

    pub fn dispatcher(&self) -> &InputDispatcher {
        &self.dispatcher
    }

    pub fn chain(&self) -> &HandlerChain {
        self.dispatcher.chain()
    }

    pub fn script_bridge(&self) -> &ScriptBridge {
        &self.scripts
    }

    pub fn sizes(&self) -> ViewSizes {
        self.sizes
    }

    // ── Event intake ──────────────────────────────────────────────────────────

    pub fn key_event(&mut self, input: &KeyInput, frame: SizeF, show: SizeF) {
        self.update_sizes(frame, show);
        self.with_ctx(|dispatcher, scripts, ctx| dispatcher.key_event(input, scripts, ctx));
        self.publish_input_state();
    }

    pub fn mouse_event(&mut self, input: &MouseInput, frame: SizeF, show: SizeF) {
        self.update_sizes(frame, show);
        self.with_ctx(|dispatcher, scripts, ctx| dispatcher.mouse_event(input, scripts, ctx));
        self.publish_input_state();
    }

    pub fn wheel_event(&mut self, input: &WheelInput, frame: SizeF, show: SizeF) {
        self.update_sizes(frame, show);
        self.with_ctx(|dispatcher, scripts, ctx| dispatcher.wheel_event(input, scripts, ctx));
    }

    pub fn on_window_focus_lost(&mut self) {
        self.with_ctx(|dispatcher, scripts, ctx| dispatcher.on_focus_lost(scripts, ctx));
        self.publish_input_state();
    }

    fn update_sizes(&mut self, frame: SizeF, show: SizeF) {
        let sizes = ViewSizes::new(frame, show);
        if sizes != self.sizes {
            self.sizes = sizes;
            self.dispatcher.on_size_changed();
        }
    }

    pub fn set_mobile_size(&mut self, size: SizeF) {
        self.dispatcher.set_mobile_size(size);
    }

    fn publish_input_state(&self) {
        let host = self.scripts.host();
        host.set_captured(self.dispatcher.is_cursor_captured());
        host.set_mouse_pos(self.mouse_pos());
        host.set_target_size(self.sizes.target());
    }

    // ── Timers and script events ──────────────────────────────────────────────

    /// Fires due timers, then applies queued script events.  Returns the
    /// number of timer callbacks run.
    pub fn poll(&mut self) -> usize {
        let now = self.clock.now();
        let fired = self.with_ctx(|dispatcher, _, ctx| {
            let mut fired = 0;
            while fired < MAX_TIMER_FIRES_PER_POLL && dispatcher.chain_mut().fire_next_due(now, ctx) {
                fired += 1;
            }
            fired
        });
        if fired == MAX_TIMER_FIRES_PER_POLL {
            warn!("timer budget exhausted in one poll");
        }

        for event in self.scripts.drain_events() {
            self.apply_script_event(event);
        }
        if fired > 0 {
            self.publish_input_state();
        }
        fired
    }

    /// Earliest armed handler deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.dispatcher.chain().next_deadline()
    }

    fn apply_script_event(&mut self, event: ScriptEvent) {
        match event {
            ScriptEvent::ResetView => self.with_ctx(|dispatcher, _, ctx| {
                if let Some(viewport) = dispatcher.chain_mut().viewport_mut() {
                    viewport.reset_view(ctx);
                }
            }),
            ScriptEvent::ResetWheel => self.with_ctx(|dispatcher, _, ctx| {
                if let Some(wheel) = dispatcher.chain_mut().steer_wheel_mut() {
                    wheel.reset_wheel(ctx);
                }
            }),
            ScriptEvent::RadialParam { up, down, left, right } => self.with_ctx(|dispatcher, _, ctx| {
                if let Some(wheel) = dispatcher.chain_mut().steer_wheel_mut() {
                    wheel.set_coefficient(up, down, left, right, ctx);
                }
            }),
            ScriptEvent::ShotMode(enter) => self.set_game_map_mode(enter),
            ScriptEvent::SimulateKey { name, pressed } => self.simulate_key(&name, pressed),
            other => debug!(?other, "script event not handled by session"),
        }
    }

    // ── Key map ───────────────────────────────────────────────────────────────

    /// Replaces the binding table.  Running scripts are stopped and every
    /// handler is reset first.  Auto-start scripts run now, or on the first
    /// video frame when none has arrived yet.
    ///
    /// # Errors
    ///
    /// Returns [`KeyMapError`] when the document is not a JSON object.  The
    /// current table stays in place.
    pub fn load_keymap(&mut self, json: &str, run_auto_start: bool) -> Result<usize, KeyMapError> {
        let keymap = KeyMap::from_json(json)?;

        self.scripts.reset_script_state();
        self.with_ctx(|dispatcher, _, ctx| {
            dispatcher.set_cursor_captured(false, ctx);
            dispatcher.chain_mut().reset(ctx);
            if let Some(wheel) = dispatcher.chain_mut().steer_wheel_mut() {
                wheel.reset_coefficient();
            }
        });

        let count = keymap.bindings().len();
        self.keymap = Arc::new(keymap);
        self.scripts.host().set_keymap(Arc::clone(&self.keymap));
        info!(bindings = count, "key map loaded");

        self.auto_start_pending = false;
        if run_auto_start {
            if self.first_frame_seen {
                self.run_auto_start_scripts();
            } else {
                self.auto_start_pending = true;
            }
        }
        self.publish_input_state();
        Ok(count)
    }

    // ── Capture ───────────────────────────────────────────────────────────────

    pub fn is_cursor_captured(&self) -> bool {
        self.dispatcher.is_cursor_captured()
    }

    pub fn set_cursor_captured(&mut self, captured: bool) {
        self.with_ctx(|dispatcher, _, ctx| dispatcher.set_cursor_captured(captured, ctx));
        self.publish_input_state();
    }

    pub fn toggle_cursor_captured(&mut self) -> bool {
        let captured = self.with_ctx(|dispatcher, _, ctx| dispatcher.toggle_cursor_captured(ctx));
        self.publish_input_state();
        captured
    }

    /// Enters or leaves capture mode, toggling only when it differs.
    pub fn set_game_map_mode(&mut self, enter: bool) {
        if self.is_cursor_captured() != enter {
            self.toggle_cursor_captured();
        }
    }

    // ── Scripts ───────────────────────────────────────────────────────────────

    pub fn run_auto_start_scripts(&mut self) -> usize {
        self.auto_start_pending = false;
        self.scripts.run_auto_start_scripts(&self.keymap)
    }

    /// Called when the first video frame is decoded; starts deferred
    /// auto-start scripts.
    pub fn on_first_frame(&mut self) {
        if self.first_frame_seen {
            return;
        }
        self.first_frame_seen = true;
        if self.auto_start_pending {
            self.run_auto_start_scripts();
        }
    }

    pub fn reset_script_state(&mut self) {
        self.scripts.reset_script_state();
    }

    pub fn release_all_script_touches(&self) -> usize {
        self.scripts.release_all_script_touches()
    }

    pub fn set_frame_grabber(&self, grabber: Option<Arc<dyn FrameGrabber>>) {
        self.scripts.set_frame_grabber(grabber);
    }

    pub fn set_tip_listener(&mut self, listener: Option<TipListener>) {
        self.scripts.set_tip_listener(listener);
    }

    pub fn set_overlay_listener(&mut self, listener: Option<OverlayListener>) {
        self.scripts.set_overlay_listener(listener);
    }

    /// Feeds a named key through the normal keyboard path with no modifiers.
    pub fn simulate_key(&mut self, name: &str, pressed: bool) {
        match parse_key_name(name) {
            Some((InputKey::Key(key), _)) => {
                let input = if pressed { KeyInput::press(key) } else { KeyInput::release(key) };
                let (frame, show) = (self.sizes.frame, self.sizes.show);
                self.key_event(&input, frame, show);
            }
            _ => debug!(name, "simulated key is not a keyboard key"),
        }
    }

    pub fn key_state_by_name(&self, name: &str) -> bool {
        self.scripts.host().key_state_by_name(name)
    }

    pub fn key_pos_by_name(&self, name: &str) -> Option<PointF> {
        self.scripts.host().key_pos_by_name(name)
    }

    /// Normalized pointer position: the look finger while captured, the
    /// pointer otherwise.
    pub fn mouse_pos(&self) -> PointF {
        let chain = self.dispatcher.chain();
        if self.dispatcher.is_cursor_captured() {
            chain.viewport().map(|v| v.last_pos()).unwrap_or_default()
        } else {
            chain.cursor().map(|c| c.last_pos()).unwrap_or_default()
        }
    }

    // ── Coordinates ───────────────────────────────────────────────────────────

    pub fn calc_frame_absolute_pos(&self, normalized: PointF) -> PointF {
        self.dispatcher.calc_frame_absolute_pos(normalized, self.sizes)
    }

    pub fn calc_screen_absolute_pos(&self, normalized: PointF) -> PointF {
        self.dispatcher.calc_screen_absolute_pos(normalized, self.sizes)
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Stops scripts, then lifts every touch.  Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.scripts.shutdown();
        self.scripts.release_all_script_touches();
        self.with_ctx(|dispatcher, _, ctx| dispatcher.chain_mut().reset(ctx));
        info!("session shut down");
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::DetachedCursor;
    use crate::application::handlers::test_support::{touches, PacketLog};
    use crate::application::script_bridge::test_support::{FakeRuntime, Launch};
    use crate::application::timer::ManualClock;
    use keytouch_core::{HostKey, TouchAction};
    use rand::SeedableRng;

    const FRAME: SizeF = SizeF::new(1920.0, 1080.0);
    const SHOW: SizeF = SizeF::new(960.0, 540.0);

    const MAP: &str = r#"{
        "mouseMoveMap": { "startPos": {"x": 0.6, "y": 0.4}, "speedRatioX": 2.0, "speedRatioY": 2.0 },
        "keyMapNodes": [
            { "type": "KMT_STEER_WHEEL", "centerPos": {"x": 0.2, "y": 0.7},
              "leftKey": "A", "rightKey": "D", "upKey": "W", "downKey": "S",
              "leftOffset": 0.1, "rightOffset": 0.1, "upOffset": 0.1, "downOffset": 0.1 },
            { "type": "KMT_SCRIPT", "key": "K", "pos": {"x": 0.3, "y": 0.3},
              "script": "// @autoStart\nmapi.log('boot')" }
        ]
    }"#;

    struct Fixture {
        session: SessionContext,
        log: Arc<PacketLog>,
        clock: Arc<ManualClock>,
        runtime: Arc<FakeRuntime>,
    }

    fn fixture() -> Fixture {
        let log = Arc::new(PacketLog::default());
        let clock = Arc::new(ManualClock::new());
        let runtime = Arc::new(FakeRuntime::default());
        let session = SessionContext::new(SessionServices {
            sink: log.clone(),
            sequence: Arc::new(TouchSequence::new()),
            runtime: runtime.clone(),
            cursor: Arc::new(DetachedCursor),
            clock: clock.clone(),
            humanize: HumanizeSettings::default(),
            rng: StdRng::seed_from_u64(1),
        });
        Fixture { session, log, clock, runtime }
    }

    #[test]
    fn test_auto_start_waits_for_first_frame() {
        // Arrange
        let mut f = fixture();

        // Act
        f.session.load_keymap(MAP, true).unwrap();
        let before = f.runtime.launches().len();
        f.session.on_first_frame();
        f.session.on_first_frame();

        // Assert
        assert_eq!(before, 0);
        let launches = f.runtime.launches();
        assert_eq!(launches.len(), 1);
        assert!(matches!(launches[0], Launch::AutoStart { .. }));
    }

    #[test]
    fn test_auto_start_runs_at_once_after_first_frame() {
        let mut f = fixture();
        f.session.on_first_frame();

        f.session.load_keymap(MAP, true).unwrap();

        assert_eq!(f.runtime.launches().len(), 1);
    }

    #[test]
    fn test_invalid_keymap_keeps_current_table() {
        let mut f = fixture();
        f.session.load_keymap(MAP, false).unwrap();

        assert!(f.session.load_keymap("[1, 2]", false).is_err());

        assert!(f.session.keymap().steer_wheel().is_some());
    }

    #[test]
    fn test_poll_fires_steer_wheel_timer() {
        // Arrange
        let mut f = fixture();
        f.session.load_keymap(MAP, false).unwrap();
        f.session.key_event(&KeyInput::press(HostKey::W), FRAME, SHOW);

        // Act
        f.clock.advance_ms(10);
        let fired = f.session.poll();

        // Assert
        assert!(fired > 0);
        let sent = touches(&f.log.packets());
        assert_eq!(sent[0].1, TouchAction::Down);
    }

    #[test]
    fn test_script_events_drive_handlers() {
        // Arrange
        let mut f = fixture();
        f.session.load_keymap(MAP, false).unwrap();
        f.runtime.push_event(ScriptEvent::RadialParam { up: 2.0, down: 1.0, left: 1.0, right: 1.0 });
        f.runtime.push_event(ScriptEvent::ShotMode(true));

        // Act
        f.session.poll();

        // Assert
        let wheel = f.session.chain().steer_wheel().unwrap();
        assert_eq!(wheel.coefficients(), [2.0, 1.0, 1.0, 1.0]);
        assert!(f.session.is_cursor_captured());
        assert!(f.session.script_bridge().host().is_captured());
    }

    #[test]
    fn test_simulate_key_uses_keyboard_path() {
        let mut f = fixture();

        f.session.simulate_key("B", true);
        f.session.simulate_key("LMB", true);

        assert_eq!(f.log.packets().len(), 1);
    }

    #[test]
    fn test_game_map_mode_only_toggles_on_change() {
        let mut f = fixture();

        f.session.set_game_map_mode(false);
        assert!(!f.session.is_cursor_captured());
        f.session.set_game_map_mode(true);
        f.session.set_game_map_mode(true);

        assert!(f.session.is_cursor_captured());
    }

    #[test]
    fn test_shutdown_stops_scripts_before_lifting_touches() {
        // Arrange
        let mut f = fixture();
        f.session.load_keymap(MAP, false).unwrap();
        f.session.vars().add_touch_seq(5, 77);
        let stops_before = *f.runtime.stop_all_calls.lock().unwrap();

        // Act
        f.session.shutdown();
        f.session.shutdown();

        // Assert
        assert_eq!(*f.runtime.stop_all_calls.lock().unwrap(), stops_before + 1);
        assert!(!*f.runtime.attached.lock().unwrap());
        let sent = touches(&f.log.packets());
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].0, sent[0].1), (77, TouchAction::Up));
    }

    #[test]
    fn test_mouse_pos_follows_capture_mode() {
        let mut f = fixture();
        f.session
            .mouse_event(&MouseInput::moved(PointF::new(240.0, 135.0), false), FRAME, SHOW);

        assert_eq!(f.session.mouse_pos(), PointF::new(0.25, 0.25));
        assert_eq!(f.session.script_bridge().host().mouse_pos(), PointF::new(0.25, 0.25));
    }
}
