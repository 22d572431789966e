//! Integration tests for the Lua script runtime.
//!
//! Scripts run on real worker threads here, so every assertion waits on a
//! bounded deadline instead of a fixed sleep.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use keytouch_core::protocol::Packet;
use keytouch_core::{to_wire, HostKey, InputKey, KeyAction, KeyEvent, PointF, SizeF, TouchAction, TouchSequence};
use keytouch_engine::application::dispatcher::DetachedCursor;
use keytouch_engine::application::input::KeyInput;
use keytouch_engine::application::script_bridge::{ScriptEvent, ScriptRuntime};
use keytouch_engine::application::settings::{HumanizeSettings, ScriptSettings};
use keytouch_engine::application::timer::SystemClock;
use keytouch_engine::infrastructure::script::{SandboxState, Watchdog, WatchdogState};
use keytouch_engine::infrastructure::sink::RecordingSink;
use keytouch_engine::{ScriptEngine, SessionContext, SessionServices};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

const FRAME: SizeF = SizeF::new(1920.0, 1080.0);
const SHOW: SizeF = SizeF::new(960.0, 540.0);
const DEADLINE: Duration = Duration::from_secs(3);

const IDLE_LOOP: &str = "while not mapi.isInterrupted() do mapi.sleep(10) end";

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Polls `check` every few milliseconds until it holds or `timeout` passes.
fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn engine(settings: ScriptSettings) -> Arc<ScriptEngine> {
    Arc::new(ScriptEngine::with_defaults(settings, PathBuf::from(".")))
}

fn session_with(map: &str) -> (SessionContext, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let mut session = SessionContext::new(SessionServices {
        sink: sink.clone(),
        sequence: Arc::new(TouchSequence::new()),
        runtime: engine(ScriptSettings::default()),
        cursor: Arc::new(DetachedCursor),
        clock: Arc::new(SystemClock),
        humanize: HumanizeSettings::default(),
        rng: StdRng::seed_from_u64(3),
    });
    session.load_keymap(map, false).expect("map must parse");
    (session, sink)
}

fn script_map(script: &str) -> String {
    json!({
        "keyMapNodes": [
            { "type": "KMT_SCRIPT", "key": "K", "pos": {"x": 0.3, "y": 0.3}, "script": script }
        ]
    })
    .to_string()
}

// ── Scripts driving the session ───────────────────────────────────────────────

#[test]
fn test_bound_script_click_reaches_the_wire() {
    // Arrange
    let (mut session, sink) = session_with(&script_map("mapi.click(0.25, 0.75)"));

    // Act
    session.key_event(&KeyInput::press(HostKey::K), FRAME, SHOW);
    let clicked = wait_until(DEADLINE, || sink.touches().len() >= 2);

    // Assert
    assert!(clicked, "script click never arrived");
    let sent = sink.touches();
    assert_eq!(sent[0].1, TouchAction::Down);
    assert_eq!(sent[1].1, TouchAction::Up);
    assert_eq!(sent[0].0, sent[1].0);
    assert_eq!((sent[0].2, sent[0].3), (to_wire(0.25), to_wire(0.75)));
    session.shutdown();
}

#[test]
fn test_holdpress_is_lifted_by_the_release_phase() {
    // Arrange
    let (mut session, sink) = session_with(&script_map("mapi.holdpress(0.5, 0.5)"));
    session.key_event(&KeyInput::press(HostKey::K), FRAME, SHOW);
    assert!(wait_until(DEADLINE, || sink.touches().len() == 1));

    // Act
    session.key_event(&KeyInput::release(HostKey::K), FRAME, SHOW);
    let lifted = wait_until(DEADLINE, || sink.touches().len() == 2);

    // Assert
    assert!(lifted, "release phase never lifted the touch");
    let sent = sink.touches();
    assert_eq!(sent[0].1, TouchAction::Down);
    assert_eq!(sent[1].1, TouchAction::Up);
    assert_eq!(sent[0].0, sent[1].0);
    assert_eq!(session.vars().touch_seq_count(InputKey::Key(HostKey::K).id()), 0);
    session.shutdown();
}

#[test]
fn test_script_key_taps_down_then_up_on_the_wire() {
    // Arrange
    let (mut session, sink) = session_with(&script_map("mapi.key('Q')"));
    let key_actions = |packets: &[Packet]| -> Vec<KeyAction> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::Key(KeyEvent { action, .. }) => Some(*action),
                _ => None,
            })
            .collect()
    };

    // Act
    session.key_event(&KeyInput::press(HostKey::K), FRAME, SHOW);
    let tapped = wait_until(DEADLINE, || {
        session.poll();
        key_actions(&sink.packets()).len() >= 2
    });

    // Assert
    assert!(tapped, "simulated key never completed its tap");
    assert_eq!(key_actions(&sink.packets()), vec![KeyAction::Down, KeyAction::Up]);
    session.shutdown();
}

#[test]
fn test_auto_start_script_writes_session_global() {
    // Arrange
    let (mut session, _sink) = session_with(&script_map("-- @autoStart\nmapi.setGlobal('ready', {hp = 42})"));

    // Act
    let launched = session.run_auto_start_scripts();
    let written = wait_until(DEADLINE, || session.vars().has("ready"));

    // Assert
    assert_eq!(launched, 1);
    assert!(written);
    assert_eq!(session.vars().get("ready"), Some(json!({"hp": 42})));
    session.shutdown();
}

#[test]
fn test_shutdown_stops_long_running_script() {
    // Arrange
    let (mut session, _sink) = session_with(&script_map(IDLE_LOOP));
    session.key_event(&KeyInput::press(HostKey::K), FRAME, SHOW);
    assert!(wait_until(DEADLINE, || session.script_bridge().running_count() == 1));

    // Act
    session.shutdown();

    // Assert
    assert_eq!(session.script_bridge().running_count(), 0);
}

// ── Sandbox isolation ─────────────────────────────────────────────────────────

#[test]
fn test_stopping_one_sandbox_leaves_the_other_running() {
    // Arrange
    let engine = engine(ScriptSettings::default());
    let first = engine.run_inline(IDLE_LOOP, 1, PointF::CENTER, true);
    let second = engine.run_inline(IDLE_LOOP, 2, PointF::CENTER, true);
    assert_ne!(first, second);

    // Act
    assert!(engine.stop(first));
    let first_done = wait_until(DEADLINE, || engine.sandbox_state(first) == Some(SandboxState::Finished));

    // Assert
    assert!(first_done);
    assert!(engine.is_running(second));
    assert_eq!(engine.sandbox_state(second), Some(SandboxState::Running));

    engine.stop_all();
    assert_eq!(engine.running_count(), 0);
}

#[test]
fn test_script_error_is_reported_then_finishes() {
    // Arrange
    let engine = engine(ScriptSettings::default());

    // Act
    let id = engine.run_inline("error('boom')", 1, PointF::CENTER, true);
    let mut events = Vec::new();
    let finished = wait_until(DEADLINE, || {
        while let Some(event) = engine.try_next_event() {
            events.push(event);
        }
        events.contains(&ScriptEvent::Finished { sandbox_id: id })
    });

    // Assert
    assert!(finished);
    assert!(events
        .iter()
        .any(|e| matches!(e, ScriptEvent::Error { sandbox_id, message } if *sandbox_id == id && message.contains("boom"))));
}

// ── Timeout escalation ────────────────────────────────────────────────────────

#[test]
fn test_watchdog_escalates_soft_then_hard() {
    // Arrange
    let fired = Arc::new(Mutex::new(Vec::new()));
    let (soft_log, hard_log) = (Arc::clone(&fired), Arc::clone(&fired));
    let watchdog = Watchdog::spawn(
        "watchdog-test".to_string(),
        Duration::from_millis(30),
        Duration::from_millis(30),
        move || soft_log.lock().unwrap().push("soft"),
        move || hard_log.lock().unwrap().push("hard"),
    )
    .unwrap();

    // Act
    let started = Instant::now();
    watchdog.arm();
    let escalated = wait_until(DEADLINE, || fired.lock().unwrap().len() == 2);

    // Assert
    assert!(escalated);
    assert_eq!(watchdog.state(), WatchdogState::HardExpired);
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(*fired.lock().unwrap(), vec!["soft", "hard"]);
}

#[test]
fn test_feeding_watchdog_holds_off_expiry() {
    let watchdog = Watchdog::spawn(
        "watchdog-fed".to_string(),
        Duration::from_millis(60),
        Duration::from_millis(60),
        || {},
        || {},
    )
    .unwrap();

    watchdog.arm();
    for _ in 0..6 {
        thread::sleep(Duration::from_millis(20));
        watchdog.feed();
    }

    assert_eq!(watchdog.state(), WatchdogState::Armed);
    watchdog.stop();
    assert_eq!(watchdog.state(), WatchdogState::Stopped);
}

#[test]
fn test_runaway_script_is_terminated_after_hard_timeout() {
    // Arrange
    let engine = engine(ScriptSettings {
        soft_timeout_ms: 50,
        hard_timeout_ms: 50,
        ..ScriptSettings::default()
    });
    let spin = "while true do pcall(function() while true do end end) end";

    // Act
    let id = engine.run_inline(spin, 1, PointF::CENTER, true);
    let mut events = Vec::new();
    let killed = wait_until(DEADLINE, || {
        while let Some(event) = engine.try_next_event() {
            events.push(event);
        }
        events.contains(&ScriptEvent::HardTimeout { sandbox_id: id })
    });

    // Assert
    assert!(killed);
    let soft = events.iter().position(|e| *e == ScriptEvent::SoftTimeout { sandbox_id: id });
    let hard = events.iter().position(|e| *e == ScriptEvent::HardTimeout { sandbox_id: id });
    assert!(soft.unwrap() < hard.unwrap());
    assert!(!engine.is_running(id));
    assert_eq!(engine.running_count(), 0);
}
