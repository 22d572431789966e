//! KeyTouch headless engine entry point.
//!
//! Loads the configuration and key map, builds one [`SessionContext`] around
//! a logging sink, and pumps its timers and script events until Ctrl-C.
//! Useful for exercising key maps and scripts without a device attached: every
//! packet the engine would send is hex-dumped at `debug`.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML from the platform config dir
//!  └─ build_session()          -- LoggingSink + ScriptEngine + SystemClock
//!  └─ load_keymap_file()       -- optional, from `[engine] keymap_path`
//!  └─ run_auto_start_scripts()
//!  └─ pump()                   -- 1 ms tick: SessionContext::poll()
//!  └─ SessionContext::shutdown()
//! ```

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keytouch_core::TouchSequence;
use keytouch_engine::application::dispatcher::DetachedCursor;
use keytouch_engine::application::output::ControlSink;
use keytouch_engine::application::timer::SystemClock;
use keytouch_engine::infrastructure::sink::LoggingSink;
use keytouch_engine::infrastructure::storage::config::{self, EngineConfig};
use keytouch_engine::{ScriptEngine, SessionContext, SessionServices};

const POLL_PERIOD: Duration = Duration::from_millis(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config unavailable ({e}), using defaults");
            EngineConfig::default()
        }
    };

    // Initialise structured logging.  `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.engine.log_level)),
        )
        .init();

    info!("KeyTouch engine starting");

    let mut session = build_session(&config, Arc::new(LoggingSink::new()));

    if let Some(path) = &config.engine.keymap_path {
        match load_keymap_file(&mut session, path) {
            Ok(count) => info!(path = %path.display(), bindings = count, "key map loaded"),
            Err(e) => warn!("{e:#}"),
        }
    }
    session.run_auto_start_scripts();

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("KeyTouch engine ready.  Press Ctrl-C to exit.");
    pump(&mut session, &running, POLL_PERIOD).await;

    session.shutdown();
    info!("KeyTouch engine stopped");
    Ok(())
}

/// Wires a session around `sink` with the production collaborators.
fn build_session(config: &EngineConfig, sink: Arc<dyn ControlSink>) -> SessionContext {
    let runtime = Arc::new(ScriptEngine::with_defaults(
        config.script,
        config.script_base_path(),
    ));
    SessionContext::new(SessionServices {
        sink,
        sequence: Arc::new(TouchSequence::new()),
        runtime,
        cursor: Arc::new(DetachedCursor),
        clock: Arc::new(SystemClock),
        humanize: config.humanize,
        rng: StdRng::from_os_rng(),
    })
}

/// Reads a key-map JSON file into the session.  Auto-start scripts are left
/// to the caller.
fn load_keymap_file(session: &mut SessionContext, path: &Path) -> anyhow::Result<usize> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key map {}", path.display()))?;
    session
        .load_keymap(&json, false)
        .with_context(|| format!("failed to parse key map {}", path.display()))
}

/// Polls the session every `period` until `running` is cleared.
async fn pump(session: &mut SessionContext, running: &AtomicBool, period: Duration) -> u64 {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks = 0;
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        session.poll();
        ticks += 1;
    }
    ticks
}

#[cfg(test)]
mod tests {
    use keytouch_engine::infrastructure::sink::RecordingSink;

    use super::*;

    fn temp_file(tag: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("keytouch_main_{tag}_{}.json", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_keymap_file_counts_bindings() {
        // Arrange
        let path = temp_file(
            "ok",
            r#"{ "keyMapNodes": [ { "type": "KMT_ANDROID_KEY", "key": "Q", "androidKey": 45 } ] }"#,
        );
        let mut session = build_session(&EngineConfig::default(), Arc::new(RecordingSink::new()));

        // Act
        let count = load_keymap_file(&mut session, &path).unwrap();

        // Assert
        assert_eq!(count, 1);
        std::fs::remove_file(&path).ok();
        session.shutdown();
    }

    #[test]
    fn test_load_keymap_file_reports_missing_path() {
        let mut session = build_session(&EngineConfig::default(), Arc::new(RecordingSink::new()));

        let err = load_keymap_file(&mut session, Path::new("/nonexistent/keytouch/map.json")).unwrap_err();

        assert!(err.to_string().contains("failed to read key map"));
        session.shutdown();
    }

    #[test]
    fn test_pump_exits_when_running_cleared() {
        // Arrange
        let mut session = build_session(&EngineConfig::default(), Arc::new(RecordingSink::new()));
        let running = AtomicBool::new(false);

        // Act
        let ticks = tokio_test::block_on(pump(&mut session, &running, Duration::from_millis(1)));

        // Assert
        assert_eq!(ticks, 0);
        session.shutdown();
    }

    #[test]
    fn test_pump_polls_until_stopped() {
        // Arrange
        let mut session = build_session(&EngineConfig::default(), Arc::new(RecordingSink::new()));
        let running = Arc::new(AtomicBool::new(true));
        let stopper = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            stopper.store(false, Ordering::Relaxed);
        });

        // Act
        let ticks = tokio_test::block_on(pump(&mut session, &running, Duration::from_millis(1)));

        // Assert
        assert!(ticks > 0);
        handle.join().unwrap();
        session.shutdown();
    }
}
