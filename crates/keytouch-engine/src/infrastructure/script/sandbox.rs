//! One script execution: a Lua state on its own worker thread plus the
//! watchdog guarding it.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──▶ Running ──return / graceful unwind──▶ Finished
//!                         │
//!                         └─no sleep for `soft`─▶ SoftTimeout ─still alive after `hard`─▶ Terminated
//! ```
//!
//! `stop()` raises the interrupt flag.  A Lua hook checks the flag every few
//! hundred instructions and raises an error, and `sleep` wakes up early, so a
//! well-behaved script unwinds on its own.  Termination is the last resort for
//! a script that swallows those errors (for example inside `pcall`): the
//! sandbox is detached from the session, marked not running, and its worker is
//! parked at the next hook so it never touches the session again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};
use keytouch_core::PointF;
use mlua::{Error as LuaError, HookTriggers, Lua};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::api::{self, ApiContext};
use super::watchdog::Watchdog;
use crate::application::lock;
use crate::application::script_bridge::{ScriptEvent, ScriptHost};

/// Instructions executed between two interrupt checks.
const HOOK_INSTRUCTION_STRIDE: u32 = 256;

/// Errors raised while preparing or running a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The Lua code raised an error or failed to compile.
    #[error("{0}")]
    Runtime(String),

    /// `loadModule` could not find the named module.
    #[error("module '{name}' not found at {path}")]
    ModuleNotFound { name: String, path: PathBuf },

    /// The script was asked to stop.
    #[error("script interrupted")]
    Interrupted,

    /// A script file could not be read.
    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker or watchdog thread could not be created.
    #[error("failed to spawn script thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<LuaError> for ScriptError {
    fn from(err: LuaError) -> Self {
        ScriptError::Runtime(err.to_string())
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Running,
    SoftTimeout,
    Terminated,
    Finished,
}

/// Where the code comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptSource {
    Inline(String),
    /// Resolved against the script base path when relative.
    File(PathBuf),
}

impl ScriptSource {
    fn load(&self, base_path: &Path) -> Result<(String, String), ScriptError> {
        match self {
            ScriptSource::Inline(code) => Ok(("inline".to_string(), code.clone())),
            ScriptSource::File(path) => {
                let full = if path.is_absolute() {
                    path.clone()
                } else {
                    base_path.join(path)
                };
                let code = std::fs::read_to_string(&full).map_err(|source| ScriptError::Io {
                    path: full.clone(),
                    source,
                })?;
                let name = full
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "script".to_string());
                Ok((name, code))
            }
        }
    }
}

/// What the script was started for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SandboxParams {
    pub id: i64,
    pub key_id: i64,
    pub anchor: PointF,
    pub is_press: bool,
}

/// Owner tag a key uses when it claims the joystick coefficients.
pub(crate) fn radial_owner_tag(key_id: i64) -> String {
    format!("key:{key_id}")
}

// ── Interrupt flag ────────────────────────────────────────────────────────────

/// A stop request that also wakes a sleeping worker.
#[derive(Default)]
pub(crate) struct Interrupt {
    raised: Mutex<bool>,
    wake: Condvar,
}

impl Interrupt {
    pub(crate) fn raise(&self) {
        *lock(&self.raised) = true;
        self.wake.notify_all();
    }

    pub(crate) fn is_raised(&self) -> bool {
        *lock(&self.raised)
    }

    /// Sleeps for `duration`.  Returns `false` if the flag was raised first.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let guard = lock(&self.raised);
        let result = self
            .wake
            .wait_timeout_while(guard, duration, |raised| !*raised);
        let raised = match result {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        };
        !raised
    }
}

// ── State shared with the worker ─────────────────────────────────────────────

/// Everything the worker, the watchdog and the API closures share.
pub(crate) struct SandboxShared {
    params: SandboxParams,
    state: Mutex<SandboxState>,
    running: AtomicBool,
    killed: AtomicBool,
    interrupt: Interrupt,
    session: Mutex<Option<Arc<ScriptHost>>>,
    events: Sender<ScriptEvent>,
}

impl SandboxShared {
    pub(crate) fn id(&self) -> i64 {
        self.params.id
    }

    pub(crate) fn key_id(&self) -> i64 {
        self.params.key_id
    }

    pub(crate) fn anchor(&self) -> PointF {
        self.params.anchor
    }

    pub(crate) fn is_press(&self) -> bool {
        self.params.is_press
    }

    /// The session, or `None` once it has been detached.
    pub(crate) fn host(&self) -> Option<Arc<ScriptHost>> {
        lock(&self.session).clone()
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }

    pub(crate) fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub(crate) fn request_stop(&self) {
        self.interrupt.raise();
    }

    pub(crate) fn state(&self) -> SandboxState {
        *lock(&self.state)
    }

    fn set_state(&self, state: SandboxState) {
        *lock(&self.state) = state;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    fn attach(&self, host: Option<Arc<ScriptHost>>) {
        *lock(&self.session) = host;
    }

    /// Queues an event for the event loop.  A full queue drops the event.
    pub(crate) fn emit(&self, event: ScriptEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(sandbox_id = self.params.id, ?event, "script event queue full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn terminate(&self) {
        self.killed.store(true, Ordering::SeqCst);
        self.interrupt.raise();
        self.attach(None);
        self.set_state(SandboxState::Terminated);
        self.running.store(false, Ordering::SeqCst);
    }
}

// ── Sandbox ───────────────────────────────────────────────────────────────────

pub struct ScriptSandbox {
    shared: Arc<SandboxShared>,
    source: ScriptSource,
    api: ApiContext,
    watchdog: Option<Arc<Watchdog>>,
    worker: Option<JoinHandle<()>>,
}

impl ScriptSandbox {
    pub(crate) fn new(
        params: SandboxParams,
        source: ScriptSource,
        api: ApiContext,
        events: Sender<ScriptEvent>,
        session: Option<Arc<ScriptHost>>,
    ) -> Self {
        Self {
            shared: Arc::new(SandboxShared {
                params,
                state: Mutex::new(SandboxState::Created),
                running: AtomicBool::new(false),
                killed: AtomicBool::new(false),
                interrupt: Interrupt::default(),
                session: Mutex::new(session),
                events,
            }),
            source,
            api,
            watchdog: None,
            worker: None,
        }
    }

    /// Spawns the watchdog and the worker.  Does nothing unless `Created`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Spawn`] if either thread cannot be created.
    pub fn start(&mut self) -> Result<(), ScriptError> {
        if self.shared.state() != SandboxState::Created {
            return Ok(());
        }
        let id = self.shared.id();
        let settings = self.api.settings;

        let soft_target: Weak<SandboxShared> = Arc::downgrade(&self.shared);
        let hard_target = Weak::clone(&soft_target);
        let watchdog = Arc::new(
            Watchdog::spawn(
                format!("script-watchdog-{id}"),
                Duration::from_millis(settings.soft_timeout_ms),
                Duration::from_millis(settings.hard_timeout_ms),
                move || on_soft_timeout(&soft_target),
                move || on_hard_timeout(&hard_target),
            )
            .map_err(ScriptError::Spawn)?,
        );

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(SandboxState::Running);

        let shared = Arc::clone(&self.shared);
        let worker_dog = Arc::clone(&watchdog);
        let source = self.source.clone();
        let api = self.api.clone();
        let spawned = thread::Builder::new()
            .name(format!("script-{id}"))
            .spawn(move || run_worker(&shared, &worker_dog, &source, api));

        match spawned {
            Ok(handle) => {
                watchdog.arm();
                self.watchdog = Some(watchdog);
                self.worker = Some(handle);
                debug!(sandbox_id = id, key_id = self.shared.key_id(), "script started");
                Ok(())
            }
            Err(err) => {
                watchdog.stop();
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.set_state(SandboxState::Finished);
                Err(ScriptError::Spawn(err))
            }
        }
    }

    pub fn id(&self) -> i64 {
        self.shared.id()
    }

    pub fn key_id(&self) -> i64 {
        self.shared.key_id()
    }

    pub fn state(&self) -> SandboxState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.is_interrupted()
    }

    /// Graceful stop request.  The worker unwinds at its next check.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Abandons the worker: detaches the session and marks it not running.
    pub fn terminate(&mut self) {
        if let Some(dog) = &self.watchdog {
            dog.stop();
        }
        self.shared.terminate();
        // Detached: a terminated worker is parked, never joined.
        self.worker.take();
    }

    /// Replaces the session reference the script sees.
    pub fn set_session(&self, host: Option<Arc<ScriptHost>>) {
        if !self.shared.is_killed() {
            self.shared.attach(host);
        }
    }
}

impl Drop for ScriptSandbox {
    fn drop(&mut self) {
        if self.is_running() {
            self.shared.request_stop();
        }
    }
}

// ── Watchdog callbacks ───────────────────────────────────────────────────────

fn on_soft_timeout(target: &Weak<SandboxShared>) {
    let Some(shared) = target.upgrade() else {
        return;
    };
    if !shared.is_running() {
        return;
    }
    warn!(sandbox_id = shared.id(), "script exceeded soft timeout, interrupting");
    shared.set_state(SandboxState::SoftTimeout);
    shared.emit(ScriptEvent::SoftTimeout {
        sandbox_id: shared.id(),
    });
    shared.request_stop();
}

fn on_hard_timeout(target: &Weak<SandboxShared>) {
    let Some(shared) = target.upgrade() else {
        return;
    };
    if !shared.is_running() {
        return;
    }
    error!(sandbox_id = shared.id(), "script ignored interrupt, terminating worker");
    shared.terminate();
    shared.emit(ScriptEvent::HardTimeout {
        sandbox_id: shared.id(),
    });
}

// ── Worker ────────────────────────────────────────────────────────────────────

fn run_worker(shared: &Arc<SandboxShared>, watchdog: &Arc<Watchdog>, source: &ScriptSource, api: ApiContext) {
    let outcome = execute(shared, watchdog, source, api);
    watchdog.stop();

    if shared.is_killed() {
        return;
    }

    let id = shared.id();
    match outcome {
        Ok(()) => debug!(sandbox_id = id, "script returned"),
        Err(_) if shared.is_interrupted() => info!(sandbox_id = id, "script interrupted"),
        Err(err) => {
            warn!(sandbox_id = id, error = %err, "script failed");
            shared.emit(ScriptEvent::Error {
                sandbox_id: id,
                message: err.to_string(),
            });
        }
    }

    if !shared.is_press() {
        release_radial_param(shared);
    }

    shared.set_state(SandboxState::Finished);
    shared.running.store(false, Ordering::SeqCst);
    shared.emit(ScriptEvent::Finished { sandbox_id: id });
}

fn execute(
    shared: &Arc<SandboxShared>,
    watchdog: &Arc<Watchdog>,
    source: &ScriptSource,
    api: ApiContext,
) -> Result<(), ScriptError> {
    let (chunk_name, code) = source.load(&api.base_path)?;

    let lua = Lua::new();
    install_interrupt_hook(&lua, shared);
    api::install(&lua, Arc::clone(shared), Arc::clone(watchdog), api)?;

    lua.load(&code).set_name(chunk_name.as_str()).exec()?;
    Ok(())
}

fn install_interrupt_hook(lua: &Lua, shared: &Arc<SandboxShared>) {
    let hook_shared = Arc::clone(shared);
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_STRIDE),
        move |_, _| {
            if hook_shared.is_killed() {
                // Terminated: this worker must never run script code again.
                loop {
                    thread::park();
                }
            }
            if hook_shared.is_interrupted() {
                return Err(LuaError::external(ScriptError::Interrupted));
            }
            Ok(())
        },
    );
}

/// A finished release script gives the joystick coefficients back.
fn release_radial_param(shared: &SandboxShared) {
    let Some(host) = shared.host() else {
        return;
    };
    if host.vars().release_radial_owner(&radial_owner_tag(shared.key_id())) {
        debug!(sandbox_id = shared.id(), "release script reset radial param");
        shared.emit(ScriptEvent::RadialParam {
            up: 1.0,
            down: 1.0,
            left: 1.0,
            right: 1.0,
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
