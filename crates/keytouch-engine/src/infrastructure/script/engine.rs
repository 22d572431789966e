//! ScriptEngine: the Lua implementation of the [`ScriptRuntime`] port.
//!
//! Every run allocates a fresh [`ScriptSandbox`], so pressing a script key
//! twice quickly gives two concurrent sandboxes.  Key-triggered sandboxes get
//! increasing positive ids; auto-start sandboxes count down from
//! [`FIRST_AUTO_START_ID`] so the two ranges never meet.
//!
//! Workers report back through one bounded channel.  The event loop drains it
//! with [`ScriptRuntime::try_next_event`], which also reaps sandboxes whose
//! `Finished` or `HardTimeout` event it has just seen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use keytouch_core::PointF;
use tracing::{debug, error, info, warn};

use super::api::ApiContext;
use super::frame_slot::FrameSlot;
use super::sandbox::{SandboxParams, SandboxState, ScriptSandbox, ScriptSource};
use super::stubs::NullImageMatcher;
use crate::application::lock;
use crate::application::script_bridge::{FrameGrabber, ImageMatcher, ScriptEvent, ScriptHost, ScriptRuntime};
use crate::application::settings::ScriptSettings;

/// Id of the first auto-start sandbox.  Later ones count down from here.
pub const FIRST_AUTO_START_ID: i64 = -1000;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(30);
const FRAME_UNREGISTER_WAIT: Duration = Duration::from_millis(500);

static NEXT_ENGINE_TOKEN: AtomicU64 = AtomicU64::new(1);

pub struct ScriptEngine {
    api: ApiContext,
    token: u64,
    sandboxes: Mutex<HashMap<i64, ScriptSandbox>>,
    next_id: AtomicI64,
    next_auto_id: AtomicI64,
    session: Mutex<Option<Arc<ScriptHost>>>,
    events_tx: Sender<ScriptEvent>,
    events_rx: Receiver<ScriptEvent>,
}

impl ScriptEngine {
    pub fn new(
        settings: ScriptSettings,
        base_path: PathBuf,
        matcher: Arc<dyn ImageMatcher>,
        frames: Arc<FrameSlot>,
    ) -> Self {
        let (events_tx, events_rx) = bounded(settings.channel_capacity.max(1));
        Self {
            api: ApiContext {
                settings,
                base_path,
                matcher,
                frames,
            },
            token: NEXT_ENGINE_TOKEN.fetch_add(1, Ordering::Relaxed),
            sandboxes: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            next_auto_id: AtomicI64::new(FIRST_AUTO_START_ID),
            session: Mutex::new(None),
            events_tx,
            events_rx,
        }
    }

    /// An engine without image matching and with its own frame slot.
    pub fn with_defaults(settings: ScriptSettings, base_path: PathBuf) -> Self {
        Self::new(
            settings,
            base_path,
            Arc::new(NullImageMatcher),
            Arc::new(FrameSlot::new()),
        )
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.api.settings
    }

    pub fn base_path(&self) -> &Path {
        &self.api.base_path
    }

    /// Token this engine registers its frame grabber under.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn sandbox_state(&self, id: i64) -> Option<SandboxState> {
        lock(&self.sandboxes).get(&id).map(ScriptSandbox::state)
    }

    pub fn is_running(&self, id: i64) -> bool {
        lock(&self.sandboxes)
            .get(&id)
            .is_some_and(ScriptSandbox::is_running)
    }

    /// Asks one sandbox to stop.  Returns `false` for an unknown id.
    pub fn stop(&self, id: i64) -> bool {
        match lock(&self.sandboxes).get(&id) {
            Some(sandbox) => {
                sandbox.stop();
                true
            }
            None => false,
        }
    }

    fn launch(&self, source: ScriptSource, params: SandboxParams) -> i64 {
        let session = lock(&self.session).clone();
        let mut sandbox = ScriptSandbox::new(params, source, self.api.clone(), self.events_tx.clone(), session);

        if let Err(err) = sandbox.start() {
            error!(sandbox_id = params.id, error = %err, "failed to start script");
            let _ = self.events_tx.try_send(ScriptEvent::Error {
                sandbox_id: params.id,
                message: err.to_string(),
            });
            return params.id;
        }

        let mut sandboxes = lock(&self.sandboxes);
        sandboxes.retain(|_, s| s.is_running());
        sandboxes.insert(params.id, sandbox);
        params.id
    }

    fn set_all_sessions(&self, host: Option<Arc<ScriptHost>>) {
        *lock(&self.session) = host.clone();
        for sandbox in lock(&self.sandboxes).values() {
            sandbox.set_session(host.clone());
        }
    }
}

impl ScriptRuntime for ScriptEngine {
    fn attach_session(&self, host: Arc<ScriptHost>) {
        self.set_all_sessions(Some(host));
        debug!(engine = self.token, "script session attached");
    }

    fn detach_session(&self) {
        self.set_all_sessions(None);
        debug!(engine = self.token, "script session detached");
    }

    fn run_inline(&self, script: &str, key_id: i64, anchor: PointF, is_press: bool) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.launch(
            ScriptSource::Inline(script.to_string()),
            SandboxParams {
                id,
                key_id,
                anchor,
                is_press,
            },
        )
    }

    fn run_file(&self, path: &Path, key_id: i64, anchor: PointF, is_press: bool) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.launch(
            ScriptSource::File(path.to_path_buf()),
            SandboxParams {
                id,
                key_id,
                anchor,
                is_press,
            },
        )
    }

    fn run_auto_start(&self, script: &str) -> i64 {
        let id = self.next_auto_id.fetch_sub(1, Ordering::SeqCst);
        self.launch(
            ScriptSource::Inline(script.to_string()),
            SandboxParams {
                id,
                key_id: id,
                anchor: PointF::CENTER,
                is_press: true,
            },
        )
    }

    fn stop_all(&self) {
        let mut stopping: Vec<ScriptSandbox> = lock(&self.sandboxes).drain().map(|(_, s)| s).collect();
        if stopping.is_empty() {
            return;
        }
        for sandbox in &stopping {
            sandbox.stop();
        }

        let deadline = Instant::now() + Duration::from_millis(self.api.settings.stop_all_timeout_ms);
        while stopping.iter().any(ScriptSandbox::is_running) && Instant::now() < deadline {
            thread::sleep(STOP_POLL_INTERVAL);
        }

        for sandbox in stopping.iter_mut().filter(|s| s.is_running()) {
            error!(sandbox_id = sandbox.id(), "script did not stop in time, terminating");
            sandbox.terminate();
        }
        info!(count = stopping.len(), "all scripts stopped");
    }

    fn running_count(&self) -> usize {
        lock(&self.sandboxes).values().filter(|s| s.is_running()).count()
    }

    fn try_next_event(&self) -> Option<ScriptEvent> {
        let event = self.events_rx.try_recv().ok()?;
        if let ScriptEvent::Finished { sandbox_id } | ScriptEvent::HardTimeout { sandbox_id } = event {
            lock(&self.sandboxes).remove(&sandbox_id);
        }
        Some(event)
    }

    fn set_frame_grabber(&self, grabber: Option<Arc<dyn FrameGrabber>>) {
        match grabber {
            Some(grabber) => self.api.frames.register(self.token, grabber),
            None => {
                if !self.api.frames.unregister(self.token, FRAME_UNREGISTER_WAIT) {
                    debug!(engine = self.token, "frame slot not held by this engine");
                }
            }
        }
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        if self.api.frames.owner() == self.token
            && !self.api.frames.unregister(self.token, FRAME_UNREGISTER_WAIT)
        {
            warn!(engine = self.token, "frame grabber still busy at engine drop");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
