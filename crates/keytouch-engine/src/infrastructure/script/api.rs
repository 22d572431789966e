//! The `mapi` table every script sees.
//!
//! Functions that only make sense while a key goes down (`click`, `slide`,
//! `shotmode`, ...) are no-ops in a release script.  Every function that needs
//! the session returns a neutral value once the session has been detached, so
//! a script that outlives its session simply stops having effects.
//!
//! Touches and keys go straight to the control channel.  Anything that
//! changes event-loop state is queued as a [`ScriptEvent`].

use std::cell::RefCell;
use std::f64::consts::PI;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keytouch_core::{PointF, RectF, SizeF, TouchAction};
use mlua::{
    Error as LuaError, FromLuaMulti, IntoLuaMulti, Lua, LuaSerdeExt, Result as LuaResult, Table,
    Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::frame_slot::FrameSlot;
use super::sandbox::{radial_owner_tag, SandboxShared, ScriptError};
use super::watchdog::Watchdog;
use crate::application::handlers::random_offset;
use crate::application::script_bridge::{ImageMatcher, MatchResult, ScriptEvent, ScriptHost};
use crate::application::settings::ScriptSettings;

const MODULE_CACHE: &str = "keytouch.modules";
const SLEEP_SLICE: Duration = Duration::from_millis(100);
const DEFAULT_TOAST_MS: u32 = 2_000;
const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;
const DEFAULT_SLIDE_MS: u64 = 200;
const DEFAULT_SLIDE_STEPS: u32 = 10;
const DEFAULT_KEY_TAP_MS: u64 = 50;
/// Jitter scale used before the session has reported a window size.
const FALLBACK_TARGET_SIZE: SizeF = SizeF::new(1920.0, 1080.0);
/// Largest sideways bow of a slide, as a fraction of its length.
const MAX_SLIDE_BOW: f64 = 0.15;

/// Engine-wide collaborators handed to every sandbox.
#[derive(Clone)]
pub(crate) struct ApiContext {
    pub settings: ScriptSettings,
    pub base_path: PathBuf,
    pub matcher: Arc<dyn ImageMatcher>,
    pub frames: Arc<FrameSlot>,
}

struct Api {
    sandbox: Arc<SandboxShared>,
    watchdog: Arc<Watchdog>,
    ctx: ApiContext,
    rng: RefCell<StdRng>,
}

fn interrupted() -> LuaError {
    LuaError::external(ScriptError::Interrupted)
}

impl Api {
    fn host(&self) -> Option<Arc<ScriptHost>> {
        self.sandbox.host()
    }

    /// A script coordinate, or the anchor when either axis is negative.
    fn point(&self, x: f64, y: f64) -> PointF {
        let p = if x < 0.0 || y < 0.0 {
            self.sandbox.anchor()
        } else {
            PointF::new(x, y)
        };
        p.clamped(0.0, 1.0)
    }

    /// `pos` shifted by the humanize `random_offset` jitter.
    fn jittered(&self, host: &ScriptHost, pos: PointF) -> PointF {
        let size = match host.target_size() {
            s if s.is_valid() => s,
            _ => FALLBACK_TARGET_SIZE,
        };
        random_offset(pos, host.humanize().random_offset, size, &mut self.rng.borrow_mut())
    }

    /// Blocks this worker, feeding the watchdog and waking on interrupt.
    /// Returns at once in a release script.
    fn sleep(&self, ms: i64) -> LuaResult<()> {
        if !self.sandbox.is_press() {
            return Ok(());
        }
        self.watchdog.feed();
        let deadline = Instant::now() + Duration::from_millis(ms.max(0) as u64);
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if !self.sandbox.interrupt().sleep((deadline - now).min(SLEEP_SLICE)) {
                return Err(interrupted());
            }
            self.watchdog.feed();
        }
        if self.sandbox.is_interrupted() {
            return Err(interrupted());
        }
        Ok(())
    }

    fn emit(&self, event: ScriptEvent) {
        self.sandbox.emit(event);
    }

    // ── Touch ─────────────────────────────────────────────────────────────────

    fn click(&self, x: f64, y: f64) {
        if !self.sandbox.is_press() {
            return;
        }
        let Some(host) = self.host() else {
            return;
        };
        let pos = self.jittered(&host, self.point(x, y));
        let seq = host.out().next_seq();
        host.out().send_touch(seq, TouchAction::Down, pos);
        host.out().send_touch(seq, TouchAction::Up, pos);
    }

    fn holdpress(&self, x: f64, y: f64) {
        let Some(host) = self.host() else {
            return;
        };
        let key_id = self.sandbox.key_id();
        let pos = self.point(x, y);
        let vars = host.vars();

        if self.sandbox.is_press() {
            let limit = self.ctx.settings.touch_point_limit();
            if vars.touch_seq_count(key_id) >= limit {
                warn!(key_id, limit, "holdpress touch limit reached, press ignored");
                return;
            }
            let pos = self.jittered(&host, pos);
            let seq = host.out().next_seq();
            vars.add_touch_seq(key_id, seq);
            host.out().send_touch(seq, TouchAction::Down, pos);
        } else {
            for seq in vars.take_touch_seqs(key_id) {
                host.out().send_touch(seq, TouchAction::Up, pos);
            }
        }
    }

    /// Lifts this key's held touches at the anchor.
    fn release(&self) -> usize {
        let Some(host) = self.host() else {
            return 0;
        };
        let seqs = host.vars().take_touch_seqs(self.sandbox.key_id());
        for &seq in &seqs {
            host.out().send_touch(seq, TouchAction::Up, self.sandbox.anchor());
        }
        seqs.len()
    }

    /// Lifts every script-held touch, whichever key owns it.
    fn release_all(&self) -> usize {
        let Some(host) = self.host() else {
            return 0;
        };
        let seqs = host.vars().take_all_touch_seqs();
        for &seq in &seqs {
            host.out().send_touch(seq, TouchAction::Up, self.sandbox.anchor());
        }
        seqs.len()
    }

    fn slide(&self, from: PointF, to: PointF, duration_ms: u64, steps: u32) -> LuaResult<()> {
        if !self.sandbox.is_press() {
            return Ok(());
        }
        let Some(host) = self.host() else {
            return Ok(());
        };
        let (from, to) = (self.jittered(&host, from), self.jittered(&host, to));
        let steps = steps.max(1);
        let step_ms = (duration_ms / u64::from(steps)) as i64;
        let bow = self.slide_bow(host.humanize().slide_curve, from, to);

        let seq = host.out().next_seq();
        host.out().send_touch(seq, TouchAction::Down, from);
        let mut last = from;
        for i in 1..=steps {
            if let Err(err) = self.sleep(step_ms) {
                host.out().send_touch(seq, TouchAction::Up, last);
                return Err(err);
            }
            let t = f64::from(i) / f64::from(steps);
            last = (from + (to - from) * t + bow * (PI * t).sin()).clamped(0.0, 1.0);
            host.out().send_touch(seq, TouchAction::Move, last);
        }
        host.out().send_touch(seq, TouchAction::Up, to);
        Ok(())
    }

    /// Peak sideways offset of a slide, perpendicular to its direction.
    fn slide_bow(&self, curve: u32, from: PointF, to: PointF) -> PointF {
        let d = to - from;
        let len = d.length();
        if curve == 0 || len <= f64::EPSILON {
            return PointF::default();
        }
        let amplitude = len * MAX_SLIDE_BOW * f64::from(curve.min(100)) / 100.0;
        let sign = if self.rng.borrow_mut().random::<bool>() { 1.0 } else { -1.0 };
        PointF::new(-d.y / len, d.x / len) * (amplitude * sign)
    }

    /// Two fingers on a horizontal line through `center`, spreading from
    /// `from_dist` to `to_dist` apart.
    fn pinch(&self, center: PointF, from_dist: f64, to_dist: f64, duration_ms: u64, steps: u32) -> LuaResult<()> {
        if !self.sandbox.is_press() {
            return Ok(());
        }
        let Some(host) = self.host() else {
            return Ok(());
        };
        let center = self.jittered(&host, center);
        let out = host.out();
        let fingers = |dist: f64| {
            let half = PointF::new(dist / 2.0, 0.0);
            ((center - half).clamped(0.0, 1.0), (center + half).clamped(0.0, 1.0))
        };
        let steps = steps.max(1);
        let step_ms = (duration_ms / u64::from(steps)) as i64;
        let (a, b) = (out.next_seq(), out.next_seq());

        let (mut left, mut right) = fingers(from_dist);
        out.send_touch_batch(&[(a, TouchAction::Down, left), (b, TouchAction::Down, right)]);
        for i in 1..=steps {
            if let Err(err) = self.sleep(step_ms) {
                out.send_touch_batch(&[(a, TouchAction::Up, left), (b, TouchAction::Up, right)]);
                return Err(err);
            }
            let t = f64::from(i) / f64::from(steps);
            (left, right) = fingers(from_dist + (to_dist - from_dist) * t);
            out.send_touch_batch(&[(a, TouchAction::Move, left), (b, TouchAction::Move, right)]);
        }
        out.send_touch_batch(&[(a, TouchAction::Up, left), (b, TouchAction::Up, right)]);
        Ok(())
    }

    /// Presses `name`, holds it for `hold_ms`, then releases it.  The release
    /// is sent even when the hold is interrupted.
    fn key_tap(&self, name: String, hold_ms: u64) -> LuaResult<()> {
        if !self.sandbox.is_press() || self.host().is_none() {
            return Ok(());
        }
        self.emit(ScriptEvent::SimulateKey {
            name: name.clone(),
            pressed: true,
        });
        let held = self.sleep(hold_ms as i64);
        self.emit(ScriptEvent::SimulateKey { name, pressed: false });
        held
    }

    // ── Session state ─────────────────────────────────────────────────────────

    fn set_radial_param(&self, up: f64, down: f64, left: f64, right: f64) {
        if !self.sandbox.is_press() {
            return;
        }
        let Some(host) = self.host() else {
            return;
        };
        host.vars().set_radial_owner(radial_owner_tag(self.sandbox.key_id()));
        self.emit(ScriptEvent::RadialParam { up, down, left, right });
    }

    fn reset_radial_param(&self) {
        let Some(host) = self.host() else {
            return;
        };
        let vars = host.vars();
        let ours = vars.release_radial_owner(&radial_owner_tag(self.sandbox.key_id()));
        if ours || vars.radial_owner().is_empty() {
            self.emit(ScriptEvent::RadialParam {
                up: 1.0,
                down: 1.0,
                left: 1.0,
                right: 1.0,
            });
        }
    }

    fn find_image(&self, template: &str, region: RectF, threshold: Option<f64>) -> MatchResult {
        let Some(frame) = self.ctx.frames.grab() else {
            warn!(template, "findImage: no frame available");
            return MatchResult::not_found();
        };
        let threshold = threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD);
        self.ctx.matcher.find(&frame, template, region.normalized(), threshold)
    }

    fn load_module<'lua>(&self, lua: &'lua Lua, name: &str) -> LuaResult<Value<'lua>> {
        let cache: Table = lua.named_registry_value(MODULE_CACHE)?;
        let cached: Value = cache.get(name)?;
        if !matches!(cached, Value::Nil) {
            return Ok(cached);
        }

        let file = if name.ends_with(".lua") {
            name.to_string()
        } else {
            format!("{name}.lua")
        };
        let path = self.ctx.base_path.join(&file);
        let not_found = || {
            LuaError::external(ScriptError::ModuleNotFound {
                name: name.to_string(),
                path: path.clone(),
            })
        };
        if name.contains("..") {
            return Err(not_found());
        }
        let source = std::fs::read_to_string(&path).map_err(|_| not_found())?;

        let value: Value = lua.load(&source).set_name(file.as_str()).eval()?;
        let value = match value {
            Value::Nil => Value::Boolean(true),
            other => other,
        };
        cache.set(name, value.clone())?;
        debug!(sandbox_id = self.sandbox.id(), module = name, "module loaded");
        Ok(value)
    }
}

fn point_table<'lua>(lua: &'lua Lua, pos: PointF) -> LuaResult<Table<'lua>> {
    let table = lua.create_table()?;
    table.set("x", pos.x)?;
    table.set("y", pos.y)?;
    Ok(table)
}

fn match_table<'lua>(lua: &'lua Lua, result: MatchResult) -> LuaResult<Table<'lua>> {
    let table = lua.create_table()?;
    table.set("found", result.found)?;
    table.set("x", result.pos.x)?;
    table.set("y", result.pos.y)?;
    table.set("confidence", result.confidence)?;
    Ok(table)
}

fn register<'lua, A, R, F>(lua: &'lua Lua, mapi: &Table<'lua>, name: &str, api: &Rc<Api>, func: F) -> LuaResult<()>
where
    A: FromLuaMulti<'lua>,
    R: IntoLuaMulti<'lua>,
    F: Fn(&'lua Lua, &Api, A) -> LuaResult<R> + 'static,
{
    let api = Rc::clone(api);
    let function = lua.create_function(move |lua, args: A| func(lua, api.as_ref(), args))?;
    mapi.set(name, function)
}

/// Installs the `mapi` global into a fresh Lua state.
pub(crate) fn install(
    lua: &Lua,
    sandbox: Arc<SandboxShared>,
    watchdog: Arc<Watchdog>,
    ctx: ApiContext,
) -> LuaResult<()> {
    lua.set_named_registry_value(MODULE_CACHE, lua.create_table()?)?;

    let api = Rc::new(Api {
        sandbox,
        watchdog,
        ctx,
        rng: RefCell::new(StdRng::from_os_rng()),
    });
    let mapi = lua.create_table()?;

    // Touch.
    register(lua, &mapi, "click", &api, |_, api, (x, y): (f64, f64)| {
        api.click(x, y);
        Ok(())
    })?;
    register(lua, &mapi, "holdpress", &api, |_, api, (x, y): (f64, f64)| {
        api.holdpress(x, y);
        Ok(())
    })?;
    register(lua, &mapi, "release", &api, |_, api, ()| Ok(api.release()))?;
    register(lua, &mapi, "releaseAll", &api, |_, api, ()| Ok(api.release_all()))?;
    register(
        lua,
        &mapi,
        "slide",
        &api,
        |_, api, (sx, sy, ex, ey, ms, steps): (f64, f64, f64, f64, Option<u64>, Option<u32>)| {
            api.slide(
                api.point(sx, sy),
                api.point(ex, ey),
                ms.unwrap_or(DEFAULT_SLIDE_MS),
                steps.unwrap_or(DEFAULT_SLIDE_STEPS),
            )
        },
    )?;
    register(
        lua,
        &mapi,
        "pinch",
        &api,
        |_, api, (x, y, from, to, ms, steps): (f64, f64, f64, f64, Option<u64>, Option<u32>)| {
            api.pinch(
                api.point(x, y),
                from,
                to,
                ms.unwrap_or(DEFAULT_SLIDE_MS),
                steps.unwrap_or(DEFAULT_SLIDE_STEPS),
            )
        },
    )?;
    register(lua, &mapi, "key", &api, |_, api, (name, ms): (String, Option<u64>)| {
        api.key_tap(name, ms.unwrap_or(DEFAULT_KEY_TAP_MS))
    })?;

    // Flow control.
    register(lua, &mapi, "sleep", &api, |_, api, ms: i64| api.sleep(ms))?;
    register(lua, &mapi, "isInterrupted", &api, |_, api, ()| {
        Ok(api.sandbox.is_interrupted())
    })?;
    register(lua, &mapi, "stop", &api, |_, api, ()| {
        api.sandbox.request_stop();
        Ok(())
    })?;
    register(lua, &mapi, "isPress", &api, |_, api, ()| Ok(api.sandbox.is_press()))?;

    // Feedback.
    register(lua, &mapi, "toast", &api, |_, api, (message, ms): (String, Option<u32>)| {
        api.emit(ScriptEvent::Tip {
            message,
            duration_ms: ms.unwrap_or(DEFAULT_TOAST_MS),
            key_id: api.sandbox.key_id(),
        });
        Ok(())
    })?;
    register(lua, &mapi, "log", &api, |_, api, message: String| {
        info!(sandbox_id = api.sandbox.id(), "{message}");
        Ok(())
    })?;
    register(
        lua,
        &mapi,
        "setKeyUIPos",
        &api,
        |_, api, (name, x, y, xoff, yoff): (String, f64, f64, Option<f64>, Option<f64>)| {
            let pos = PointF::new(x + xoff.unwrap_or(0.0), y + yoff.unwrap_or(0.0));
            api.emit(ScriptEvent::KeyUiPos { name, pos });
            Ok(())
        },
    )?;

    // Session variables and modules.
    register(lua, &mapi, "setGlobal", &api, |lua, api, (key, value): (String, Value)| {
        if let Some(host) = api.host() {
            let json: serde_json::Value = lua.from_value(value)?;
            host.vars().set(key, json);
        }
        Ok(())
    })?;
    register(lua, &mapi, "getGlobal", &api, |lua, api, key: String| {
        match api.host().and_then(|host| host.vars().get(&key)) {
            Some(json) => lua.to_value(&json),
            None => Ok(Value::Nil),
        }
    })?;
    register(lua, &mapi, "loadModule", &api, |lua, api, name: String| {
        api.load_module(lua, &name)
    })?;

    // Event-loop state.
    register(lua, &mapi, "shotmode", &api, |_, api, enter: bool| {
        if api.sandbox.is_press() && api.host().is_some() {
            api.emit(ScriptEvent::ShotMode(enter));
        }
        Ok(())
    })?;
    register(
        lua,
        &mapi,
        "setRadialParam",
        &api,
        |_, api, (up, down, left, right): (f64, f64, f64, f64)| {
            api.set_radial_param(up, down, left, right);
            Ok(())
        },
    )?;
    register(lua, &mapi, "resetRadialParam", &api, |_, api, ()| {
        api.reset_radial_param();
        Ok(())
    })?;
    for name in ["resetView", "resetview"] {
        register(lua, &mapi, name, &api, |_, api, ()| {
            if api.sandbox.is_press() && api.host().is_some() {
                api.emit(ScriptEvent::ResetView);
            }
            Ok(())
        })?;
    }
    for name in ["resetWheel", "resetwheel"] {
        register(lua, &mapi, name, &api, |_, api, ()| {
            if api.host().is_some() {
                api.emit(ScriptEvent::ResetWheel);
            }
            Ok(())
        })?;
    }

    // Queries.
    register(lua, &mapi, "getmousepos", &api, |lua, api, ()| {
        let pos = api.host().map_or(PointF::CENTER, |host| host.mouse_pos());
        point_table(lua, pos)
    })?;
    register(lua, &mapi, "getkeypos", &api, |lua, api, name: String| {
        match api.host().and_then(|host| host.key_pos_by_name(&name)) {
            Some(pos) => Ok(Value::Table(point_table(lua, pos)?)),
            None => Ok(Value::Nil),
        }
    })?;
    register(lua, &mapi, "getKeyState", &api, |_, api, name: String| {
        let held = api.host().is_some_and(|host| host.key_state_by_name(&name));
        Ok(i64::from(held))
    })?;
    register(
        lua,
        &mapi,
        "findImage",
        &api,
        |lua, api, (template, threshold): (String, Option<f64>)| {
            let region = RectF::new(0.0, 0.0, 1.0, 1.0);
            match_table(lua, api.find_image(&template, region, threshold))
        },
    )?;
    register(
        lua,
        &mapi,
        "findImageByRegion",
        &api,
        |lua, api, (template, x0, y0, x1, y1, threshold): (String, f64, f64, f64, f64, Option<f64>)| {
            let region = RectF::new(x0, y0, x1, y1);
            match_table(lua, api.find_image(&template, region, threshold))
        },
    )?;

    lua.globals().set("mapi", mapi)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
