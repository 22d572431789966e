//! Application layer: the real-time input engine.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `keytouch-core`) and the infrastructure (script runtime,
//! config files, transports).
//!
//! Code in this layer:
//!
//! - **Orchestrates** the core types to fulfil a user goal (e.g., "turn W+D
//!   into a diagonal joystick drag").
//! - **Depends on abstractions** (traits such as [`output::ControlSink`],
//!   [`script_bridge::ScriptRuntime`], [`dispatcher::CursorController`] and
//!   [`timer::Clock`]) rather than concrete implementations, so the
//!   infrastructure can be swapped without changing this code.
//! - **Contains no OS calls, no network I/O and no file system access**.
//!
//! # Sub-modules
//!
//! - **`handlers`**        – The five gesture state machines.
//! - **`chain`**           – Priority-ordered dispatch over the handlers.
//! - **`dispatcher`**      – Routes host input and owns cursor-capture mode.
//! - **`session_context`** – The per-device aggregate and its facade.
//! - **`session_vars`**    – State shared with script workers.
//! - **`script_bridge`**   – The port to the script runtime.
//! - **`input`**, **`output`**, **`timer`**, **`settings`** – value types,
//!   the control-channel port, software timers and tuning knobs.

pub mod chain;
pub mod dispatcher;
pub mod handlers;
pub mod input;
pub mod output;
pub mod script_bridge;
pub mod session_context;
pub mod session_vars;
pub mod settings;
pub mod timer;

use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("recovered poisoned lock");
            poisoned.into_inner()
        }
    }
}
