//! Embedded Lua script runtime.
//!
//! # Pieces
//!
//! - **`engine`**     – [`ScriptEngine`], the sandbox registry implementing the
//!   application's `ScriptRuntime` port.
//! - **`sandbox`**    – one script on its own worker thread.
//! - **`watchdog`**   – the soft/hard timeout escalation guarding a sandbox.
//! - **`api`**        – the `mapi` table scripts call into.
//! - **`frame_slot`** – the shared, owner-tokened frame-grab callback.
//! - **`stubs`**      – stand-ins for the image-matching and frame-grab ports.
//!
//! # A script in thirty seconds
//!
//! ```lua
//! -- @autoStart
//! mapi.toast("sprint helper ready")
//! while not mapi.isInterrupted() do
//!     if mapi.getKeyState("Shift+W") == 1 then
//!         mapi.click(0.85, 0.6)
//!     end
//!     mapi.sleep(50)
//! end
//! ```

mod api;
pub mod engine;
pub mod frame_slot;
pub mod sandbox;
pub mod stubs;
pub mod watchdog;

pub use engine::{ScriptEngine, FIRST_AUTO_START_ID};
pub use frame_slot::FrameSlot;
pub use sandbox::{SandboxParams, SandboxState, ScriptError, ScriptSandbox, ScriptSource};
pub use stubs::{NullImageMatcher, StaticFrameGrabber, StubImageMatcher};
pub use watchdog::{Watchdog, WatchdogState};
