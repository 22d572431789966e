//! Infrastructure layer for the engine.
//!
//! Contains the adapters behind the application's ports: the embedded Lua
//! script runtime, concrete control-channel sinks, and file-system storage for
//! the configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keytouch_core`, but MUST NOT be imported by the `application` or core
//! layers.

pub mod script;
pub mod sink;
pub mod storage;
