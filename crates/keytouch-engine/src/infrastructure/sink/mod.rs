//! Concrete control-channel sinks.
//!
//! The real transport belongs to the host application.  This module ships
//! the two sinks the engine itself needs:
//!
//! - **`logging`**   – dumps every packet at `debug`; used by the headless
//!   runner.
//! - **`recording`** – keeps every packet in memory for assertions.

pub mod logging;
pub mod recording;

pub use logging::LoggingSink;
pub use recording::RecordingSink;
