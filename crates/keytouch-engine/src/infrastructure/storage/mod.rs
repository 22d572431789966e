//! Storage infrastructure: configuration file persistence.
//!
//! This module provides a thin adapter between the application and the
//! file system.  The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from the platform-appropriate directory.
//! - Writing changes back to disk.
//! - Providing sensible defaults when the file does not exist yet (first run).
//!
//! Only plain settings values leave this module; the application layer never
//! touches the file system itself.

pub mod config;
