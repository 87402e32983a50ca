//! Real effect handlers for production use
//!
//! Each handler implements one of the effect interfaces from
//! `gantry-core` against the actual environment: the system clock, the
//! local filesystem, the terminal, and process signals. Deterministic
//! counterparts for tests live in `gantry-testkit`.

#![forbid(unsafe_code)]

/// TOML config persistence
pub mod config;
/// Terminal confirmation prompts
pub mod prompt;
/// Signal-driven abort requests
pub mod signal;
/// System clock handler
pub mod time;

pub use config::TomlConfigStore;
pub use prompt::{AssumeYes, TerminalPrompt};
pub use signal::spawn_abort_listener;
pub use time::SystemClock;
