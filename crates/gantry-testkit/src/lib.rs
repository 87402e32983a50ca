//! Deterministic test infrastructure for the gantry workspace
//!
//! Every effect interface from `gantry-core` has an in-memory handler
//! here: a scripted two-generation platform with an ordered operation
//! log and failure injection, a virtual clock that advances only when
//! slept on, a scripted prompt, and a config store that records writes.
//! Tests drive whole migrations against these without touching the
//! network, the filesystem, or real time.

#![forbid(unsafe_code)]

/// Virtual clock that advances on sleep
pub mod clock;
/// Fleet and config builders
pub mod fixtures;
/// In-memory two-generation platform
pub mod platform;
/// Scripted confirmation prompt
pub mod prompt;
/// Config store that records writes instead of touching disk
pub mod store;
/// Tracing bootstrap for tests
pub mod tracing;

pub use clock::VirtualClock;
pub use platform::{RecordedOp, TestPlatform};
pub use prompt::ScriptedPrompt;
pub use store::MemoryConfigStore;
pub use tracing::init_test_tracing;
