//! Pure effect interfaces
//!
//! Every interaction with the outside world goes through one of these
//! traits. Real handlers live in `gantry-effects`; deterministic in-memory
//! handlers live in `gantry-testkit`. Nothing here performs I/O.

/// Local config persistence
pub mod config;
/// Legacy scheduler and application control plane
pub mod control;
/// Cutover deployment
pub mod deploy;
/// Operator confirmation prompts
pub mod prompt;
/// Per-resource API of the resource platform
pub mod resource;
/// Clock access for elapsed-time math and sleeping
pub mod time;

pub use config::ConfigStoreEffects;
pub use control::ControlPlaneEffects;
pub use deploy::DeployEffects;
pub use prompt::PromptEffects;
pub use resource::ResourceEffects;
pub use time::ClockEffects;
