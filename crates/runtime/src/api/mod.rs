//! Public runtime API surface.
//!
//! This module gathers the types exposed to consumers of the runtime crate so
//! other layers can stay focused on orchestration or workers.

pub mod errors;
pub mod handle;
pub mod providers;

pub use errors::{ProviderSide, Result, RuntimeError};
pub use handle::EncounterHandle;
pub use providers::{ActionProvider, PassProvider, StrikeProvider};
