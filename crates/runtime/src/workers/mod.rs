//! Worker tasks that back the runtime orchestration.
//!
//! The encounter worker serializes all scheduler access behind a command
//! channel so handles can be cloned freely across tasks.

mod encounter;

pub use encounter::{Command, EncounterWorker};
