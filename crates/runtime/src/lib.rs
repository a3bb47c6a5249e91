//! Runtime orchestration for encounter scheduling.
//!
//! This crate wires the action provider abstraction, the shared roster, and
//! the worker task into a cohesive runtime API. Consumers embed [`Runtime`]
//! to drive turns, subscribe to events, and interact with the encounter
//! through [`EncounterHandle`].
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] bridges scheduler events onto a broadcast bus
//! - [`roster`] provides concrete combatants backed by shared stat blocks
//! - `workers` keeps the background task internal to the crate
pub mod api;
pub mod events;
pub mod roster;
pub mod runtime;

mod workers;

pub use api::{
    ActionProvider, EncounterHandle, PassProvider, ProviderSide, Result, RuntimeError,
    StrikeProvider,
};
pub use events::EventBus;
pub use roster::{CombatantSpec, MemberRuntime, MemberSheet, PartyRoster, RosterMember};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
