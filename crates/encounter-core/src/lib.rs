//! Turn-order scheduling for round-based combat encounters.
//!
//! `encounter-core` defines the canonical encounter rules: seeded initiative
//! rolls, per-round turn queues, timed initiative modifiers, and the
//! victory/defeat evaluation that closes an encounter. All state mutation
//! flows through [`scheduler::Scheduler`], which reports every transition on
//! an [`events::EventChannel`]; hosting crates supply the participants and
//! the channel.
pub mod events;
pub mod modifier;
pub mod participant;
pub mod rng;
pub mod scheduler;
pub mod state;
pub use events::{
    ActionResults, EncounterEvent, EncounterOutcome, EncounterReport, EncounterSummary,
    EventChannel, TurnCue,
};
pub use modifier::{InitiativeModifier, ModifierDuration, ModifierSet};
pub use participant::{
    CharacterSheet, CombatRuntime, Combatant, EntityId, FactionTag, PrepareError, RuntimeEntry,
    prepare,
};
pub use rng::InitiativeDice;
pub use scheduler::Scheduler;
pub use state::{
    EncounterPhase, EncounterSnapshot, EncounterState, InitiativeBreakdown, TurnEntry,
};
