//! Mutable encounter bookkeeping.
//!
//! [`EncounterState`] is exclusively owned and mutated by the scheduler; the
//! participant runtime bundles it caches are shared handles into external
//! stores. Observers read through [`EncounterSnapshot`], never the live state.
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::participant::{EntityId, RuntimeEntry};

/// Externally observable scheduler states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EncounterPhase {
    /// No turn in flight. Also the landing state after a failed start.
    #[default]
    Idle,
    /// A turn was announced and the scheduler is suspended until the matching
    /// action resolution arrives.
    AwaitingAction,
    /// Outcome reached. Terminal until the next encounter is initialized.
    Ended,
}

/// Per-round components behind one initiative total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeBreakdown {
    /// Uniform d100 roll from the scheduler's seeded generator.
    pub roll: i32,
    /// Flat bonus from the character sheet.
    pub seed: i32,
    /// Standing initiative carried in from the previous round.
    pub base_initiative: i32,
    /// Net contribution of active modifiers after this round's tick.
    pub modifier_delta: i32,
}

impl InitiativeBreakdown {
    /// The composite total persisted back as next round's standing value.
    pub fn total(&self) -> i32 {
        self.roll + self.seed + self.base_initiative + self.modifier_delta
    }
}

/// One pending turn in the round's queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub entity_id: EntityId,
    pub initiative: i32,
    pub breakdown: InitiativeBreakdown,
}

/// Round and turn bookkeeping for one encounter.
///
/// Created once per encounter and [`reset`](Self::reset) between encounters;
/// ownership and disposal stay with the caller.
#[derive(Debug, Default)]
pub struct EncounterState {
    pub phase: EncounterPhase,
    /// Increments once per queue rebuild. Zero means pre-roll.
    pub round_counter: u32,
    /// Increments once per popped turn, monotonic for the encounter.
    pub turn_number: u64,
    /// The participant currently acting, while a turn is in flight.
    pub active_entity: Option<EntityId>,
    /// Roster in registration order, each identifier at most once.
    pub participants: Vec<EntityId>,
    /// Pending turns, taken from the front.
    pub turn_queue: VecDeque<TurnEntry>,
    /// Resolved collaborator handles keyed by participant.
    pub runtime: HashMap<EntityId, RuntimeEntry>,
}

impl EncounterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all bookkeeping back to the pre-roll state.
    pub fn reset(&mut self) {
        self.phase = EncounterPhase::Idle;
        self.round_counter = 0;
        self.turn_number = 0;
        self.active_entity = None;
        self.participants.clear();
        self.turn_queue.clear();
        self.runtime.clear();
    }

    /// Registers a participant, silently ignoring roster duplicates.
    ///
    /// A bundle refreshes the runtime cache; `None` invalidates any cached
    /// entry so a stale bundle cannot outlive re-registration. Returns whether
    /// the roster gained a new member.
    pub fn register(&mut self, entity: EntityId, bundle: Option<RuntimeEntry>) -> bool {
        match bundle {
            Some(entry) => {
                self.runtime.insert(entity, entry);
            }
            None => {
                self.runtime.remove(&entity);
            }
        }

        if self.participants.contains(&entity) {
            return false;
        }
        self.participants.push(entity);
        true
    }

    pub fn is_registered(&self, entity: EntityId) -> bool {
        self.participants.contains(&entity)
    }

    pub fn runtime_entry(&self, entity: EntityId) -> Option<&RuntimeEntry> {
        self.runtime.get(&entity)
    }

    /// Position of a participant in registration order, used as the
    /// initiative tie-break.
    pub fn roster_index(&self, entity: EntityId) -> Option<usize> {
        self.participants.iter().position(|&id| id == entity)
    }

    /// Deep copy of the pending queue, front first.
    pub fn snapshot_queue(&self) -> Vec<TurnEntry> {
        self.turn_queue.iter().cloned().collect()
    }

    /// Read-only view for observers outside the scheduler.
    pub fn snapshot(&self) -> EncounterSnapshot {
        EncounterSnapshot {
            phase: self.phase,
            round: self.round_counter,
            turn: self.turn_number,
            active_entity: self.active_entity,
            participants: self.participants.clone(),
            queue: self.snapshot_queue(),
        }
    }
}

/// Detached, serializable view of an encounter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EncounterSnapshot {
    pub phase: EncounterPhase,
    pub round: u32,
    pub turn: u64,
    pub active_entity: Option<EntityId>,
    pub participants: Vec<EntityId>,
    pub queue: Vec<TurnEntry>,
}
