//! Lifecycle events and the injected publish channel.
//!
//! The scheduler announces every externally relevant transition through
//! [`EventChannel`]. Publishing is one-way and best-effort; the one inbound
//! notification (action resolved) reaches the scheduler as a direct call, so
//! this module only models the outbound surface.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::participant::{EntityId, FactionTag};
use crate::state::TurnEntry;

/// Opaque payload attached to an action resolution, passed through to
/// observers without interpretation.
pub type ActionResults = BTreeMap<String, serde_json::Value>;

/// How an encounter ended, from the player-aligned side's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EncounterOutcome {
    /// The non-player side has no conscious member left.
    Victory,
    /// The player-aligned side has no conscious member left.
    Defeat,
}

/// Payload shared by the turn-started and turn-ready announcements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnCue {
    /// Entity whose turn it is.
    pub entity_id: EntityId,
    pub round: u32,
    /// The composite initiative the entity acted on.
    pub initiative: i32,
    /// Snapshot of the turns still pending after this one.
    pub queue: Vec<TurnEntry>,
}

/// Closing statistics attached to the encounter-ended announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterSummary {
    /// Rounds played, including the one in progress.
    pub round: u32,
    /// Total turns taken.
    pub turns: u64,
    pub participants: Vec<EntityId>,
    /// Results of the action that decided the encounter, when one did.
    pub last_action: Option<ActionResults>,
    /// Turns that were still queued when the outcome was reached.
    pub remaining_queue: Vec<TurnEntry>,
}

/// Full encounter-ended payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterReport {
    pub outcome: EncounterOutcome,
    /// Tag of the surviving side, when determinable.
    pub winning_team: Option<FactionTag>,
    pub summary: EncounterSummary,
}

/// Events published on the encounter channel, in the order the scheduler
/// emits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncounterEvent {
    /// A new encounter was initialized with a resolvable roster.
    EncounterStarted { participants: Vec<EntityId> },

    /// A queue rebuild began for the given round.
    RoundStarted { round: u32 },

    /// The round's queue was rolled and sorted; carries a deep snapshot.
    QueueRebuilt { round: u32, queue: Vec<TurnEntry> },

    /// Lightweight turn tick, counter only.
    TurnPassed { turn_number: u64 },

    /// A turn was popped and its holder announced.
    TurnStarted(Box<TurnCue>),

    /// Cue for external systems to let the announced entity act.
    TurnReady(Box<TurnCue>),

    /// The in-flight turn's action resolved.
    TurnCompleted {
        entity_id: EntityId,
        round: u32,
        results: Option<ActionResults>,
    },

    /// A timed initiative adjustment was recorded.
    InitiativeModified {
        entity_id: EntityId,
        delta: i32,
        source: String,
        /// Rebuilds the modifier still applies to; `None` when infinite.
        remaining_rounds: Option<u32>,
    },

    /// The encounter reached an outcome.
    EncounterEnded(Box<EncounterReport>),
}

/// Outbound half of the external pub/sub collaborator.
///
/// Injected at scheduler construction so tests observe the exact publish
/// sequence without a live bus. Implementations must not block.
pub trait EventChannel: Send + Sync {
    fn publish(&self, event: EncounterEvent);
}

impl<C: EventChannel + ?Sized> EventChannel for std::sync::Arc<C> {
    fn publish(&self, event: EncounterEvent) {
        (**self).publish(event);
    }
}
