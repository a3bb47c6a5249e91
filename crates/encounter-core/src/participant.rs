//! Participant identity and the capability contracts the scheduler relies on.
//!
//! The scheduler never owns combatant data. Each roster member is an opaque
//! [`Combatant`] handle resolved once, at registration time, into a
//! [`RuntimeEntry`] bundling the character-sheet and combat-runtime handles.
//! Unresolvable members are reported per participant so one bad handle never
//! aborts a batch.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::modifier::InitiativeModifier;

/// Unique identifier for a combatant tracked in an encounter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allegiance label partitioning the roster into opposing sides.
///
/// Tags compare case-insensitively; construction normalizes to lowercase so
/// `"Players"` and `"PLAYERS"` name the same side.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FactionTag(String);

impl FactionTag {
    /// Sentinel label for the player-aligned side.
    pub const PLAYER_SIDE: &'static str = "players";

    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_ascii_lowercase())
    }

    /// The reserved player-aligned tag.
    pub fn players() -> Self {
        Self(Self::PLAYER_SIDE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this tag names the player-aligned side.
    pub fn is_players(&self) -> bool {
        self.0 == Self::PLAYER_SIDE
    }
}

impl fmt::Display for FactionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactionTag {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

// Deserialization funnels through `new` so stored tags are normalized the
// same way as constructed ones.
impl<'de> Deserialize<'de> for FactionTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Self::new(label))
    }
}

/// Character-sheet capability read by the scheduler.
///
/// The numeric rules behind these values (damage, stat deltas, resource
/// pools) belong to the implementor; the scheduler only reads them.
pub trait CharacterSheet: Send + Sync {
    /// Current health. Zero or below counts as unconscious for outcome
    /// evaluation.
    fn health(&self) -> i32;

    /// Flat bonus folded into every initiative roll for this combatant.
    fn initiative_seed(&self) -> i32;

    /// Restores per-turn resources. Called when this combatant's turn starts
    /// and once during encounter preparation.
    fn refresh_turn_resources(&self);
}

/// Per-encounter initiative bookkeeping shared with external systems.
///
/// Other systems may mutate the underlying object between turns; the
/// scheduler re-reads values at each decision point rather than caching them.
pub trait CombatRuntime: Send + Sync {
    /// Standing initiative carried over from the previous round's roll.
    fn base_initiative(&self) -> i32;

    /// Persists a freshly rolled total as the next round's standing value.
    fn store_base_initiative(&self, value: i32);

    /// Ages active modifiers by one round and returns the net delta of those
    /// still in effect.
    fn tick_initiative_modifiers(&self) -> i32;

    fn add_initiative_modifier(&self, modifier: InitiativeModifier);

    /// Clears standing initiative and modifiers for a fresh encounter.
    fn reset_for_encounter(&self);
}

/// Opaque participant handle consumed by [`prepare`].
pub trait Combatant: Send + Sync {
    fn entity_id(&self) -> EntityId;

    /// The stats component, if the participant carries one.
    fn character_sheet(&self) -> Option<Arc<dyn CharacterSheet>>;

    /// The combat bookkeeping component, if the participant carries one.
    fn combat_runtime(&self) -> Option<Arc<dyn CombatRuntime>>;

    /// The side this participant fights for, if any.
    fn faction(&self) -> Option<FactionTag>;
}

/// Resolved collaborator handles cached per participant for the duration of
/// an encounter.
#[derive(Clone)]
pub struct RuntimeEntry {
    pub sheet: Arc<dyn CharacterSheet>,
    pub runtime: Arc<dyn CombatRuntime>,
    pub faction: Option<FactionTag>,
}

impl fmt::Debug for RuntimeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEntry")
            .field("faction", &self.faction)
            .finish_non_exhaustive()
    }
}

/// Why a participant could not be prepared for scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PrepareError {
    #[error("participant {entity} has no character sheet")]
    MissingSheet { entity: EntityId },
    #[error("participant {entity} has no combat runtime")]
    MissingRuntime { entity: EntityId },
}

impl PrepareError {
    /// Identifier of the participant that failed to resolve.
    pub fn entity(&self) -> EntityId {
        match self {
            Self::MissingSheet { entity } | Self::MissingRuntime { entity } => *entity,
        }
    }
}

/// Resolves a participant handle into its runtime bundle.
///
/// Both the character sheet and the combat runtime are required; a missing
/// component is reported so the caller can skip the participant without
/// aborting the batch. With `reset_runtime` set, the combat runtime is reset
/// for a new encounter and the sheet refreshes its per-turn resources.
pub fn prepare(
    combatant: &dyn Combatant,
    reset_runtime: bool,
) -> Result<(EntityId, RuntimeEntry), PrepareError> {
    let entity = combatant.entity_id();
    let sheet = combatant
        .character_sheet()
        .ok_or(PrepareError::MissingSheet { entity })?;
    let runtime = combatant
        .combat_runtime()
        .ok_or(PrepareError::MissingRuntime { entity })?;

    if reset_runtime {
        runtime.reset_for_encounter();
        sheet.refresh_turn_resources();
    }

    Ok((
        entity,
        RuntimeEntry {
            sheet,
            runtime,
            faction: combatant.faction(),
        },
    ))
}
