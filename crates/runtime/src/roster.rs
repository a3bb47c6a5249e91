//! Concrete combatants backed by shared, thread-safe stat blocks.
//!
//! [`PartyRoster`] is the host-side store the scheduler resolves participants
//! from. Members hand out `Arc` handles to their sheet and combat runtime, so
//! damage applied through the roster is immediately visible to the outcome
//! evaluation inside the worker.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use encounter_core::{
    CharacterSheet, CombatRuntime, Combatant, EntityId, FactionTag, InitiativeModifier,
    ModifierSet,
};

/// Declarative stat block for one combatant, usually loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatantSpec {
    pub id: u32,
    pub name: String,
    /// Side the combatant fights for; `"players"` marks the player side.
    #[serde(default)]
    pub faction: Option<String>,
    pub health: i32,
    #[serde(default)]
    pub initiative_bonus: i32,
    #[serde(default)]
    pub attack_power: i32,
}

/// Live character sheet with interior mutability.
///
/// One action point is granted per turn; attacks spend it.
pub struct MemberSheet {
    health: AtomicI32,
    max_health: i32,
    initiative_bonus: i32,
    actions_left: AtomicU32,
}

impl MemberSheet {
    fn new(health: i32, initiative_bonus: i32) -> Self {
        Self {
            health: AtomicI32::new(health),
            max_health: health,
            initiative_bonus,
            actions_left: AtomicU32::new(0),
        }
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn is_down(&self) -> bool {
        self.health.load(Ordering::SeqCst) <= 0
    }

    /// Subtracts damage and returns the remaining health.
    pub fn apply_damage(&self, amount: i32) -> i32 {
        self.health.fetch_sub(amount, Ordering::SeqCst) - amount
    }

    /// Spends one action point if any is left for this turn.
    pub fn take_action(&self) -> bool {
        self.actions_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

impl CharacterSheet for MemberSheet {
    fn health(&self) -> i32 {
        self.health.load(Ordering::SeqCst)
    }

    fn initiative_seed(&self) -> i32 {
        self.initiative_bonus
    }

    fn refresh_turn_resources(&self) {
        self.actions_left.store(1, Ordering::SeqCst);
    }
}

/// Per-encounter combat scratchpad: standing initiative plus timed modifiers.
pub struct MemberRuntime {
    base_initiative: AtomicI32,
    modifiers: Mutex<ModifierSet>,
}

impl MemberRuntime {
    fn new() -> Self {
        Self {
            base_initiative: AtomicI32::new(0),
            modifiers: Mutex::new(ModifierSet::new()),
        }
    }
}

impl CombatRuntime for MemberRuntime {
    fn base_initiative(&self) -> i32 {
        self.base_initiative.load(Ordering::SeqCst)
    }

    fn store_base_initiative(&self, value: i32) {
        self.base_initiative.store(value, Ordering::SeqCst);
    }

    fn tick_initiative_modifiers(&self) -> i32 {
        self.modifiers.lock().expect("modifier lock poisoned").tick()
    }

    fn add_initiative_modifier(&self, modifier: InitiativeModifier) {
        self.modifiers
            .lock()
            .expect("modifier lock poisoned")
            .add(modifier);
    }

    fn reset_for_encounter(&self) {
        self.base_initiative.store(0, Ordering::SeqCst);
        self.modifiers
            .lock()
            .expect("modifier lock poisoned")
            .clear();
    }
}

/// A roster member, resolvable by the scheduler through [`Combatant`].
pub struct RosterMember {
    id: EntityId,
    name: String,
    faction: Option<FactionTag>,
    sheet: Arc<MemberSheet>,
    runtime: Arc<MemberRuntime>,
    attack_power: i32,
}

impl RosterMember {
    pub fn from_spec(spec: &CombatantSpec) -> Self {
        Self {
            id: EntityId(spec.id),
            name: spec.name.clone(),
            faction: spec.faction.as_deref().map(FactionTag::new),
            sheet: Arc::new(MemberSheet::new(spec.health, spec.initiative_bonus)),
            runtime: Arc::new(MemberRuntime::new()),
            attack_power: spec.attack_power,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attack_power(&self) -> i32 {
        self.attack_power
    }

    pub fn sheet(&self) -> &Arc<MemberSheet> {
        &self.sheet
    }

    pub fn is_down(&self) -> bool {
        self.sheet.is_down()
    }
}

impl Combatant for RosterMember {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn character_sheet(&self) -> Option<Arc<dyn CharacterSheet>> {
        Some(Arc::clone(&self.sheet) as Arc<dyn CharacterSheet>)
    }

    fn combat_runtime(&self) -> Option<Arc<dyn CombatRuntime>> {
        Some(Arc::clone(&self.runtime) as Arc<dyn CombatRuntime>)
    }

    fn faction(&self) -> Option<FactionTag> {
        self.faction.clone()
    }
}

/// Shared collection of the encounter's combatants.
#[derive(Default)]
pub struct PartyRoster {
    members: Vec<Arc<RosterMember>>,
}

impl PartyRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[CombatantSpec]) -> Self {
        Self {
            members: specs
                .iter()
                .map(|spec| Arc::new(RosterMember::from_spec(spec)))
                .collect(),
        }
    }

    /// Adds a member and returns the shared handle.
    pub fn enlist(&mut self, member: RosterMember) -> Arc<RosterMember> {
        let member = Arc::new(member);
        self.members.push(Arc::clone(&member));
        member
    }

    pub fn members(&self) -> &[Arc<RosterMember>] {
        &self.members
    }

    pub fn find(&self, entity: EntityId) -> Option<&Arc<RosterMember>> {
        self.members.iter().find(|member| member.id == entity)
    }

    /// The members as scheduler participants.
    pub fn combatants(&self) -> Vec<Arc<dyn Combatant>> {
        self.members
            .iter()
            .map(|member| Arc::clone(member) as Arc<dyn Combatant>)
            .collect()
    }

    /// First conscious member fighting on a different side than `entity`.
    ///
    /// Unaligned members count as their own side, so they oppose everyone
    /// except other unaligned members.
    pub fn first_living_opponent(&self, entity: EntityId) -> Option<Arc<RosterMember>> {
        let own_faction = self.find(entity).and_then(|member| member.faction.clone());
        self.members
            .iter()
            .find(|member| {
                member.id != entity && !member.is_down() && member.faction != own_faction
            })
            .map(Arc::clone)
    }
}
