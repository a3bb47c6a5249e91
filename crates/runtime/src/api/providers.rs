//! Asynchronous abstraction for sourcing turn actions.
//!
//! Runtime users plug in [`ActionProvider`] implementations so encounters can
//! run with human input, scripted fixtures, or AI policies. The scheduler
//! never interprets what an action did; providers resolve the action against
//! the roster themselves and report the results as an opaque map.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use encounter_core::{ActionResults, Combatant, EncounterSnapshot, EntityId};

use super::errors::Result;
use crate::roster::PartyRoster;

/// Trait for deciding and resolving the active entity's action.
///
/// Different implementations can handle:
/// - Player input (from UI/CLI)
/// - Scripted or AI-driven opponents
/// - Testing fixtures
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Resolve an action for the given entity.
    ///
    /// `snapshot` is a read-only view of the encounter at the moment the turn
    /// was handed out. The returned results are passed through to event
    /// subscribers unchanged.
    async fn provide_action(
        &self,
        entity: EntityId,
        snapshot: &EncounterSnapshot,
    ) -> Result<ActionResults>;
}

fn pass_results() -> ActionResults {
    let mut results = ActionResults::new();
    results.insert("action".to_string(), json!("pass"));
    results
}

/// Always passes the turn. Useful for testing or as a fallback.
pub struct PassProvider;

#[async_trait]
impl ActionProvider for PassProvider {
    async fn provide_action(
        &self,
        _entity: EntityId,
        _snapshot: &EncounterSnapshot,
    ) -> Result<ActionResults> {
        Ok(pass_results())
    }
}

/// Attacks the first conscious opponent on a shared roster.
///
/// Damage lands directly on the target's sheet, so the scheduler sees it at
/// the next outcome evaluation. Entities without an action point left, or
/// without a target, pass instead.
pub struct StrikeProvider {
    roster: Arc<PartyRoster>,
}

impl StrikeProvider {
    pub fn new(roster: Arc<PartyRoster>) -> Self {
        Self { roster }
    }
}

#[async_trait]
impl ActionProvider for StrikeProvider {
    async fn provide_action(
        &self,
        entity: EntityId,
        _snapshot: &EncounterSnapshot,
    ) -> Result<ActionResults> {
        let Some(attacker) = self.roster.find(entity) else {
            debug!(
                target: "encounter::providers",
                "entity {entity} is not on the roster, passing"
            );
            return Ok(pass_results());
        };
        // The scheduler still hands turns to downed combatants; they just
        // have nothing to act with.
        if attacker.is_down() || !attacker.sheet().take_action() {
            return Ok(pass_results());
        }
        let Some(target) = self.roster.first_living_opponent(entity) else {
            return Ok(pass_results());
        };

        let damage = attacker.attack_power();
        let remaining = target.sheet().apply_damage(damage);
        debug!(
            target: "encounter::providers",
            attacker = %attacker.name(),
            defender = %target.name(),
            damage,
            remaining,
            "strike resolved"
        );

        let mut results = ActionResults::new();
        results.insert("action".to_string(), json!("strike"));
        results.insert("target".to_string(), json!(target.entity_id()));
        results.insert("damage".to_string(), json!(damage));
        results.insert("target_health".to_string(), json!(remaining));
        Ok(results)
    }
}
