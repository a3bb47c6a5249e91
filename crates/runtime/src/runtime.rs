//! High-level runtime orchestrator.
//!
//! The runtime owns the background worker, wires up command/event channels,
//! and exposes a builder-based API for clients to drive encounters.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use encounter_core::{
    Combatant, EncounterEvent, EncounterPhase, EncounterSnapshot, EncounterState, EntityId,
    InitiativeDice,
};

use crate::api::{ActionProvider, EncounterHandle, ProviderSide, Result, RuntimeError};
use crate::events::EventBus;
use crate::workers::{Command, EncounterWorker};

/// Runtime configuration shared across the orchestrator and worker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Seed for initiative rolls; [`InitiativeDice::UNSEEDED`] draws from OS
    /// entropy instead.
    pub initiative_seed: u64,
    pub event_buffer_size: usize,
    pub command_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initiative_seed: InitiativeDice::UNSEEDED,
            event_buffer_size: 100,
            command_buffer_size: 32,
        }
    }
}

/// Main runtime that orchestrates encounter scheduling.
///
/// The runtime owns the worker and coordinates providers; [`EncounterHandle`]
/// provides a cloneable façade for clients.
pub struct Runtime {
    handle: EncounterHandle,

    // Action providers per side (injected by user)
    players_provider: Option<Box<dyn ActionProvider>>,
    opponents_provider: Option<Box<dyn ActionProvider>>,

    /// Which provider answers for each participant, recorded at start time.
    sides: HashMap<EntityId, ProviderSide>,

    worker_handle: JoinHandle<()>,
}

impl Runtime {
    /// Create a new runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime.
    ///
    /// The handle can be shared across clients and async tasks.
    pub fn handle(&self) -> EncounterHandle {
        self.handle.clone()
    }

    /// Subscribe to encounter events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EncounterEvent> {
        self.handle.subscribe_events()
    }

    /// Start an encounter, recording which provider side answers for each
    /// participant. Player-tagged factions go to the players provider,
    /// everyone else to the opponents provider.
    pub async fn start_encounter(
        &mut self,
        participants: Vec<Arc<dyn Combatant>>,
    ) -> Result<EncounterSnapshot> {
        self.record_sides(&participants);
        self.handle.start_encounter(participants).await
    }

    /// Add late joiners, keeping the side bookkeeping current.
    pub async fn inject_participants(
        &mut self,
        participants: Vec<Arc<dyn Combatant>>,
        rebuild_queue: bool,
    ) -> Result<EncounterSnapshot> {
        self.record_sides(&participants);
        self.handle
            .inject_participants(participants, rebuild_queue)
            .await
    }

    /// Resolve a single turn.
    ///
    /// Asks the active entity's provider for an action and feeds the results
    /// back to the worker. Requires both providers to be configured.
    pub async fn step(&mut self) -> Result<EncounterSnapshot> {
        let players_provider =
            self.players_provider
                .as_ref()
                .ok_or(RuntimeError::ProviderNotSet {
                    side: ProviderSide::Players,
                })?;
        let opponents_provider =
            self.opponents_provider
                .as_ref()
                .ok_or(RuntimeError::ProviderNotSet {
                    side: ProviderSide::Opponents,
                })?;

        let snapshot = self.handle.snapshot().await?;
        match snapshot.phase {
            EncounterPhase::AwaitingAction => {}
            EncounterPhase::Idle => return Err(RuntimeError::NoActiveTurn),
            EncounterPhase::Ended => return Err(RuntimeError::EncounterEnded),
        }
        let entity = snapshot.active_entity.ok_or(RuntimeError::NoActiveTurn)?;

        let provider = match self.sides.get(&entity) {
            Some(ProviderSide::Players) => players_provider,
            _ => opponents_provider,
        };
        let results = provider.provide_action(entity, &snapshot).await?;

        self.handle.resolve_action(Some(entity), Some(results)).await
    }

    /// Step until the encounter reaches an outcome, bounded by `max_turns`.
    pub async fn run_until_complete(&mut self, max_turns: u64) -> Result<EncounterSnapshot> {
        for _ in 0..max_turns {
            let snapshot = self.step().await?;
            if snapshot.phase == EncounterPhase::Ended {
                return Ok(snapshot);
            }
        }
        Err(RuntimeError::TurnBudgetExhausted { max_turns })
    }

    /// Set the action provider for player-side participants.
    pub fn set_players_provider(&mut self, provider: impl ActionProvider + 'static) {
        self.players_provider = Some(Box::new(provider));
    }

    /// Set the action provider for everyone else.
    pub fn set_opponents_provider(&mut self, provider: impl ActionProvider + 'static) {
        self.opponents_provider = Some(Box::new(provider));
    }

    /// Shutdown the runtime gracefully.
    ///
    /// Drops this runtime's handle and waits for the worker to drain; handles
    /// cloned out of the runtime keep the worker alive until they drop too.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.handle);

        self.worker_handle.await.map_err(RuntimeError::WorkerJoin)?;

        Ok(())
    }

    fn record_sides(&mut self, participants: &[Arc<dyn Combatant>]) {
        for combatant in participants {
            let side = match combatant.faction() {
                Some(tag) if tag.is_players() => ProviderSide::Players,
                _ => ProviderSide::Opponents,
            };
            self.sides.insert(combatant.entity_id(), side);
        }
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    state: Option<EncounterState>,
    players_provider: Option<Box<dyn ActionProvider>>,
    opponents_provider: Option<Box<dyn ActionProvider>>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            state: None,
            players_provider: None,
            opponents_provider: None,
        }
    }

    /// Override runtime configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Fix the initiative seed for reproducible encounters.
    pub fn initiative_seed(mut self, seed: u64) -> Self {
        self.config.initiative_seed = seed;
        self
    }

    /// Provide pre-populated encounter state instead of a fresh one.
    pub fn initial_state(mut self, state: EncounterState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the player-side action provider (optional).
    pub fn players_provider(mut self, provider: impl ActionProvider + 'static) -> Self {
        self.players_provider = Some(Box::new(provider));
        self
    }

    /// Set the opponent-side action provider (optional).
    pub fn opponents_provider(mut self, provider: impl ActionProvider + 'static) -> Self {
        self.opponents_provider = Some(Box::new(provider));
        self
    }

    /// Build the runtime and spawn its worker.
    pub async fn build(self) -> Runtime {
        let state = self.state.unwrap_or_default();

        let (command_tx, command_rx) = mpsc::channel::<Command>(self.config.command_buffer_size);
        let event_bus = EventBus::with_capacity(self.config.event_buffer_size);

        let handle = EncounterHandle::new(command_tx, event_bus.clone());
        let dice = InitiativeDice::from_seed(self.config.initiative_seed);

        let worker = EncounterWorker::new(state, dice, command_rx, event_bus);
        let worker_handle = tokio::spawn(async move {
            worker.run().await;
        });

        Runtime {
            handle,
            players_provider: self.players_provider,
            opponents_provider: self.opponents_provider,
            sides: HashMap::new(),
            worker_handle,
        }
    }
}
