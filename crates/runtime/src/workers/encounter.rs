//! Encounter worker that owns the authoritative [`encounter_core::EncounterState`].
//!
//! Receives commands from [`crate::api::EncounterHandle`], drives the
//! scheduler, and publishes events to the [`EventBus`]. State never leaves the
//! worker; callers observe it through snapshots carried on the replies.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use encounter_core::{
    ActionResults, Combatant, EncounterPhase, EncounterSnapshot, EncounterState, EntityId,
    InitiativeDice, ModifierDuration, Scheduler,
};

use crate::api::{Result, RuntimeError};
use crate::events::EventBus;

/// Commands that can be sent to the encounter worker.
pub enum Command {
    /// Reset the state and start a new encounter with the given roster.
    /// Fails when no participant resolves a runtime bundle.
    StartEncounter {
        participants: Vec<Arc<dyn Combatant>>,
        reply: oneshot::Sender<Result<EncounterSnapshot>>,
    },
    /// Report that the in-flight action resolved. Stale or out-of-phase
    /// notifications are absorbed; the reply always carries the snapshot
    /// after the attempt.
    ResolveAction {
        entity: Option<EntityId>,
        results: Option<ActionResults>,
        reply: oneshot::Sender<EncounterSnapshot>,
    },
    /// Record a timed initiative adjustment on one participant.
    ApplyModifier {
        entity: EntityId,
        delta: i32,
        duration: ModifierDuration,
        source: String,
        reply: oneshot::Sender<EncounterSnapshot>,
    },
    /// Resolve and append late joiners, optionally forcing a rebuild.
    InjectParticipants {
        participants: Vec<Arc<dyn Combatant>>,
        rebuild_queue: bool,
        reply: oneshot::Sender<EncounterSnapshot>,
    },
    /// Discard the pending queue and roll a fresh one.
    ForceRebuild {
        auto_advance: bool,
        reply: oneshot::Sender<EncounterSnapshot>,
    },
    /// Query the current encounter state (read-only).
    QuerySnapshot {
        reply: oneshot::Sender<EncounterSnapshot>,
    },
}

/// Background task that processes encounter commands.
///
/// The worker is a thin shell around [`Scheduler`]: one command in, scheduler
/// mutation plus published events out, snapshot back on the reply channel.
pub struct EncounterWorker {
    scheduler: Scheduler<EventBus>,
    command_rx: mpsc::Receiver<Command>,
}

impl EncounterWorker {
    pub fn new(
        state: EncounterState,
        dice: InitiativeDice,
        command_rx: mpsc::Receiver<Command>,
        event_bus: EventBus,
    ) -> Self {
        let mut scheduler = Scheduler::new(event_bus, dice);
        scheduler.attach_state(state);

        Self {
            scheduler,
            command_rx,
        }
    }

    /// Main worker loop. Exits when every command sender is gone.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                }
                else => break,
            }
        }
        debug!(target: "encounter::worker", "command channel closed, worker stopping");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartEncounter {
                participants,
                reply,
            } => {
                self.scheduler.initialize_encounter(&participants);
                let result = match self.scheduler.state().map(|state| state.phase) {
                    Some(EncounterPhase::AwaitingAction) => Ok(self.snapshot()),
                    _ => Err(RuntimeError::EncounterNotStarted),
                };
                if reply.send(result).is_err() {
                    debug!(
                        target: "encounter::worker",
                        "StartEncounter reply channel closed (caller dropped)"
                    );
                }
            }
            Command::ResolveAction {
                entity,
                results,
                reply,
            } => {
                self.scheduler.complete_turn(entity, results);
                if reply.send(self.snapshot()).is_err() {
                    debug!(
                        target: "encounter::worker",
                        "ResolveAction reply channel closed (caller dropped)"
                    );
                }
            }
            Command::ApplyModifier {
                entity,
                delta,
                duration,
                source,
                reply,
            } => {
                self.scheduler
                    .apply_initiative_modifier(entity, delta, duration, &source);
                if reply.send(self.snapshot()).is_err() {
                    debug!(
                        target: "encounter::worker",
                        "ApplyModifier reply channel closed (caller dropped)"
                    );
                }
            }
            Command::InjectParticipants {
                participants,
                rebuild_queue,
                reply,
            } => {
                self.scheduler
                    .inject_participants(&participants, rebuild_queue);
                if reply.send(self.snapshot()).is_err() {
                    debug!(
                        target: "encounter::worker",
                        "InjectParticipants reply channel closed (caller dropped)"
                    );
                }
            }
            Command::ForceRebuild {
                auto_advance,
                reply,
            } => {
                self.scheduler.force_rebuild_queue(auto_advance);
                if reply.send(self.snapshot()).is_err() {
                    debug!(
                        target: "encounter::worker",
                        "ForceRebuild reply channel closed (caller dropped)"
                    );
                }
            }
            Command::QuerySnapshot { reply } => {
                if reply.send(self.snapshot()).is_err() {
                    debug!(
                        target: "encounter::worker",
                        "QuerySnapshot reply channel closed (caller dropped)"
                    );
                }
            }
        }
    }

    fn snapshot(&self) -> EncounterSnapshot {
        // The worker attaches state at construction and never detaches it.
        self.scheduler.snapshot().unwrap_or_default()
    }
}
