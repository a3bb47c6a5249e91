//! Cloneable façade for issuing commands to the encounter worker.
//!
//! [`EncounterHandle`] hides channel plumbing and offers async helpers for
//! driving the encounter or streaming its events.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use encounter_core::{
    ActionResults, Combatant, EncounterEvent, EncounterSnapshot, EntityId, ModifierDuration,
};

use super::errors::{Result, RuntimeError};
use crate::events::EventBus;
use crate::workers::Command;

/// Client-facing handle to interact with a running encounter.
#[derive(Clone)]
pub struct EncounterHandle {
    command_tx: mpsc::Sender<Command>,
    event_bus: EventBus,
}

impl EncounterHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    /// Start a new encounter with the given roster, replacing any previous
    /// one. Returns the snapshot with the first turn already announced.
    pub async fn start_encounter(
        &self,
        participants: Vec<Arc<dyn Combatant>>,
    ) -> Result<EncounterSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::StartEncounter {
                participants,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    /// Report that the in-flight action resolved.
    ///
    /// `entity` may be `None` to resolve whatever turn is active; a stale
    /// entity is absorbed without effect. The returned snapshot reflects the
    /// encounter after the scheduler processed the notification.
    pub async fn resolve_action(
        &self,
        entity: Option<EntityId>,
        results: Option<ActionResults>,
    ) -> Result<EncounterSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::ResolveAction {
                entity,
                results,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Record a timed initiative adjustment for a participant. Takes effect
    /// at the next queue rebuild.
    pub async fn apply_modifier(
        &self,
        entity: EntityId,
        delta: i32,
        duration: ModifierDuration,
        source: impl Into<String>,
    ) -> Result<EncounterSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::ApplyModifier {
                entity,
                delta,
                duration,
                source: source.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Add late joiners to the roster. With `rebuild_queue` they roll into a
    /// fresh queue immediately; otherwise they wait for the next round.
    pub async fn inject_participants(
        &self,
        participants: Vec<Arc<dyn Combatant>>,
        rebuild_queue: bool,
    ) -> Result<EncounterSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::InjectParticipants {
                participants,
                rebuild_queue,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Discard the pending queue and roll a fresh one for the current roster.
    pub async fn force_rebuild(&self, auto_advance: bool) -> Result<EncounterSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::ForceRebuild {
                auto_advance,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Query the current encounter state (read-only snapshot).
    pub async fn snapshot(&self) -> Result<EncounterSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::QuerySnapshot { reply: reply_tx })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Subscribe to encounter events.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut events = handle.subscribe_events();
    /// while let Ok(event) = events.recv().await {
    ///     // React to announcements
    /// }
    /// ```
    pub fn subscribe_events(&self) -> broadcast::Receiver<EncounterEvent> {
        self.event_bus.subscribe()
    }

    /// Get a reference to the event bus for advanced usage.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
