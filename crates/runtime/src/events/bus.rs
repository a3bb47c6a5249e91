//! Broadcast event bus bridging the scheduler to async subscribers.

use tokio::sync::broadcast;

use encounter_core::{EncounterEvent, EventChannel};

/// Fan-out channel for [`EncounterEvent`]s.
///
/// Publishing is best-effort: events emitted while nobody is subscribed are
/// dropped, and slow subscribers observe `Lagged` on their receiver rather
/// than backpressuring the worker.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EncounterEvent>,
}

impl EventBus {
    /// Creates a bus with the default per-subscriber buffer.
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<EncounterEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventChannel for EventBus {
    fn publish(&self, event: EncounterEvent) {
        if self.sender.send(event).is_err() {
            // No subscribers right now - this is normal, not an error
            tracing::trace!(
                target: "encounter::events",
                "no subscribers for encounter event"
            );
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
