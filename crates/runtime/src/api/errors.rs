//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination and action providers so clients
//! can bubble them up with consistent context.
use std::fmt;

use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("encounter could not start, no participant resolved a runtime bundle")]
    EncounterNotStarted,

    #[error("encounter already reached an outcome")]
    EncounterEnded,

    #[error("no turn is awaiting an action")]
    NoActiveTurn,

    #[error("encounter still running after {max_turns} turns")]
    TurnBudgetExhausted { max_turns: u64 },

    #[error("{side} action provider not set")]
    ProviderNotSet { side: ProviderSide },

    #[error("encounter worker command channel closed")]
    CommandChannelClosed,

    #[error("encounter worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("encounter worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),
}

/// Which side of the encounter a provider acts for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProviderSide {
    Players,
    Opponents,
}

impl fmt::Display for ProviderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderSide::Players => "players",
            ProviderSide::Opponents => "opponents",
        };
        write!(f, "{}", label)
    }
}
