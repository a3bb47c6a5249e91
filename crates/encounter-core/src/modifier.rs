//! Timed initiative adjustments.
//!
//! Modifiers age once per queue rebuild: ticking decrements finite durations,
//! sums the contribution of everything still active, and drops what expired.
use serde::{Deserialize, Serialize};

/// How long an initiative modifier keeps contributing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierDuration {
    /// Contributes to the given number of upcoming rebuilds, then expires.
    Rounds(u32),
    /// Never expires on its own.
    Infinite,
}

impl ModifierDuration {
    /// Remaining rounds for finite durations, `None` for infinite ones.
    pub fn remaining_rounds(self) -> Option<u32> {
        match self {
            Self::Rounds(remaining) => Some(remaining),
            Self::Infinite => None,
        }
    }
}

/// A signed, time-limited adjustment to a combatant's initiative total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeModifier {
    /// Label identifying what granted the modifier, for events and logs.
    pub source: String,
    pub delta: i32,
    pub duration: ModifierDuration,
}

impl InitiativeModifier {
    pub fn new(source: impl Into<String>, delta: i32, duration: ModifierDuration) -> Self {
        Self {
            source: source.into(),
            delta,
            duration,
        }
    }
}

/// Active modifiers for one combatant.
#[derive(Clone, Debug, Default)]
pub struct ModifierSet {
    active: Vec<InitiativeModifier>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, modifier: InitiativeModifier) {
        self.active.push(modifier);
    }

    /// Ages every modifier by one round and returns the net delta of those
    /// still active. A modifier with `Rounds(n)` contributes to exactly the
    /// next `n` ticks.
    pub fn tick(&mut self) -> i32 {
        let mut delta = 0;
        self.active.retain_mut(|modifier| match &mut modifier.duration {
            ModifierDuration::Infinite => {
                delta += modifier.delta;
                true
            }
            ModifierDuration::Rounds(0) => false,
            ModifierDuration::Rounds(remaining) => {
                *remaining -= 1;
                delta += modifier.delta;
                *remaining > 0
            }
        });
        delta
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }
}
