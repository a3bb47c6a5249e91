//! The encounter state machine.
//!
//! The scheduler owns one [`EncounterState`] at a time and drives it through
//! `Idle -> AwaitingAction -> Ended`. Every externally relevant transition is
//! published on the injected [`EventChannel`]; the suspension between a turn
//! announcement and its action resolution is the `AwaitingAction` phase, not
//! a blocked thread. No operation here is fatal: missing state, unresolvable
//! participants, and stale resolutions all degrade to logged no-ops.
use std::collections::HashMap;
use std::sync::Arc;

use crate::events::{
    ActionResults, EncounterEvent, EncounterOutcome, EncounterReport, EncounterSummary,
    EventChannel, TurnCue,
};
use crate::modifier::{InitiativeModifier, ModifierDuration};
use crate::participant::{Combatant, EntityId, FactionTag, prepare};
use crate::rng::InitiativeDice;
use crate::state::{EncounterPhase, EncounterSnapshot, EncounterState, InitiativeBreakdown, TurnEntry};

/// Turn-order scheduler for one combat encounter.
pub struct Scheduler<C: EventChannel> {
    state: Option<EncounterState>,
    channel: C,
    dice: InitiativeDice,
}

impl<C: EventChannel> Scheduler<C> {
    pub fn new(channel: C, dice: InitiativeDice) -> Self {
        Self {
            state: None,
            channel,
            dice,
        }
    }

    /// Hands the scheduler the state it will operate on.
    pub fn attach_state(&mut self, state: EncounterState) {
        self.state = Some(state);
    }

    /// Takes the state back. Until another is attached, every operation
    /// degrades to a logged no-op.
    pub fn detach_state(&mut self) -> Option<EncounterState> {
        self.state.take()
    }

    pub fn state(&self) -> Option<&EncounterState> {
        self.state.as_ref()
    }

    pub fn snapshot(&self) -> Option<EncounterSnapshot> {
        self.state.as_ref().map(EncounterState::snapshot)
    }

    /// Starts a new encounter with the given roster.
    ///
    /// Resets the state (implicitly discarding any in-flight turn), resolves
    /// and registers every participant, rolls round 1, and announces the
    /// first turn. Participants that fail to resolve stay on the roster but
    /// never enter the queue. With no resolvable participant at all the
    /// scheduler stays `Idle` and publishes nothing.
    pub fn initialize_encounter(&mut self, participants: &[Arc<dyn Combatant>]) {
        let Some(state) = self.state.as_mut() else {
            tracing::warn!(
                target: "encounter::scheduler",
                "no encounter state attached, cannot initialize encounter"
            );
            return;
        };

        state.reset();

        let mut resolved = 0usize;
        for combatant in participants {
            match prepare(combatant.as_ref(), true) {
                Ok((entity, entry)) => {
                    state.register(entity, Some(entry));
                    resolved += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        target: "encounter::scheduler",
                        "participant {} excluded from scheduling: {err}",
                        err.entity()
                    );
                    state.register(err.entity(), None);
                }
            }
        }

        if resolved == 0 {
            tracing::warn!(
                target: "encounter::scheduler",
                "no participant resolved a runtime bundle, encounter not started"
            );
            return;
        }

        let roster = state.participants.clone();
        tracing::info!(
            target: "encounter::scheduler",
            participants = roster.len(),
            "encounter initialized"
        );
        self.channel
            .publish(EncounterEvent::EncounterStarted { participants: roster });

        self.rebuild_queue();
        self.advance_turn();
    }

    /// Feeds the external "action resolved" notification into the machine.
    ///
    /// Only honored while `AwaitingAction`. A notification naming an entity
    /// other than the active one is stale and ignored; a notification without
    /// an entity is accepted for the active turn. On acceptance the turn is
    /// completed, the outcome evaluated, and the encounter either ends or
    /// advances to the next turn.
    pub fn complete_turn(&mut self, entity: Option<EntityId>, results: Option<ActionResults>) {
        let Some(state) = self.state.as_mut() else {
            tracing::warn!(
                target: "encounter::scheduler",
                "no encounter state attached, ignoring action resolution"
            );
            return;
        };

        if state.phase != EncounterPhase::AwaitingAction {
            tracing::debug!(
                target: "encounter::scheduler",
                "no turn awaiting resolution, ignoring action resolution"
            );
            return;
        }

        let current = match (entity, state.active_entity) {
            (Some(notified), Some(active)) if notified != active => {
                tracing::debug!(
                    target: "encounter::scheduler",
                    "stale action resolution for {notified}, active turn belongs to {active}"
                );
                return;
            }
            (_, Some(active)) => active,
            (Some(notified), None) => notified,
            (None, None) => {
                tracing::debug!(
                    target: "encounter::scheduler",
                    "action resolution without an addressable turn, ignoring"
                );
                return;
            }
        };

        state.phase = EncounterPhase::Idle;
        let round = state.round_counter;

        self.channel.publish(EncounterEvent::TurnCompleted {
            entity_id: current,
            round,
            results: results.clone(),
        });

        match self.evaluate_outcome() {
            Some((outcome, winning_team)) => self.end_encounter(outcome, winning_team, results),
            None => self.advance_turn(),
        }
    }

    /// Records a timed initiative adjustment on a participant's combat
    /// runtime. Warns and does nothing if the participant or its runtime is
    /// unknown.
    pub fn apply_initiative_modifier(
        &mut self,
        entity: EntityId,
        delta: i32,
        duration: ModifierDuration,
        source: &str,
    ) {
        let Some(state) = self.state.as_ref() else {
            tracing::warn!(
                target: "encounter::scheduler",
                "no encounter state attached, ignoring initiative modifier"
            );
            return;
        };
        let Some(bundle) = state.runtime_entry(entity) else {
            tracing::warn!(
                target: "encounter::scheduler",
                "cannot modify initiative of unknown participant {entity}"
            );
            return;
        };

        bundle
            .runtime
            .add_initiative_modifier(InitiativeModifier::new(source, delta, duration));

        self.channel.publish(EncounterEvent::InitiativeModified {
            entity_id: entity,
            delta,
            source: source.to_string(),
            remaining_rounds: duration.remaining_rounds(),
        });
    }

    /// Resolves and appends late joiners to the roster, deduplicated.
    ///
    /// With `rebuild_queue` set, forces a non-advancing rebuild so the
    /// joiners are eligible starting next round. An in-flight turn is left
    /// untouched either way.
    pub fn inject_participants(
        &mut self,
        participants: &[Arc<dyn Combatant>],
        rebuild_queue: bool,
    ) {
        let Some(state) = self.state.as_mut() else {
            tracing::warn!(
                target: "encounter::scheduler",
                "no encounter state attached, ignoring participant injection"
            );
            return;
        };

        let mut joined = 0usize;
        for combatant in participants {
            match prepare(combatant.as_ref(), true) {
                Ok((entity, entry)) => {
                    if state.register(entity, Some(entry)) {
                        joined += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target: "encounter::scheduler",
                        "injected participant {} excluded from scheduling: {err}",
                        err.entity()
                    );
                    state.register(err.entity(), None);
                }
            }
        }

        tracing::info!(
            target: "encounter::scheduler",
            joined,
            "participants injected into the encounter"
        );

        if rebuild_queue {
            self.force_rebuild_queue(false);
        }
    }

    /// Clears the pending queue and rolls a fresh one for the current roster.
    ///
    /// Used after external edits to the roster. With `auto_advance` set, the
    /// first turn of the new queue is announced immediately; while a turn is
    /// in flight the advance stays a no-op and the active turn continues
    /// against the new queue.
    pub fn force_rebuild_queue(&mut self, auto_advance: bool) {
        let Some(state) = self.state.as_mut() else {
            tracing::warn!(
                target: "encounter::scheduler",
                "no encounter state attached, ignoring queue rebuild"
            );
            return;
        };
        if state.phase == EncounterPhase::Ended {
            tracing::debug!(
                target: "encounter::scheduler",
                "encounter already ended, ignoring queue rebuild"
            );
            return;
        }

        if state.phase != EncounterPhase::AwaitingAction {
            state.active_entity = None;
        }
        state.turn_queue.clear();

        self.rebuild_queue();
        if auto_advance {
            self.advance_turn();
        }
    }

    /// Rolls one round's queue: d100 + sheet seed + standing initiative +
    /// this round's modifier delta per roster member, sorted descending.
    ///
    /// The composite total is persisted back onto each combat runtime as the
    /// next round's standing value.
    fn rebuild_queue(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if !state.turn_queue.is_empty() {
            tracing::debug!(
                target: "encounter::scheduler",
                "turn queue not empty, skipping rebuild"
            );
            return;
        }
        if state.participants.is_empty() {
            tracing::warn!(
                target: "encounter::scheduler",
                "cannot rebuild the turn queue with an empty roster"
            );
            return;
        }

        state.round_counter += 1;
        let round = state.round_counter;
        self.channel.publish(EncounterEvent::RoundStarted { round });

        for &entity in state.participants.iter() {
            let Some(bundle) = state.runtime.get(&entity) else {
                tracing::warn!(
                    target: "encounter::scheduler",
                    "no runtime bundle for {entity}, skipping this round"
                );
                continue;
            };

            let breakdown = InitiativeBreakdown {
                roll: self.dice.roll_d100(),
                seed: bundle.sheet.initiative_seed(),
                base_initiative: bundle.runtime.base_initiative(),
                modifier_delta: bundle.runtime.tick_initiative_modifiers(),
            };
            let total = breakdown.total();
            bundle.runtime.store_base_initiative(total);

            state.turn_queue.push_back(TurnEntry {
                entity_id: entity,
                initiative: total,
                breakdown,
            });
        }

        if state.turn_queue.is_empty() {
            tracing::warn!(
                target: "encounter::scheduler",
                "queue rebuild for round {round} produced no entries"
            );
            return;
        }

        // Descending initiative; ties resolve by roster registration order
        // rather than sort stability.
        let order: HashMap<EntityId, usize> = state
            .participants
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();
        state.turn_queue.make_contiguous().sort_by(|a, b| {
            b.initiative.cmp(&a.initiative).then_with(|| {
                let left = order.get(&a.entity_id).copied().unwrap_or(usize::MAX);
                let right = order.get(&b.entity_id).copied().unwrap_or(usize::MAX);
                left.cmp(&right)
            })
        });

        let queue = state.snapshot_queue();
        tracing::debug!(
            target: "encounter::scheduler",
            round,
            entries = queue.len(),
            "turn queue rebuilt"
        );
        self.channel
            .publish(EncounterEvent::QueueRebuilt { round, queue });
    }

    /// Pops the next turn and announces it, rebuilding the queue first when
    /// it ran dry. No-op while a turn is already in flight or after the
    /// encounter ended; aborts silently when a rebuild produces nothing.
    fn advance_turn(&mut self) {
        match self.state.as_ref().map(|state| state.phase) {
            None => return,
            Some(EncounterPhase::AwaitingAction) => {
                tracing::debug!(
                    target: "encounter::scheduler",
                    "turn already in flight, ignoring advance"
                );
                return;
            }
            Some(EncounterPhase::Ended) => {
                tracing::debug!(
                    target: "encounter::scheduler",
                    "encounter ended, ignoring advance"
                );
                return;
            }
            Some(EncounterPhase::Idle) => {}
        }

        if self
            .state
            .as_ref()
            .is_some_and(|state| state.turn_queue.is_empty())
        {
            self.rebuild_queue();
        }

        let Some(state) = self.state.as_mut() else {
            return;
        };
        let Some(entry) = state.turn_queue.pop_front() else {
            // Rebuild produced nothing; the caller must inject participants
            // or reinitialize.
            return;
        };

        state.active_entity = Some(entry.entity_id);
        state.turn_number += 1;
        state.phase = EncounterPhase::AwaitingAction;

        if let Some(bundle) = state.runtime.get(&entry.entity_id) {
            bundle.sheet.refresh_turn_resources();
        }

        let turn_number = state.turn_number;
        let cue = TurnCue {
            entity_id: entry.entity_id,
            round: state.round_counter,
            initiative: entry.initiative,
            queue: state.snapshot_queue(),
        };

        tracing::debug!(
            target: "encounter::scheduler",
            entity = %entry.entity_id,
            turn = turn_number,
            initiative = entry.initiative,
            "turn ready for action"
        );
        self.channel
            .publish(EncounterEvent::TurnPassed { turn_number });
        self.channel
            .publish(EncounterEvent::TurnStarted(Box::new(cue.clone())));
        self.channel
            .publish(EncounterEvent::TurnReady(Box::new(cue)));
    }

    /// Partitions the roster by faction and checks both sides for a living
    /// member. Defeat is checked before victory, so mutual annihilation reads
    /// as defeat. Unaligned participants count toward neither side.
    fn evaluate_outcome(&self) -> Option<(EncounterOutcome, Option<FactionTag>)> {
        let state = self.state.as_ref()?;

        let mut players_alive = false;
        let mut others_alive = false;
        let mut living_tags: Vec<FactionTag> = Vec::new();

        for &entity in &state.participants {
            let Some(bundle) = state.runtime.get(&entity) else {
                continue;
            };
            let conscious = bundle.sheet.health() > 0;
            match bundle.faction.as_ref() {
                Some(tag) if tag.is_players() => players_alive |= conscious,
                Some(tag) => {
                    if conscious {
                        others_alive = true;
                        if !living_tags.contains(tag) {
                            living_tags.push(tag.clone());
                        }
                    }
                }
                None => {}
            }
        }

        if !players_alive {
            let winner = if living_tags.len() == 1 {
                living_tags.pop()
            } else {
                None
            };
            return Some((EncounterOutcome::Defeat, winner));
        }
        if !others_alive {
            return Some((EncounterOutcome::Victory, Some(FactionTag::players())));
        }
        None
    }

    fn end_encounter(
        &mut self,
        outcome: EncounterOutcome,
        winning_team: Option<FactionTag>,
        last_action: Option<ActionResults>,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let summary = EncounterSummary {
            round: state.round_counter,
            turns: state.turn_number,
            participants: state.participants.clone(),
            last_action,
            remaining_queue: state.snapshot_queue(),
        };

        state.turn_queue.clear();
        state.active_entity = None;
        state.phase = EncounterPhase::Ended;

        tracing::info!(
            target: "encounter::scheduler",
            %outcome,
            rounds = summary.round,
            turns = summary.turns,
            "encounter ended"
        );
        self.channel
            .publish(EncounterEvent::EncounterEnded(Box::new(EncounterReport {
                outcome,
                winning_team,
                summary,
            })));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::modifier::ModifierSet;
    use crate::participant::{CharacterSheet, CombatRuntime};

    #[derive(Clone, Default)]
    struct RecordingChannel {
        events: Arc<Mutex<Vec<EncounterEvent>>>,
    }

    impl RecordingChannel {
        fn events(&self) -> Vec<EncounterEvent> {
            self.events.lock().unwrap().clone()
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(kind).collect()
        }

        fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    impl EventChannel for RecordingChannel {
        fn publish(&self, event: EncounterEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn kind(event: &EncounterEvent) -> &'static str {
        match event {
            EncounterEvent::EncounterStarted { .. } => "encounter_started",
            EncounterEvent::RoundStarted { .. } => "round_started",
            EncounterEvent::QueueRebuilt { .. } => "queue_rebuilt",
            EncounterEvent::TurnPassed { .. } => "turn_passed",
            EncounterEvent::TurnStarted(_) => "turn_started",
            EncounterEvent::TurnReady(_) => "turn_ready",
            EncounterEvent::TurnCompleted { .. } => "turn_completed",
            EncounterEvent::InitiativeModified { .. } => "initiative_modified",
            EncounterEvent::EncounterEnded(_) => "encounter_ended",
        }
    }

    struct TestSheet {
        health: AtomicI32,
        initiative_seed: i32,
        refreshes: AtomicU32,
    }

    impl CharacterSheet for TestSheet {
        fn health(&self) -> i32 {
            self.health.load(Ordering::SeqCst)
        }

        fn initiative_seed(&self) -> i32 {
            self.initiative_seed
        }

        fn refresh_turn_resources(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestRuntime {
        base: AtomicI32,
        modifiers: Mutex<ModifierSet>,
    }

    impl CombatRuntime for TestRuntime {
        fn base_initiative(&self) -> i32 {
            self.base.load(Ordering::SeqCst)
        }

        fn store_base_initiative(&self, value: i32) {
            self.base.store(value, Ordering::SeqCst);
        }

        fn tick_initiative_modifiers(&self) -> i32 {
            self.modifiers.lock().unwrap().tick()
        }

        fn add_initiative_modifier(&self, modifier: InitiativeModifier) {
            self.modifiers.lock().unwrap().add(modifier);
        }

        fn reset_for_encounter(&self) {
            self.base.store(0, Ordering::SeqCst);
            self.modifiers.lock().unwrap().clear();
        }
    }

    struct TestCombatant {
        id: EntityId,
        sheet: Option<Arc<TestSheet>>,
        runtime: Option<Arc<TestRuntime>>,
        faction: Option<FactionTag>,
    }

    impl TestCombatant {
        fn new(id: u32, faction: Option<&str>, health: i32) -> Arc<Self> {
            Arc::new(Self {
                id: EntityId(id),
                sheet: Some(Arc::new(TestSheet {
                    health: AtomicI32::new(health),
                    initiative_seed: 0,
                    refreshes: AtomicU32::new(0),
                })),
                runtime: Some(Arc::new(TestRuntime {
                    base: AtomicI32::new(0),
                    modifiers: Mutex::new(ModifierSet::new()),
                })),
                faction: faction.map(FactionTag::new),
            })
        }

        fn without_runtime(id: u32) -> Arc<Self> {
            Arc::new(Self {
                id: EntityId(id),
                sheet: Some(Arc::new(TestSheet {
                    health: AtomicI32::new(10),
                    initiative_seed: 0,
                    refreshes: AtomicU32::new(0),
                })),
                runtime: None,
                faction: None,
            })
        }

        fn without_sheet(id: u32) -> Arc<Self> {
            Arc::new(Self {
                id: EntityId(id),
                sheet: None,
                runtime: Some(Arc::new(TestRuntime {
                    base: AtomicI32::new(0),
                    modifiers: Mutex::new(ModifierSet::new()),
                })),
                faction: None,
            })
        }
    }

    impl Combatant for TestCombatant {
        fn entity_id(&self) -> EntityId {
            self.id
        }

        fn character_sheet(&self) -> Option<Arc<dyn CharacterSheet>> {
            self.sheet
                .clone()
                .map(|sheet| sheet as Arc<dyn CharacterSheet>)
        }

        fn combat_runtime(&self) -> Option<Arc<dyn CombatRuntime>> {
            self.runtime
                .clone()
                .map(|runtime| runtime as Arc<dyn CombatRuntime>)
        }

        fn faction(&self) -> Option<FactionTag> {
            self.faction.clone()
        }
    }

    fn roster(members: &[&Arc<TestCombatant>]) -> Vec<Arc<dyn Combatant>> {
        members
            .iter()
            .map(|member| Arc::clone(member) as Arc<dyn Combatant>)
            .collect()
    }

    fn scheduler_with_seed(seed: u64) -> (Scheduler<RecordingChannel>, RecordingChannel) {
        let channel = RecordingChannel::default();
        let mut scheduler = Scheduler::new(channel.clone(), InitiativeDice::from_seed(seed));
        scheduler.attach_state(EncounterState::new());
        (scheduler, channel)
    }

    fn rebuilt_queues(channel: &RecordingChannel) -> Vec<(u32, Vec<TurnEntry>)> {
        channel
            .events()
            .into_iter()
            .filter_map(|event| match event {
                EncounterEvent::QueueRebuilt { round, queue } => Some((round, queue)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn initialize_registers_unique_participants() {
        let (mut scheduler, channel) = scheduler_with_seed(7);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);

        scheduler.initialize_encounter(&roster(&[&a, &b, &a]));

        let state = scheduler.state().unwrap();
        assert_eq!(state.participants, vec![EntityId(1), EntityId(2)]);
        assert_eq!(
            channel.events().first(),
            Some(&EncounterEvent::EncounterStarted {
                participants: vec![EntityId(1), EntityId(2)],
            })
        );
    }

    #[test]
    fn turn_events_follow_the_documented_order() {
        let (mut scheduler, channel) = scheduler_with_seed(7);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);

        scheduler.initialize_encounter(&roster(&[&a, &b]));

        assert_eq!(
            channel.kinds(),
            vec![
                "encounter_started",
                "round_started",
                "queue_rebuilt",
                "turn_passed",
                "turn_started",
                "turn_ready",
            ]
        );
    }

    #[test]
    fn fixed_seed_reproduces_turn_order() {
        let build = || {
            let (mut scheduler, channel) = scheduler_with_seed(99);
            let a = TestCombatant::new(1, Some("players"), 10);
            let b = TestCombatant::new(2, Some("goblins"), 10);
            let c = TestCombatant::new(3, Some("goblins"), 10);
            scheduler.initialize_encounter(&roster(&[&a, &b, &c]));
            rebuilt_queues(&channel).remove(0).1
        };

        let first = build();
        let second = build();

        let order = |queue: &[TurnEntry]| -> Vec<(EntityId, i32)> {
            queue
                .iter()
                .map(|entry| (entry.entity_id, entry.initiative))
                .collect()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn queue_is_sorted_descending_with_roster_order_ties() {
        let (mut scheduler, channel) = scheduler_with_seed(5);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);
        let c = TestCombatant::new(3, Some("goblins"), 10);

        scheduler.initialize_encounter(&roster(&[&a, &b, &c]));

        let (_, queue) = rebuilt_queues(&channel).remove(0);
        for pair in queue.windows(2) {
            assert!(pair[0].initiative >= pair[1].initiative);
            if pair[0].initiative == pair[1].initiative {
                let state = scheduler.state().unwrap();
                assert!(
                    state.roster_index(pair[0].entity_id) < state.roster_index(pair[1].entity_id)
                );
            }
        }
    }

    #[test]
    fn turn_and_round_counters_are_monotonic() {
        let (mut scheduler, channel) = scheduler_with_seed(11);
        let a = TestCombatant::new(1, Some("players"), 100);
        let b = TestCombatant::new(2, Some("goblins"), 100);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        for _ in 0..6 {
            scheduler.complete_turn(None, None);
        }

        let turns: Vec<u64> = channel
            .events()
            .into_iter()
            .filter_map(|event| match event {
                EncounterEvent::TurnPassed { turn_number } => Some(turn_number),
                _ => None,
            })
            .collect();
        assert_eq!(turns, vec![1, 2, 3, 4, 5, 6, 7]);

        let rounds: Vec<u32> = channel
            .events()
            .into_iter()
            .filter_map(|event| match event {
                EncounterEvent::RoundStarted { round } => Some(round),
                _ => None,
            })
            .collect();
        assert_eq!(rounds, vec![1, 2, 3, 4]);
    }

    #[test]
    fn exhausted_queue_triggers_exactly_one_rebuild() {
        let (mut scheduler, channel) = scheduler_with_seed(3);
        let a = TestCombatant::new(1, Some("players"), 100);
        let b = TestCombatant::new(2, Some("goblins"), 100);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        assert_eq!(scheduler.state().unwrap().round_counter, 1);

        // Second turn of round 1 comes straight from the queue.
        scheduler.complete_turn(None, None);
        assert_eq!(scheduler.state().unwrap().round_counter, 1);

        // Queue is now empty; the next advance rolls round 2 exactly once.
        scheduler.complete_turn(None, None);
        assert_eq!(scheduler.state().unwrap().round_counter, 2);
        assert_eq!(rebuilt_queues(&channel).len(), 2);
    }

    #[test]
    fn stale_resolution_is_ignored() {
        let (mut scheduler, channel) = scheduler_with_seed(13);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        let active = scheduler.state().unwrap().active_entity.unwrap();
        let stale = if active == EntityId(1) {
            EntityId(2)
        } else {
            EntityId(1)
        };
        let turn_before = scheduler.state().unwrap().turn_number;
        channel.clear();

        scheduler.complete_turn(Some(stale), None);

        assert!(channel.events().is_empty());
        let state = scheduler.state().unwrap();
        assert_eq!(state.active_entity, Some(active));
        assert_eq!(state.turn_number, turn_before);
        assert_eq!(state.phase, EncounterPhase::AwaitingAction);
    }

    #[test]
    fn resolution_without_entity_is_accepted() {
        let (mut scheduler, channel) = scheduler_with_seed(17);
        let a = TestCombatant::new(1, Some("players"), 100);
        let b = TestCombatant::new(2, Some("goblins"), 100);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        let active = scheduler.state().unwrap().active_entity.unwrap();
        channel.clear();

        let mut results = ActionResults::new();
        results.insert("action".to_string(), serde_json::json!("wait"));
        scheduler.complete_turn(None, Some(results.clone()));

        let completed = channel
            .events()
            .into_iter()
            .find_map(|event| match event {
                EncounterEvent::TurnCompleted {
                    entity_id, results, ..
                } => Some((entity_id, results)),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed.0, active);
        assert_eq!(completed.1, Some(results));
    }

    #[test]
    fn resolution_while_idle_is_ignored() {
        let (mut scheduler, channel) = scheduler_with_seed(19);

        scheduler.complete_turn(Some(EntityId(1)), None);

        assert!(channel.events().is_empty());
    }

    #[test]
    fn victory_when_enemy_side_is_down() {
        let (mut scheduler, channel) = scheduler_with_seed(23);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 0);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        scheduler.complete_turn(None, None);

        let report = channel
            .events()
            .into_iter()
            .find_map(|event| match event {
                EncounterEvent::EncounterEnded(report) => Some(report),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.outcome, EncounterOutcome::Victory);
        assert_eq!(report.winning_team, Some(FactionTag::players()));

        let state = scheduler.state().unwrap();
        assert_eq!(state.phase, EncounterPhase::Ended);
        assert_eq!(state.active_entity, None);
        assert!(state.turn_queue.is_empty());
    }

    #[test]
    fn defeat_when_player_side_is_down() {
        let (mut scheduler, channel) = scheduler_with_seed(29);
        let a = TestCombatant::new(1, Some("players"), 0);
        let b = TestCombatant::new(2, Some("goblins"), 5);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        scheduler.complete_turn(None, None);

        let report = channel
            .events()
            .into_iter()
            .find_map(|event| match event {
                EncounterEvent::EncounterEnded(report) => Some(report),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.outcome, EncounterOutcome::Defeat);
        assert_eq!(report.winning_team, Some(FactionTag::new("goblins")));
    }

    #[test]
    fn mutual_annihilation_reads_as_defeat() {
        let (mut scheduler, channel) = scheduler_with_seed(31);
        let a = TestCombatant::new(1, Some("players"), 0);
        let b = TestCombatant::new(2, Some("goblins"), 0);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        scheduler.complete_turn(None, None);

        let report = channel
            .events()
            .into_iter()
            .find_map(|event| match event {
                EncounterEvent::EncounterEnded(report) => Some(report),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.outcome, EncounterOutcome::Defeat);
        assert_eq!(report.winning_team, None);
    }

    #[test]
    fn unaligned_participants_count_toward_neither_side() {
        let (mut scheduler, channel) = scheduler_with_seed(37);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 0);
        let c = TestCombatant::new(3, None, 10);

        scheduler.initialize_encounter(&roster(&[&a, &b, &c]));
        scheduler.complete_turn(None, None);

        let report = channel
            .events()
            .into_iter()
            .find_map(|event| match event {
                EncounterEvent::EncounterEnded(report) => Some(report),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.outcome, EncounterOutcome::Victory);
    }

    #[test]
    fn modifier_feeds_limited_rebuilds_then_expires() {
        let (mut scheduler, channel) = scheduler_with_seed(41);
        let a = TestCombatant::new(1, Some("players"), 100);
        let b = TestCombatant::new(2, Some("goblins"), 100);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        scheduler.apply_initiative_modifier(EntityId(2), 15, ModifierDuration::Rounds(2), "buff");

        let modified = channel
            .events()
            .into_iter()
            .find_map(|event| match event {
                EncounterEvent::InitiativeModified {
                    entity_id,
                    delta,
                    remaining_rounds,
                    ..
                } => Some((entity_id, delta, remaining_rounds)),
                _ => None,
            })
            .unwrap();
        assert_eq!(modified, (EntityId(2), 15, Some(2)));

        for _ in 0..3 {
            scheduler.force_rebuild_queue(false);
        }

        let deltas: Vec<i32> = rebuilt_queues(&channel)
            .into_iter()
            .skip(1)
            .map(|(_, queue)| {
                queue
                    .iter()
                    .find(|entry| entry.entity_id == EntityId(2))
                    .unwrap()
                    .breakdown
                    .modifier_delta
            })
            .collect();
        assert_eq!(deltas, vec![15, 15, 0]);
    }

    #[test]
    fn force_rebuild_twice_bumps_round_twice() {
        let (mut scheduler, channel) = scheduler_with_seed(43);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        assert_eq!(scheduler.state().unwrap().round_counter, 1);

        scheduler.force_rebuild_queue(false);
        scheduler.force_rebuild_queue(false);

        assert_eq!(scheduler.state().unwrap().round_counter, 3);
        assert_eq!(rebuilt_queues(&channel).len(), 3);
    }

    #[test]
    fn stored_initiative_carries_into_the_next_round() {
        let (mut scheduler, channel) = scheduler_with_seed(47);
        let a = TestCombatant::new(1, Some("players"), 10);

        scheduler.initialize_encounter(&roster(&[&a]));
        scheduler.force_rebuild_queue(false);

        let rebuilds = rebuilt_queues(&channel);
        let first_total = rebuilds[0].1[0].initiative;
        let second = &rebuilds[1].1[0];
        assert_eq!(second.breakdown.base_initiative, first_total);
        assert_eq!(
            second.initiative,
            second.breakdown.roll + first_total + second.breakdown.modifier_delta
        );
    }

    #[test]
    fn unresolvable_participants_stay_off_the_queue() {
        let (mut scheduler, channel) = scheduler_with_seed(53);
        let a = TestCombatant::new(1, Some("players"), 10);
        let broken = TestCombatant::without_runtime(2);

        scheduler.initialize_encounter(&roster(&[&a, &broken]));

        let state = scheduler.state().unwrap();
        assert_eq!(state.participants, vec![EntityId(1), EntityId(2)]);
        assert!(state.runtime_entry(EntityId(2)).is_none());

        let (_, queue) = rebuilt_queues(&channel).remove(0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].entity_id, EntityId(1));
    }

    #[test]
    fn initialize_with_no_resolvable_participants_stays_idle() {
        let (mut scheduler, channel) = scheduler_with_seed(59);
        let broken_a = TestCombatant::without_sheet(1);
        let broken_b = TestCombatant::without_runtime(2);

        scheduler.initialize_encounter(&roster(&[&broken_a, &broken_b]));

        assert!(channel.events().is_empty());
        assert_eq!(scheduler.state().unwrap().phase, EncounterPhase::Idle);
        assert_eq!(scheduler.state().unwrap().round_counter, 0);
    }

    #[test]
    fn injected_participants_roll_from_the_next_rebuild() {
        let (mut scheduler, channel) = scheduler_with_seed(61);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);
        let c = TestCombatant::new(3, Some("goblins"), 10);

        scheduler.initialize_encounter(&roster(&[&a, &b]));
        let active = scheduler.state().unwrap().active_entity;
        channel.clear();

        scheduler.inject_participants(&roster(&[&c]), true);

        let state = scheduler.state().unwrap();
        assert_eq!(
            state.participants,
            vec![EntityId(1), EntityId(2), EntityId(3)]
        );
        // The in-flight turn is untouched; no new turn was announced.
        assert_eq!(state.active_entity, active);
        assert_eq!(state.phase, EncounterPhase::AwaitingAction);
        assert!(!channel.kinds().contains(&"turn_ready"));

        let rebuilds = rebuilt_queues(&channel);
        assert_eq!(rebuilds.len(), 1);
        assert_eq!(rebuilds[0].0, 2);
        assert!(
            rebuilds[0]
                .1
                .iter()
                .any(|entry| entry.entity_id == EntityId(3))
        );
    }

    #[test]
    fn reinitialize_discards_the_awaiting_turn() {
        let (mut scheduler, channel) = scheduler_with_seed(67);
        let a = TestCombatant::new(1, Some("players"), 10);
        let b = TestCombatant::new(2, Some("goblins"), 10);
        let members = roster(&[&a, &b]);

        scheduler.initialize_encounter(&members);
        scheduler.complete_turn(None, None);
        assert_eq!(scheduler.state().unwrap().turn_number, 2);
        channel.clear();

        scheduler.initialize_encounter(&members);

        let state = scheduler.state().unwrap();
        assert_eq!(state.round_counter, 1);
        assert_eq!(state.turn_number, 1);
        assert_eq!(state.phase, EncounterPhase::AwaitingAction);
        assert_eq!(channel.kinds().first(), Some(&"encounter_started"));
    }

    #[test]
    fn operations_without_state_are_noops() {
        let channel = RecordingChannel::default();
        let mut scheduler = Scheduler::new(channel.clone(), InitiativeDice::from_seed(71));
        let a = TestCombatant::new(1, Some("players"), 10);

        scheduler.initialize_encounter(&roster(&[&a]));
        scheduler.complete_turn(None, None);
        scheduler.apply_initiative_modifier(EntityId(1), 5, ModifierDuration::Infinite, "buff");
        scheduler.inject_participants(&roster(&[&a]), true);
        scheduler.force_rebuild_queue(true);

        assert!(channel.events().is_empty());
        assert!(scheduler.snapshot().is_none());
    }

    #[test]
    fn modifier_for_unknown_participant_is_rejected() {
        let (mut scheduler, channel) = scheduler_with_seed(73);
        let a = TestCombatant::new(1, Some("players"), 10);

        scheduler.initialize_encounter(&roster(&[&a]));
        channel.clear();

        scheduler.apply_initiative_modifier(EntityId(9), 5, ModifierDuration::Infinite, "buff");

        assert!(channel.events().is_empty());
    }

    #[test]
    fn turn_start_refreshes_the_actors_resources() {
        let (mut scheduler, _channel) = scheduler_with_seed(79);
        let a = TestCombatant::new(1, Some("players"), 10);

        scheduler.initialize_encounter(&roster(&[&a]));

        // Once at preparation, once when the first turn started.
        let sheet = a.sheet.as_ref().unwrap();
        assert_eq!(sheet.refreshes.load(Ordering::SeqCst), 2);
    }
}
