//! Demo skirmish binary.
//!
//! Assembles a small two-faction roster, runs one encounter to completion
//! with strike providers on both sides, and prints the event stream as the
//! scheduler publishes it. Tracing goes to stderr so stdout stays a clean
//! play-by-play.
//!
//! Configuration comes from the environment:
//!
//! - `ENCOUNTER_SEED`: initiative seed; `0` (the default) rolls from OS
//!   entropy, any other value replays the same encounter every run
//! - `ENCOUNTER_MAX_TURNS`: turn budget before the run is abandoned

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use encounter_core::{
    CharacterSheet, EncounterEvent, EntityId, InitiativeDice, ModifierDuration,
};
use runtime::{CombatantSpec, PartyRoster, Runtime, StrikeProvider};

/// Demo settings, read from the environment.
struct DemoConfig {
    seed: u64,
    max_turns: u64,
}

impl DemoConfig {
    fn from_env() -> Self {
        Self {
            seed: env_or("ENCOUNTER_SEED", InitiativeDice::UNSEEDED),
            max_turns: env_or("ENCOUNTER_MAX_TURNS", 200),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    setup_logging();

    let config = DemoConfig::from_env();
    tracing::info!(
        seed = config.seed,
        max_turns = config.max_turns,
        "starting demo skirmish"
    );

    let roster = Arc::new(demo_roster());

    let mut rt = Runtime::builder()
        .initiative_seed(config.seed)
        .players_provider(StrikeProvider::new(roster.clone()))
        .opponents_provider(StrikeProvider::new(roster.clone()))
        .build()
        .await;

    let printer = spawn_event_printer(rt.subscribe_events(), roster.clone());

    rt.start_encounter(roster.combatants())
        .await
        .context("encounter failed to start")?;

    // The scout set up an ambush; the bonus lands on the next re-roll.
    rt.handle()
        .apply_modifier(EntityId(2), 20, ModifierDuration::Rounds(1), "ambush")
        .await
        .context("ambush modifier was not applied")?;

    rt.run_until_complete(config.max_turns)
        .await
        .context("encounter did not reach an outcome")?;

    printer.await?;
    rt.shutdown().await?;

    tracing::info!("demo skirmish complete");
    Ok(())
}

/// Route tracing to stderr; the event play-by-play owns stdout.
fn setup_logging() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

/// Two adventurers against a three-strong warband. Close enough in damage
/// output that initiative order decides who collapses first.
fn demo_roster() -> PartyRoster {
    PartyRoster::from_specs(&[
        CombatantSpec {
            id: 1,
            name: "aldric".to_string(),
            faction: Some("players".to_string()),
            health: 34,
            initiative_bonus: 2,
            attack_power: 8,
        },
        CombatantSpec {
            id: 2,
            name: "mira".to_string(),
            faction: Some("players".to_string()),
            health: 26,
            initiative_bonus: 5,
            attack_power: 7,
        },
        CombatantSpec {
            id: 3,
            name: "snag".to_string(),
            faction: Some("warband".to_string()),
            health: 16,
            initiative_bonus: 1,
            attack_power: 4,
        },
        CombatantSpec {
            id: 4,
            name: "grizzle".to_string(),
            faction: Some("warband".to_string()),
            health: 18,
            initiative_bonus: 0,
            attack_power: 4,
        },
        CombatantSpec {
            id: 5,
            name: "korg".to_string(),
            faction: Some("warband".to_string()),
            health: 26,
            initiative_bonus: 3,
            attack_power: 6,
        },
    ])
}

/// Consume the event stream until the encounter ends, printing as we go.
fn spawn_event_printer(
    mut events: broadcast::Receiver<EncounterEvent>,
    roster: Arc<PartyRoster>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let ended = matches!(event, EncounterEvent::EncounterEnded(_));
                    print_event(&roster, &event);
                    if ended {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer fell behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(roster: &PartyRoster, event: &EncounterEvent) {
    match event {
        EncounterEvent::EncounterStarted { participants } => {
            println!(
                "encounter begins: {} combatants take the field",
                participants.len()
            );
        }
        EncounterEvent::RoundStarted { round } => {
            println!();
            println!("=== round {round} ===");
        }
        EncounterEvent::QueueRebuilt { queue, .. } => {
            let order: Vec<String> = queue
                .iter()
                .map(|entry| format!("{} ({})", name_of(roster, entry.entity_id), entry.initiative))
                .collect();
            println!("initiative order: {}", order.join(", "));
        }
        EncounterEvent::TurnStarted(cue) => {
            println!(
                "> {} steps up (initiative {})",
                name_of(roster, cue.entity_id),
                cue.initiative
            );
        }
        // The ready cue and the raw turn tick duplicate what we already show.
        EncounterEvent::TurnPassed { .. } | EncounterEvent::TurnReady(_) => {}
        EncounterEvent::TurnCompleted {
            entity_id, results, ..
        } => {
            let actor = name_of(roster, *entity_id);
            match results {
                Some(results) => {
                    let detail: Vec<String> = results
                        .iter()
                        .map(|(key, value)| format!("{key}={value}"))
                        .collect();
                    println!("  {actor}: {}", detail.join(" "));
                }
                None => println!("  {actor}: done"),
            }
        }
        EncounterEvent::InitiativeModified {
            entity_id,
            delta,
            source,
            ..
        } => {
            println!(
                "* {} gains {delta:+} initiative ({source})",
                name_of(roster, *entity_id)
            );
        }
        EncounterEvent::EncounterEnded(report) => {
            println!();
            println!(
                "encounter over: {} after {} rounds and {} turns",
                report.outcome, report.summary.round, report.summary.turns
            );
            match &report.winning_team {
                Some(team) => println!("winning side: {team}"),
                None => println!("no side left standing"),
            }
            for member in roster.members() {
                if !member.is_down() {
                    println!(
                        "  {} still standing with {} health",
                        member.name(),
                        member.sheet().health()
                    );
                }
            }
        }
    }
}

fn name_of(roster: &PartyRoster, entity: EntityId) -> String {
    roster
        .find(entity)
        .map(|member| member.name().to_string())
        .unwrap_or_else(|| entity.to_string())
}
