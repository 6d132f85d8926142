//! Trial runner: fresh combatants, one encounter, a per-combatant report.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::combat::{Encounter, EncounterOptions, Outcome, DEFAULT_ROUND_CAP, DEFAULT_TOP_ACTION_BIAS};
use crate::combatant::{CombatantState, Metrics};
use crate::content::RecordStore;
use crate::life::Vitality;
use crate::model::{CombatantDefinition, Team};
use crate::Dice;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOptions {
    pub seed: u64,
    pub round_cap: u32,
    pub top_action_bias: f64,
    /// Build the narrated log. Off for everything but the sample trial.
    pub narrate: bool,
}

impl Default for TrialOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            round_cap: DEFAULT_ROUND_CAP,
            top_action_bias: DEFAULT_TOP_ACTION_BIAS,
            narrate: false,
        }
    }
}

impl TrialOptions {
    fn encounter(&self) -> EncounterOptions {
        EncounterOptions {
            round_cap: self.round_cap,
            top_action_bias: self.top_action_bias,
        }
    }
}

/// End-of-trial snapshot of one roster slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantReport {
    pub label: String,
    pub id: u32,
    pub team: Team,
    pub max_hp: i32,
    pub hp_remaining: i32,
    pub vitality: Vitality,
    /// Still above 0 HP when the trial ended.
    pub survived: bool,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub outcome: Outcome,
    pub won: bool,
    pub rounds: u32,
    /// Roster order: PCs then monsters.
    pub combatants: Vec<CombatantReport>,
    pub log: Vec<String>,
}

/// Instantiate both sides in roster order. Repeated definitions are labelled
/// `Name`, `Name #2`, `Name #3`, ...
///
/// The side a definition is listed on decides its team.
pub fn build_combatants(
    pcs: &[Arc<CombatantDefinition>],
    monsters: &[Arc<CombatantDefinition>],
    store: &RecordStore,
) -> Vec<CombatantState> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let sides = pcs
        .iter()
        .map(|def| (def, Team::Pc))
        .chain(monsters.iter().map(|def| (def, Team::Monster)));
    sides
        .map(|(def, team)| {
            let count = seen.entry(def.name.as_str()).or_insert(0);
            *count += 1;
            let label = if *count == 1 {
                def.name.clone()
            } else {
                format!("{} #{}", def.name, count)
            };
            let actions = store.get_actions(&def.actions);
            let definition = if def.team == team {
                Arc::clone(def)
            } else {
                Arc::new(CombatantDefinition {
                    team,
                    ..CombatantDefinition::clone(def)
                })
            };
            CombatantState::new(definition, actions, label)
        })
        .collect()
}

/// Play one complete encounter with its own seeded dice.
pub fn run_trial(
    pcs: &[Arc<CombatantDefinition>],
    monsters: &[Arc<CombatantDefinition>],
    store: &RecordStore,
    options: &TrialOptions,
) -> TrialResult {
    let combatants = build_combatants(pcs, monsters, store);
    run_with_dice(combatants, Dice::from_seed(options.seed), options)
}

/// Play one encounter over prepared combatants and an explicit random source.
pub fn run_with_dice(
    combatants: Vec<CombatantState>,
    dice: Dice,
    options: &TrialOptions,
) -> TrialResult {
    let mut encounter = Encounter::new(combatants, dice, options.encounter(), options.narrate);
    let outcome = encounter.run();
    let rounds = encounter.round();
    let (combatants, log) = encounter.into_parts();
    tracing::trace!(seed = options.seed, ?outcome, rounds, "trial finished");

    TrialResult {
        outcome,
        won: outcome == Outcome::Victory,
        rounds,
        combatants: combatants.iter().map(report).collect(),
        log,
    }
}

fn report(state: &CombatantState) -> CombatantReport {
    CombatantReport {
        label: state.name.to_string(),
        id: state.definition.id,
        team: state.team(),
        max_hp: state.health.max_hp,
        hp_remaining: state.health.hp,
        vitality: state.health.state,
        survived: state.is_up(),
        metrics: state.metrics,
    }
}
