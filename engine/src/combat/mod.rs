//! Turn resolution: one encounter from the first initiative roll to a terminal outcome.

pub mod actions;
pub mod narrator;
pub mod targeting;

use serde::{Deserialize, Serialize};

use crate::combatant::CombatantState;
use crate::conditions::tick_effects;
use crate::life::{process_death_save, DeathSaveOutcome, Vitality};
use crate::model::{Feature, Team};
use crate::{AdMode, Dice};

pub use narrator::Narrator;

pub const DEFAULT_ROUND_CAP: u32 = 100;
pub const DEFAULT_TOP_ACTION_BIAS: f64 = 0.75;
const POWER_ATTACK_AC_THRESHOLD: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Victory,
    Defeat,
    /// Round cap reached with both sides still standing. Not a win.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncounterOptions {
    pub round_cap: u32,
    /// Probability of taking the highest-level candidate action.
    pub top_action_bias: f64,
}

impl Default for EncounterOptions {
    fn default() -> Self {
        Self {
            round_cap: DEFAULT_ROUND_CAP,
            top_action_bias: DEFAULT_TOP_ACTION_BIAS,
        }
    }
}

/// Mutable state of one trial. Owns its combatants and its random source.
///
/// Combatants are indexed by roster position: PCs first, then monsters, each in
/// request order. Initiative ties keep that order.
#[derive(Debug, Clone)]
pub struct Encounter {
    combatants: Vec<CombatantState>,
    dice: Dice,
    narrator: Narrator,
    options: EncounterOptions,
    round: u32,
    next_cast: u64,
}

impl Encounter {
    pub fn new(
        combatants: Vec<CombatantState>,
        dice: Dice,
        options: EncounterOptions,
        narrate: bool,
    ) -> Self {
        Self {
            combatants,
            dice,
            narrator: Narrator::new(narrate),
            options,
            round: 0,
            next_cast: 0,
        }
    }

    pub fn combatants(&self) -> &[CombatantState] {
        &self.combatants
    }

    pub fn combatants_mut(&mut self) -> &mut [CombatantState] {
        &mut self.combatants
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn log(&self) -> &[String] {
        self.narrator.lines()
    }

    pub fn into_parts(self) -> (Vec<CombatantState>, Vec<String>) {
        (self.combatants, self.narrator.into_lines())
    }

    /// Victory or Defeat once one side has nobody above 0 HP.
    pub fn outcome(&self) -> Option<Outcome> {
        let standing = |team: Team| {
            self.combatants
                .iter()
                .any(|c| c.team() == team && c.is_up())
        };
        if !standing(Team::Pc) {
            Some(Outcome::Defeat)
        } else if !standing(Team::Monster) {
            Some(Outcome::Victory)
        } else {
            None
        }
    }

    /// Play rounds until an outcome or the round cap.
    pub fn run(&mut self) -> Outcome {
        loop {
            if let Some(outcome) = self.outcome() {
                self.narrator
                    .say(|| format!("[END] {:?} after {} rounds", outcome, self.round));
                return outcome;
            }
            if self.round >= self.options.round_cap {
                self.narrator
                    .say(|| format!("[END] Timeout after {} rounds", self.round));
                return Outcome::Timeout;
            }
            self.play_round();
        }
    }

    /// One full round: initiative, then each combatant's turn in order.
    /// Stops early as soon as a side is out.
    pub fn play_round(&mut self) {
        self.round += 1;
        let round = self.round;
        self.narrator.say(|| format!("[ROUND] {}", round));

        let order = self.roll_initiative();
        self.update_power_attack();

        for idx in order {
            self.take_turn(idx);
            if self.outcome().is_some() {
                break;
            }
        }
    }

    /// Every non-dead combatant rolls `1d20 + DEX (+5 with Initiative)`.
    /// Returns roster indices sorted by initiative, highest first, ties in roster order.
    pub fn roll_initiative(&mut self) -> Vec<usize> {
        for c in self.combatants.iter_mut().filter(|c| !c.is_dead()) {
            c.initiative = self.dice.d20(AdMode::Normal) as i32 + c.initiative_bonus();
        }
        let mut order: Vec<usize> = (0..self.combatants.len())
            .filter(|&i| !self.combatants[i].is_dead())
            .collect();
        // `sort_by` is stable, which keeps ties in roster order.
        order.sort_by(|&a, &b| {
            self.combatants[b]
                .initiative
                .cmp(&self.combatants[a].initiative)
        });

        let combatants = &self.combatants;
        self.narrator.say(|| {
            let listing = order
                .iter()
                .map(|&i| format!("{} {}", combatants[i].name, combatants[i].initiative))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[INIT] {}", listing)
        });
        order
    }

    /// Great Weapon Master engages when the opposing side's average AC is below 16.
    fn update_power_attack(&mut self) {
        let vs_monsters = average_armor_class(&self.combatants, Team::Monster);
        let vs_pcs = average_armor_class(&self.combatants, Team::Pc);
        for c in self.combatants.iter_mut() {
            if !c.has_feature(Feature::GreatWeaponMaster) {
                continue;
            }
            let average = match c.team().opponent() {
                Team::Monster => vs_monsters,
                Team::Pc => vs_pcs,
            };
            c.power_attack = average.is_some_and(|ac| ac < POWER_ATTACK_AC_THRESHOLD);
        }
    }

    pub fn take_turn(&mut self, idx: usize) {
        if self.combatants[idx].is_dead() {
            return;
        }

        let expired = tick_effects(&mut self.combatants[idx].effects);
        if !expired.is_empty() {
            let name = self.combatants[idx].name.clone();
            for effect in &expired {
                self.narrator
                    .say(|| format!("[COND][{}] {} wears off", name, effect.source));
            }
            self.release_idle_concentration();
        }

        let state = self.combatants[idx].health.state;
        match state {
            Vitality::Downed => {
                let name = self.combatants[idx].name.clone();
                let dice = &mut self.dice;
                let narrator = &mut self.narrator;
                let outcome = process_death_save(
                    &name,
                    &mut self.combatants[idx].health,
                    || dice.d20(AdMode::Normal) as i32,
                    |msg| narrator.push(msg),
                );
                if outcome == Some(DeathSaveOutcome::Died) {
                    self.bury(idx);
                }
                return;
            }
            Vitality::Stable | Vitality::Dead => return,
            Vitality::Alive => {}
        }

        if let Some(condition) = self.combatants[idx].incapacitating_condition() {
            let name = self.combatants[idx].name.clone();
            self.narrator
                .say(|| format!("[TURN][{}] is {:?}; skipping", name, condition));
            return;
        }

        match self.choose_action(idx) {
            Some(action) => self.perform(idx, &action),
            None => {
                let name = self.combatants[idx].name.clone();
                self.narrator
                    .say(|| format!("[TURN][{}] has no usable action", name));
            }
        }
    }

    /// The dead carry no effects, so links others held on them go idle.
    fn bury(&mut self, idx: usize) {
        self.combatants[idx].effects.clear();
        self.release_idle_concentration();
    }

    /// Clear the flag on anyone concentrating on effects that have all expired.
    fn release_idle_concentration(&mut self) {
        for holder in 0..self.combatants.len() {
            if !self.combatants[holder].concentrating {
                continue;
            }
            let sustained = self
                .combatants
                .iter()
                .any(|c| c.effects.iter().any(|e| e.is_linked_to(holder)));
            if !sustained {
                self.combatants[holder].concentrating = false;
            }
        }
    }
}

fn average_armor_class(combatants: &[CombatantState], team: Team) -> Option<f64> {
    let standing: Vec<i32> = combatants
        .iter()
        .filter(|c| c.team() == team && c.is_up())
        .map(|c| c.armor_class())
        .collect();
    if standing.is_empty() {
        return None;
    }
    Some(f64::from(standing.iter().sum::<i32>()) / standing.len() as f64)
}
