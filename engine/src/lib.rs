//! Monte Carlo estimation of tabletop encounter outcomes.
//!
//! The core is [`combat::Encounter`], a turn-by-turn state machine that plays one
//! encounter to Victory, Defeat or Timeout. [`trial::run_trial`] builds fresh
//! combatants and plays a single encounter; [`api::simulate_encounter`] fans
//! trials out over a rayon pool and reduces them into an [`api::AggregateReport`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

pub mod api;
pub mod checks;
pub mod combat;
pub mod combatant;
pub mod conditions;
pub mod content;
pub mod error;
pub mod formula;
pub mod life;
pub mod model;
pub mod parallel;
pub mod stats;
pub mod trial;

pub use api::{
    simulate_encounter, AggregateReport, CombatantAverages, DamageShare, EncounterRequest,
    SimConfig,
};
pub use combat::{Encounter, EncounterOptions, Outcome};
pub use combatant::{CombatantState, Metrics, SpellSlots};
pub use content::RecordStore;
pub use error::SimError;
pub use formula::Formula;
pub use model::{
    Ability, AbilityScores, ActionDefinition, ActionKind, BuffStat, ClassKind,
    CombatantDefinition, Condition, EffectKind, EffectSpec, EffectTarget, Feature, FeatureSet,
    Magnitude, Position, TargetBehavior, Team,
};
pub use trial::{run_trial, CombatantReport, TrialOptions, TrialResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdMode {
    Normal,
    Advantage,
    Disadvantage,
}

#[derive(Debug, Clone)]
enum Source {
    Seeded(ChaCha8Rng),
    /// Replays `values` cyclically; each draw is clamped into the requested range.
    Scripted { values: Vec<i32>, next: usize },
}

/// Per-trial random source. Never shared between trials.
#[derive(Debug, Clone)]
pub struct Dice {
    source: Source,
}

impl Dice {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            source: Source::Seeded(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn from_scripted(values: Vec<i32>) -> Self {
        Self {
            source: Source::Scripted { values, next: 0 },
        }
    }

    /// Uniform integer in `lo..=hi`. A degenerate range returns `lo` without drawing.
    pub fn range(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        match &mut self.source {
            Source::Seeded(rng) => rng.gen_range(lo..=hi),
            Source::Scripted { values, next } => {
                if values.is_empty() {
                    return lo;
                }
                let value = values[*next % values.len()];
                *next += 1;
                value.clamp(lo, hi)
            }
        }
    }

    /// One die with `sides` faces. A zero-sided die rolls 0.
    pub fn die(&mut self, sides: u32) -> u32 {
        if sides == 0 {
            return 0;
        }
        self.range(1, sides.min(i32::MAX as u32) as i32) as u32
    }

    pub fn d20(&mut self, mode: AdMode) -> u8 {
        self.d20_rolls(mode).0
    }

    /// Kept d20 plus every raw die rolled for it.
    pub fn d20_rolls(&mut self, mode: AdMode) -> (u8, Vec<u8>) {
        let first = self.range(1, 20) as u8;
        match mode {
            AdMode::Normal => (first, vec![first]),
            AdMode::Advantage => {
                let second = self.range(1, 20) as u8;
                (first.max(second), vec![first, second])
            }
            AdMode::Disadvantage => {
                let second = self.range(1, 20) as u8;
                (first.min(second), vec![first, second])
            }
        }
    }

    /// Uniform index into a collection of `len` items. Does not draw when `len <= 1`.
    pub fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.range(0, (len - 1).min(i32::MAX as usize) as i32) as usize
    }

    /// True with probability `p`. Certain outcomes do not draw.
    pub fn chance(&mut self, p: f64) -> bool {
        if p >= 1.0 {
            return true;
        }
        if p <= 0.0 {
            return false;
        }
        if let Source::Seeded(rng) = &mut self.source {
            return rng.gen_bool(p);
        }
        f64::from(self.range(1, 100)) <= p * 100.0
    }
}

/* ---------------- typed check API ---------------- */

#[derive(Debug, Clone, Copy)]
pub struct CheckInput {
    pub dc: i32,
    pub modifier: i32,
    pub mode: AdMode,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckResult {
    pub roll: i32,
    pub total: i32,
    pub dc: i32,
    pub passed: bool,
}

/// Roll a d20 (with advantage/disadvantage), add modifier, compare vs DC.
pub fn check(dice: &mut Dice, input: CheckInput) -> CheckResult {
    let roll = dice.d20(input.mode) as i32;
    let total = roll + input.modifier;
    CheckResult {
        roll,
        total,
        dc: input.dc,
        passed: total >= input.dc,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackResult {
    /// The kept d20.
    pub roll: i32,
    pub raw_rolls: Vec<u8>,
    pub total: i32,
    pub ac: i32,
    pub hit: bool,
    pub is_crit: bool,
}

/// Attack roll: a kept natural 20 always hits and crits, anything else hits on `total >= ac`.
pub fn attack(dice: &mut Dice, mode: AdMode, bonus: i32, ac: i32) -> AttackResult {
    let (kept, raw_rolls) = dice.d20_rolls(mode);
    let roll = kept as i32;
    let total = roll + bonus;
    let is_crit = roll == 20;
    AttackResult {
        roll,
        raw_rolls,
        total,
        ac,
        hit: is_crit || total >= ac,
        is_crit,
    }
}

/// D&D ability modifier = floor((score - 10) / 2) for integer scores.
pub fn ability_mod(score: i32) -> i32 {
    // `div_euclid` with positive divisor matches mathematical floor division.
    (score - 10).div_euclid(2)
}

/// Proficiency bonus by character level: +2 at 1-4, +3 at 5-8, and so on.
pub fn proficiency_bonus(level: u8) -> i32 {
    2 + (i32::from(level.max(1)) - 1) / 4
}
