//! Reduction of trial results into running totals.
//!
//! A [`Tally`] is a commutative sum: trials can be recorded in any order and
//! partial tallies merged in any grouping.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::api::{AggregateReport, CombatantAverages, DamageShare};
use crate::combat::Outcome;
use crate::combatant::{CombatantState, Metrics};
use crate::model::Team;
use crate::trial::TrialResult;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotTally {
    pub label: String,
    pub team: Team,
    pub max_hp: i32,
    pub hp_remaining: i64,
    pub survived: u64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tally {
    pub completed: u64,
    pub defects: u64,
    pub victories: u64,
    pub defeats: u64,
    pub timeouts: u64,
    pub rounds_total: u64,
    /// Trials per round count.
    pub rounds: BTreeMap<u32, u64>,
    /// One entry per roster slot, in roster order.
    pub slots: Vec<SlotTally>,
}

impl Tally {
    /// Empty tally shaped after a freshly built roster.
    pub fn new(roster: &[CombatantState]) -> Self {
        let slots = roster
            .iter()
            .map(|c| SlotTally {
                label: c.name.to_string(),
                team: c.team(),
                max_hp: c.health.max_hp,
                hp_remaining: 0,
                survived: 0,
                metrics: Metrics::default(),
            })
            .collect();
        Self {
            slots,
            ..Self::default()
        }
    }

    /// Add one trial. `None` marks a trial that faulted and is left out of every average.
    pub fn record(&mut self, result: Option<&TrialResult>) {
        let Some(result) = result else {
            self.defects += 1;
            return;
        };
        self.completed += 1;
        match result.outcome {
            Outcome::Victory => self.victories += 1,
            Outcome::Defeat => self.defeats += 1,
            Outcome::Timeout => self.timeouts += 1,
        }
        self.rounds_total += u64::from(result.rounds);
        *self.rounds.entry(result.rounds).or_insert(0) += 1;

        for (slot, report) in self.slots.iter_mut().zip(&result.combatants) {
            slot.hp_remaining += i64::from(report.hp_remaining);
            if report.survived {
                slot.survived += 1;
            }
            slot.metrics += &report.metrics;
        }
    }

    pub fn merge(mut self, other: Tally) -> Tally {
        self.completed += other.completed;
        self.defects += other.defects;
        self.victories += other.victories;
        self.defeats += other.defeats;
        self.timeouts += other.timeouts;
        self.rounds_total += other.rounds_total;
        for (rounds, count) in other.rounds {
            *self.rounds.entry(rounds).or_insert(0) += count;
        }
        for (slot, theirs) in self.slots.iter_mut().zip(&other.slots) {
            slot.hp_remaining += theirs.hp_remaining;
            slot.survived += theirs.survived;
            slot.metrics += &theirs.metrics;
        }
        self
    }

    /// Median round count; the mean of the two middle trials when the count is even.
    pub fn median_rounds(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        let lower = self.nth_rounds((self.completed - 1) / 2);
        let upper = self.nth_rounds(self.completed / 2);
        (f64::from(lower) + f64::from(upper)) / 2.0
    }

    /// Round count of the `n`th trial (0-based) in sorted order.
    fn nth_rounds(&self, n: u64) -> u32 {
        let mut seen = 0;
        for (&rounds, &count) in &self.rounds {
            seen += count;
            if seen > n {
                return rounds;
            }
        }
        0
    }

    pub fn into_report(
        self,
        iterations: u64,
        seed: u64,
        elapsed_secs: f64,
        sample_log: Vec<String>,
    ) -> AggregateReport {
        let n = self.completed;
        let per_trial = |total: u64| ratio(total, n);
        let percent = |count: u64| ratio(count, n) * 100.0;

        let pc_metrics = self
            .slots
            .iter()
            .filter(|s| s.team == Team::Pc)
            .fold(Metrics::default(), |mut acc, s| {
                acc += &s.metrics;
                acc
            });
        let swings = pc_metrics.hits + pc_metrics.misses;

        let total_damage: u64 = self.slots.iter().map(|s| s.metrics.damage_dealt).sum();
        let mut damage_distribution = IndexMap::with_capacity(self.slots.len());
        for slot in &self.slots {
            damage_distribution.insert(
                slot.label.clone(),
                DamageShare {
                    total: slot.metrics.damage_dealt,
                    avg_per_trial: per_trial(slot.metrics.damage_dealt),
                    share: ratio(slot.metrics.damage_dealt, total_damage),
                },
            );
        }

        let combatants = self
            .slots
            .iter()
            .map(|s| CombatantAverages {
                label: s.label.clone(),
                team: s.team,
                max_hp: s.max_hp,
                avg_hp_remaining: if n == 0 { 0.0 } else { s.hp_remaining as f64 / n as f64 },
                survival_rate: percent(s.survived),
                avg_damage_dealt: per_trial(s.metrics.damage_dealt),
                avg_damage_taken: per_trial(s.metrics.damage_taken),
                avg_healing_done: per_trial(s.metrics.healing_done),
                avg_hits: per_trial(s.metrics.hits),
                avg_crits: per_trial(s.metrics.crits),
                avg_misses: per_trial(s.metrics.misses),
                avg_kills: per_trial(s.metrics.kills),
                avg_times_downed: per_trial(s.metrics.times_downed),
            })
            .collect();

        AggregateReport {
            iterations,
            completed: n,
            defects: self.defects,
            win_rate: percent(self.victories),
            defeat_rate: percent(self.defeats),
            timeout_rate: percent(self.timeouts),
            avg_rounds: per_trial(self.rounds_total),
            median_rounds: self.median_rounds(),
            hit_rate: ratio(pc_metrics.hits, swings) * 100.0,
            crit_rate: ratio(pc_metrics.crits, swings) * 100.0,
            elapsed_secs,
            seed,
            sample_log,
            combatants,
            damage_distribution,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
