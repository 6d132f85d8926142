//! Monte Carlo aggregator: run configuration, roster request, and the
//! aggregate report returned to callers.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::combat::{DEFAULT_ROUND_CAP, DEFAULT_TOP_ACTION_BIAS};
use crate::content::RecordStore;
use crate::error::SimError;
use crate::model::{CombatantDefinition, Team};
use crate::parallel::WorkerPool;
use crate::stats::Tally;
use crate::trial::{build_combatants, run_trial, TrialOptions, TrialResult};

const DEFAULT_ITERATIONS: u64 = 1000;
const DEFAULT_SEED: u64 = 12345;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub iterations: u64,
    /// Trial `i` is seeded with `seed + i` (wrapping).
    pub seed: u64,
    /// Hard ceiling on rounds per trial.
    #[serde(alias = "max_rounds")]
    pub round_cap: u32,
    /// Worker threads; 0 uses every core.
    pub workers: usize,
    pub top_action_bias: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            seed: DEFAULT_SEED,
            round_cap: DEFAULT_ROUND_CAP,
            workers: 0,
            top_action_bias: DEFAULT_TOP_ACTION_BIAS,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.round_cap == 0 {
            return Err(SimError::InvalidConfig("round_cap must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.top_action_bias) {
            return Err(SimError::InvalidConfig(format!(
                "top_action_bias must lie in [0, 1], got {}",
                self.top_action_bias
            )));
        }
        Ok(())
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: SimConfig = serde_yaml::from_str(text).context("invalid config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(text).context("invalid config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load by extension: `.yaml`/`.yml` as YAML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed = if yaml {
            Self::from_yaml_str(&text)
        } else {
            Self::from_json_str(&text)
        };
        parsed.with_context(|| format!("failed to load config: {}", path.display()))
    }

    fn trial_options(&self, index: u64, narrate: bool) -> TrialOptions {
        TrialOptions {
            seed: self.seed.wrapping_add(index),
            round_cap: self.round_cap,
            top_action_bias: self.top_action_bias,
            narrate,
        }
    }
}

/// Two rosters of combatant ids. An id listed k times yields k combatants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRequest {
    pub pcs: Vec<u32>,
    pub monsters: Vec<u32>,
}

impl EncounterRequest {
    pub fn new(pcs: Vec<u32>, monsters: Vec<u32>) -> Self {
        Self { pcs, monsters }
    }
}

/// Per-trial averages for one roster slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantAverages {
    pub label: String,
    pub team: Team,
    pub max_hp: i32,
    pub avg_hp_remaining: f64,
    /// Percent of trials the combatant ended above 0 HP.
    pub survival_rate: f64,
    pub avg_damage_dealt: f64,
    pub avg_damage_taken: f64,
    pub avg_healing_done: f64,
    pub avg_hits: f64,
    pub avg_crits: f64,
    pub avg_misses: f64,
    pub avg_kills: f64,
    pub avg_times_downed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageShare {
    /// Damage dealt summed over every completed trial.
    pub total: u64,
    pub avg_per_trial: f64,
    /// Fraction (0..=1) of all damage dealt by anyone.
    pub share: f64,
}

/// Summary of a Monte Carlo run. Rates are percentages of completed trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub iterations: u64,
    pub completed: u64,
    /// Trials that faulted and were left out of every statistic.
    pub defects: u64,
    pub win_rate: f64,
    pub defeat_rate: f64,
    pub timeout_rate: f64,
    pub avg_rounds: f64,
    pub median_rounds: f64,
    /// PC attack rolls that hit.
    pub hit_rate: f64,
    /// PC attack rolls that were critical hits.
    pub crit_rate: f64,
    pub elapsed_secs: f64,
    pub seed: u64,
    /// Narrated log of trial #0.
    pub sample_log: Vec<String>,
    pub combatants: Vec<CombatantAverages>,
    pub damage_distribution: IndexMap<String, DamageShare>,
}

/// Resolve a roster side. Unknown ids are skipped; nothing left is an error.
fn resolve_side(
    store: &RecordStore,
    ids: &[u32],
    team: Team,
) -> Result<Vec<Arc<CombatantDefinition>>, SimError> {
    let resolved = store.get_combatants(ids);
    if resolved.is_empty() {
        return Err(SimError::EmptyRoster { team });
    }
    Ok(resolved)
}

/// Play `config.iterations` independent trials and reduce them.
///
/// Trial #0 is narrated and its log becomes the report's sample; the rest run
/// on the worker pool. A trial that panics is recorded as a defect.
pub fn simulate_encounter(
    store: &RecordStore,
    request: &EncounterRequest,
    config: &SimConfig,
) -> Result<AggregateReport, SimError> {
    config.validate()?;
    let pcs = resolve_side(store, &request.pcs, Team::Pc)?;
    let monsters = resolve_side(store, &request.monsters, Team::Monster)?;

    let started = Instant::now();
    let template = Tally::new(&build_combatants(&pcs, &monsters, store));

    if config.iterations == 0 {
        tracing::info!(seed = config.seed, "zero iterations requested; nothing to run");
        return Ok(template.into_report(0, config.seed, 0.0, Vec::new()));
    }

    tracing::info!(
        iterations = config.iterations,
        seed = config.seed,
        workers = config.workers,
        pcs = pcs.len(),
        monsters = monsters.len(),
        "starting simulation"
    );

    let play = |index: u64, narrate: bool| -> Option<TrialResult> {
        let options = config.trial_options(index, narrate);
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_trial(&pcs, &monsters, store, &options)
        }));
        match result {
            Ok(trial) => Some(trial),
            Err(_) => {
                tracing::warn!(trial = index, seed = options.seed, "trial panicked; excluded");
                None
            }
        }
    };

    let mut tally = template.clone();
    let sample = play(0, true);
    tally.record(sample.as_ref());
    let sample_log = sample.map(|t| t.log).unwrap_or_default();

    let pool = WorkerPool::with_workers(config.workers);
    let rest = pool.install(|| {
        (1..config.iterations)
            .into_par_iter()
            .map(|i| play(i, false))
            .fold(
                || template.clone(),
                |mut acc, trial| {
                    acc.record(trial.as_ref());
                    acc
                },
            )
            .reduce(|| template.clone(), Tally::merge)
    })?;
    let tally = tally.merge(rest);

    let elapsed = started.elapsed().as_secs_f64();
    let report = tally.into_report(config.iterations, config.seed, elapsed, sample_log);
    tracing::info!(
        completed = report.completed,
        defects = report.defects,
        win_rate = report.win_rate,
        avg_rounds = report.avg_rounds,
        elapsed_secs = elapsed,
        "simulation finished"
    );
    Ok(report)
}
