use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use encoding_rs::Encoding;
use skirmish::content::{builtin_store, CatalogFormat};
use skirmish::{
    run_trial, simulate_encounter, AggregateReport, Dice, EncounterRequest, Formula, RecordStore,
    SimConfig, TrialOptions,
};
use std::{fs, path::Path, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Args, Debug)]
struct EncounterArgs {
    /// Catalog of action and combatant records (JSON or YAML). Defaults to the built-in starter catalog
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Run configuration file (JSON or YAML); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// PC ids, comma separated; repeat an id for several copies
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,4")]
    pcs: Vec<u32>,
    /// Monster ids, comma separated; repeat an id for several copies
    #[arg(long, value_delimiter = ',', default_value = "10,10,11,13")]
    monsters: Vec<u32>,
    /// Number of trials
    #[arg(long)]
    iterations: Option<u64>,
    /// Base RNG seed; trial i uses seed + i
    #[arg(long)]
    seed: Option<u64>,
    /// Round cap per trial
    #[arg(long)]
    max_rounds: Option<u32>,
    /// Worker threads (0 = all cores)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run many trials and print aggregate statistics
    Simulate {
        #[command(flatten)]
        encounter: EncounterArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Print the narrated sample trial
        #[arg(long)]
        show_log: bool,
    },
    /// Run one narrated trial
    Trial {
        #[command(flatten)]
        encounter: EncounterArgs,
    },
    /// Evaluate a dice formula several times
    Roll {
        /// Formula such as "2d6+3"
        formula: String,
        /// RNG seed for determinism
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of rolls
        #[arg(long, default_value_t = 5)]
        rolls: u32,
    },
}

#[derive(Parser, Debug)]
#[command(name = "skirmish")]
#[command(about = "Monte Carlo encounter simulator")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

fn read_text_auto(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if let Some((enc, bom_len)) = Encoding::for_bom(&bytes) {
        let (cow, _, _) = enc.decode(&bytes[bom_len..]);
        Ok(cow.into_owned())
    } else {
        Ok(String::from_utf8(bytes)?)
    }
}

fn is_yaml(path: &Path) -> bool {
    CatalogFormat::from_path(path) == CatalogFormat::Yaml
}

fn load_store(path: Option<&Path>) -> anyhow::Result<RecordStore> {
    match path {
        Some(path) => {
            let text = read_text_auto(path)?;
            RecordStore::parse(&text, CatalogFormat::from_path(path))
                .with_context(|| format!("failed to load catalog: {}", path.display()))
        }
        None => builtin_store("starter"),
    }
    .inspect(|store| {
        tracing::debug!(
            actions = store.action_count(),
            combatants = store.combatant_count(),
            "catalog loaded"
        )
    })
}

fn load_config(args: &EncounterArgs) -> anyhow::Result<SimConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            let text = read_text_auto(path)?;
            let parsed = if is_yaml(path) {
                SimConfig::from_yaml_str(&text)
            } else {
                SimConfig::from_json_str(&text)
            };
            parsed.with_context(|| format!("failed to load config: {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(n) = args.iterations {
        config.iterations = n;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(cap) = args.max_rounds {
        config.round_cap = cap;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn print_report(report: &AggregateReport, show_log: bool) {
    println!(
        "Trials: {} (completed {}, defects {}) seed={} in {:.2}s",
        report.iterations, report.completed, report.defects, report.seed, report.elapsed_secs
    );
    println!(
        "Win: {:.1}%  Defeat: {:.1}%  Timeout: {:.1}%",
        report.win_rate, report.defeat_rate, report.timeout_rate
    );
    println!(
        "Rounds: avg {:.2}  median {:.1}",
        report.avg_rounds, report.median_rounds
    );
    println!(
        "PC attacks: hit {:.1}%  crit {:.1}%",
        report.hit_rate, report.crit_rate
    );
    println!();
    println!(
        "{:<20} {:>4} {:>7} {:>7} {:>8} {:>8} {:>7} {:>6} {:>6}",
        "combatant", "team", "hp", "alive%", "dealt", "taken", "healed", "kills", "downs"
    );
    for c in &report.combatants {
        println!(
            "{:<20} {:>4} {:>7.1} {:>7.1} {:>8.1} {:>8.1} {:>7.1} {:>6.2} {:>6.2}",
            c.label,
            match c.team {
                skirmish::Team::Pc => "PC",
                skirmish::Team::Monster => "MON",
            },
            c.avg_hp_remaining,
            c.survival_rate,
            c.avg_damage_dealt,
            c.avg_damage_taken,
            c.avg_healing_done,
            c.avg_kills,
            c.avg_times_downed
        );
    }
    println!();
    println!("Damage share:");
    for (label, share) in &report.damage_distribution {
        println!(
            "  {:<20} {:>6.1}%  ({:.1}/trial)",
            label,
            share.share * 100.0,
            share.avg_per_trial
        );
    }
    if show_log {
        println!();
        println!("--- sample trial ---");
        for line in &report.sample_log {
            println!("{}", line);
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Simulate {
            encounter,
            json,
            show_log,
        } => {
            let store = load_store(encounter.catalog.as_deref())?;
            let config = load_config(&encounter)?;
            let request = EncounterRequest::new(encounter.pcs, encounter.monsters);
            let report = simulate_encounter(&store, &request, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, show_log);
            }
        }
        Cmd::Trial { encounter } => {
            let store = load_store(encounter.catalog.as_deref())?;
            let config = load_config(&encounter)?;
            let pcs = store.get_combatants(&encounter.pcs);
            let monsters = store.get_combatants(&encounter.monsters);
            if pcs.is_empty() || monsters.is_empty() {
                bail!("both sides need at least one known combatant id");
            }
            let options = TrialOptions {
                seed: config.seed,
                round_cap: config.round_cap,
                top_action_bias: config.top_action_bias,
                narrate: true,
            };
            let result = run_trial(&pcs, &monsters, &store, &options);
            for line in &result.log {
                println!("{}", line);
            }
            println!(
                "Result: {:?} after {} rounds (seed={})",
                result.outcome, result.rounds, config.seed
            );
            for c in &result.combatants {
                println!(
                    "  {:<20} HP {}/{} {:?}",
                    c.label, c.hp_remaining, c.max_hp, c.vitality
                );
            }
        }
        Cmd::Roll {
            formula,
            seed,
            rolls,
        } => {
            let parsed: Formula = formula.parse()?;
            let mut dice = Dice::from_seed(seed);
            for _ in 0..rolls {
                println!("{}", parsed.roll(&mut dice));
            }
            println!(
                "{}: min={} max={} avg={:.2}",
                parsed,
                parsed.min(),
                parsed.max(),
                parsed.average()
            );
        }
    }
    Ok(())
}
