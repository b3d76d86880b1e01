//! Command-line front end: load an element file, run a screening sweep,
//! report the closest approaches.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use cicada::config::EngineConfig;
use cicada::engine::{CancelToken, Engine};
use cicada::error::Result;
use cicada::probability::ConjunctionProbability;

#[derive(Parser)]
#[command(name = "cicada", version, about = "Satellite catalog propagation and conjunction screening")]
struct Args {
    /// TLE element file to load
    elements: PathBuf,

    /// Screening threshold (km); overrides the config file
    #[arg(long)]
    threshold: Option<f64>,

    /// Time offset of the first pass (minutes from element epoch)
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Number of screening passes
    #[arg(long, default_value_t = 1)]
    steps: u32,

    /// Minutes between passes
    #[arg(long, default_value_t = 1.0)]
    step: f64,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record history during the sweep and export it to this file
    #[arg(long)]
    export_history: Option<PathBuf>,

    /// How many of the closest approaches to print
    #[arg(long, default_value_t = 10)]
    top: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.threshold_km = threshold;
    }
    config.validate()?;

    let load_started = Instant::now();
    let mut engine = Engine::load_tle_file(&args.elements, config)?;
    println!(
        "loaded {} objects from {} in {:.1} ms ({} rejected)",
        engine.len(),
        args.elements.display(),
        load_started.elapsed().as_secs_f64() * 1000.0,
        engine.rejected().len()
    );

    if args.export_history.is_some() {
        engine.recorder().start();
    }

    let cancel = CancelToken::new();
    let mut all: Vec<ConjunctionProbability> = Vec::new();

    let sweep_started = Instant::now();
    let summary = engine.sweep(args.start, args.step, args.steps, &cancel, |t, assessed| {
        log::info!("t={t:.1} min: {} conjunction(s)", assessed.len());
        all.extend_from_slice(assessed);
    });
    let elapsed_ms = sweep_started.elapsed().as_secs_f64() * 1000.0;

    println!(
        "{} pass(es) over {} objects in {:.1} ms: {} conjunction(s) within {} km",
        summary.steps_completed,
        engine.len(),
        elapsed_ms,
        summary.conjunctions_found,
        engine.config().threshold_km
    );

    if !all.is_empty() {
        all.sort_by(|a, b| a.miss_distance_km.total_cmp(&b.miss_distance_km));
        println!("\nclosest approaches:");
        for prob in all.iter().take(args.top) {
            println!(
                "  {:>6} <-> {:<6} {:>9.3} km at t={:>7.1} min  dv={:>6.2} km/s  Pc={:.2e}",
                prob.catalog_1,
                prob.catalog_2,
                prob.miss_distance_km,
                prob.tca_minutes,
                prob.relative_speed_km_s,
                prob.collision_probability,
            );
        }
    }

    if let Some(path) = &args.export_history {
        engine.recorder().export_to_file(path)?;
        println!("history written to {}", path.display());
    }

    Ok(())
}
