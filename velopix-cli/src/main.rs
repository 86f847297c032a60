//! velopix: reconstruct VELO events and tune reconstruction hyperparameters.
#![allow(clippy::uninlined_format_args)]

mod input;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::info;
use thiserror::Error;
use velopix_algorithms::{reconstruct_events, Algorithm, ReconstructionAlgorithm};
use velopix_core::ParamKind;
use velopix_optim::{
    run_optimization, BaseOptimizer, GridSearch, LocalSearch, Objective, OptimizerConfig,
    PipelineBase, RandomSearch, SearchStrategy,
};

use crate::input::StrategyKind;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Core(#[from] velopix_core::Error),

    #[error("Optimizer error: {0}")]
    Optim(#[from] velopix_optim::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Hyperparameter optimization for pixel-detector track reconstruction.
#[derive(Parser)]
#[command(name = "velopix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (overrides the `info` default; RUST_LOG still applies)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parameter schema of an algorithm
    Schema {
        /// Reconstruction algorithm
        #[arg(short, long)]
        algorithm: Algorithm,
    },

    /// Reconstruct events and print the validation summary
    Reconstruct {
        /// Events JSON file
        events: PathBuf,

        /// Reconstruction algorithm
        #[arg(short, long)]
        algorithm: Algorithm,

        /// Parameter overrides (JSON object)
        #[arg(short, long)]
        params: Option<PathBuf>,
    },

    /// Search the hyperparameter space of an algorithm
    Optimize {
        /// Events JSON file (with ground truth)
        events: PathBuf,

        /// Reconstruction algorithm
        #[arg(short, long)]
        algorithm: Algorithm,

        /// Search configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Search strategy (overrides the config)
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyKind>,

        /// Maximum number of trials
        #[arg(short, long)]
        budget: Option<usize>,

        /// Stop after this many trials without improvement
        #[arg(long)]
        patience: Option<usize>,

        /// Seed for random and local search
        #[arg(long)]
        seed: Option<u64>,

        /// Objective: efficiency, ghost_rate, weighted or weighted:E,G,C
        #[arg(long)]
        objective: Option<Objective>,

        /// Write the optimization result (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Settings of one `optimize` invocation after merging flags and config.
struct OptimizeArgs {
    strategy: Option<StrategyKind>,
    budget: Option<usize>,
    patience: Option<usize>,
    seed: Option<u64>,
    objective: Option<Objective>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Schema { algorithm } => print_schema(algorithm),
        Commands::Reconstruct {
            events,
            algorithm,
            params,
        } => reconstruct(&events, algorithm, params.as_deref()),
        Commands::Optimize {
            events,
            algorithm,
            config,
            strategy,
            budget,
            patience,
            seed,
            objective,
            output,
        } => optimize(
            &events,
            algorithm,
            &config,
            OptimizeArgs {
                strategy,
                budget,
                patience,
                seed,
                objective,
            },
            output.as_deref(),
        ),
    }
}

fn print_schema(algorithm: Algorithm) -> Result<()> {
    let schema = algorithm.schema();
    println!("{} parameters:", schema.algorithm);
    for spec in schema.specs() {
        let kind = match &spec.kind {
            ParamKind::Float { min, max } => format!("float [{min}, {max}]"),
            ParamKind::Int { min, max } => format!("int [{min}, {max}]"),
            ParamKind::Bool => "bool".to_string(),
            ParamKind::Choice(choices) => format!("one of {}", choices.join(" | ")),
        };
        println!(
            "  {:<24} {:<28} default {:<12} {}",
            spec.name,
            kind,
            spec.default.to_string(),
            spec.description
        );
    }
    Ok(())
}

fn reconstruct(events: &Path, algorithm: Algorithm, params: Option<&Path>) -> Result<()> {
    let events = input::load_events(events)?;
    let schema = algorithm.schema();
    let params = match params {
        Some(path) => input::load_params(path, &schema)?,
        None => schema.defaults(),
    };

    let start = Instant::now();
    let mut pipeline = PipelineBase::new(algorithm);
    pipeline.configure(params)?;

    if events.iter().all(velopix_core::Event::has_truth) {
        let report = pipeline.evaluate_events(&events)?;
        info!(
            "{} events reconstructed in {:.2?}",
            events.len(),
            start.elapsed()
        );
        println!("{} on {} events", algorithm, events.len());
        println!("{report}");
    } else {
        let collections = reconstruct_events(&algorithm, &events, pipeline.params())?;
        let tracks: usize = collections.iter().map(velopix_core::TrackCollection::len).sum();
        info!(
            "{} events reconstructed in {:.2?}",
            events.len(),
            start.elapsed()
        );
        println!(
            "{}: {} tracks in {} events (no ground truth, metrics skipped)",
            algorithm,
            tracks,
            events.len()
        );
    }
    Ok(())
}

fn optimize(
    events: &Path,
    algorithm: Algorithm,
    config: &Path,
    args: OptimizeArgs,
    output: Option<&Path>,
) -> Result<()> {
    let events = input::load_events(events)?;
    let search = input::load_search_config(config)?;
    let space = search.search_space(&algorithm.schema())?;

    let strategy_kind = args
        .strategy
        .or(search.strategy)
        .unwrap_or(StrategyKind::Grid);
    let seed = args.seed.or(search.seed).unwrap_or(0);
    let mut optimizer_config = OptimizerConfig::default()
        .with_objective(args.objective.or(search.objective).unwrap_or_default());
    if let Some(budget) = args.budget.or(search.budget) {
        optimizer_config = optimizer_config.with_max_trials(budget);
    }
    if let Some(patience) = args.patience.or(search.patience) {
        optimizer_config = optimizer_config.with_patience(patience);
    }

    let strategy: Box<dyn SearchStrategy> = match strategy_kind {
        StrategyKind::Grid => Box::new(GridSearch::new(space)),
        StrategyKind::Random => Box::new(RandomSearch::new(space, seed)),
        StrategyKind::Local => Box::new(LocalSearch::new(space, seed)),
    };

    let start = Instant::now();
    let mut pipeline = PipelineBase::new(algorithm);
    let mut optimizer = BaseOptimizer::new(strategy, optimizer_config);
    let result = run_optimization(&mut pipeline, &mut optimizer, &events)?;
    info!(
        "{} trials in {:.2?} ({} failed)",
        result.history.len(),
        start.elapsed(),
        result.failures()
    );

    if let Some(reason) = result.termination {
        println!("Terminated: {reason}");
    }
    match (&result.best, result.best_report()) {
        (Some(best), Some(report)) => {
            println!("Best trial #{} (score {:.4})", best.id, best.score);
            println!("Parameters: {}", best.params);
            println!("{report}");
        }
        _ => println!("No trial completed"),
    }

    if let Some(path) = output {
        input::write_result(path, &result)?;
        println!("Result written to {}", path.display());
    }
    Ok(())
}
