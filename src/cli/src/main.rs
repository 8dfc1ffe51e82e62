#![warn(clippy::pedantic)]

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, eyre};
use env_logger::TimestampPrecision;
use ksolve::{
    KSolve,
    puzzles::{KPUZZLE_2X2, KPUZZLE_3X3},
};
use log::{LevelFilter, info, warn};
use serde::Deserialize;
use twist_search::{
    DefinitionOptions, ExactTable, Metric, PruneTableOptions, PuzzleDef, SearchOutcome, Solver,
    SolverConfig,
};

/// Optimally solves twisty puzzles with a parallel IDA* search
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The configuration file to use, in TOML format.
    #[arg(long, short = 'c', value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (can be repeated)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find an optimal solution to a scramble
    Solve {
        /// The scramble to solve, e.g. "R U' F2"
        scramble: String,
        #[arg(long, short, value_enum, default_value_t = Puzzle::Cube3)]
        puzzle: Puzzle,
        /// The metric moves are counted in; overrides the configuration file
        #[arg(long, short, value_enum)]
        metric: Option<MetricArg>,
        /// Load the pruning table from this file instead of generating it
        #[arg(long, short)]
        table: Option<PathBuf>,
        /// Give up after this many seconds
        #[arg(long)]
        time_limit: Option<f64>,
    },
    /// Generate a pruning table and save it
    Table {
        /// Where to write the table
        output: PathBuf,
        #[arg(long, short, value_enum, default_value_t = Puzzle::Cube3)]
        puzzle: Puzzle,
        /// The metric moves are counted in; overrides the configuration file
        #[arg(long, short, value_enum)]
        metric: Option<MetricArg>,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Puzzle {
    #[value(name = "2x2")]
    Cube2,
    #[value(name = "3x3")]
    Cube3,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum MetricArg {
    Htm,
    Qtm,
}

/// Global configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TwistConfig {
    metric: Metric,
    /// Restrict the puzzle to these base moves.
    generators: Option<Vec<String>>,
    solver: SolverConfig,
}

impl Puzzle {
    fn ksolve(self) -> &'static KSolve {
        match self {
            Puzzle::Cube2 => &KPUZZLE_2X2,
            Puzzle::Cube3 => &KPUZZLE_3X3,
        }
    }
}

impl From<MetricArg> for Metric {
    fn from(metric: MetricArg) -> Self {
        match metric {
            MetricArg::Htm => Metric::Htm,
            MetricArg::Qtm => Metric::Qtm,
        }
    }
}

fn load_config(path: Option<&Path>) -> color_eyre::Result<TwistConfig> {
    let Some(path) = path else {
        return Ok(TwistConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read the configuration file {}", path.display()))?;
    toml::from_str(&text)
        .wrap_err_with(|| format!("Failed to parse the configuration file {}", path.display()))
}

fn puzzle_def(
    puzzle: Puzzle,
    metric: Option<MetricArg>,
    config: &TwistConfig,
) -> color_eyre::Result<PuzzleDef> {
    let options = DefinitionOptions {
        metric: metric.map_or(config.metric, Metric::from),
        generators: config.generators.clone(),
        ..DefinitionOptions::default()
    };
    Ok(PuzzleDef::new(puzzle.ksolve(), &options)?)
}

fn load_or_generate_table(
    puzzle_def: &PuzzleDef,
    options: &PruneTableOptions,
    path: Option<&Path>,
) -> color_eyre::Result<ExactTable> {
    if let Some(path) = path {
        let file = File::open(path)
            .wrap_err_with(|| format!("Failed to open the pruning table {}", path.display()))?;
        return ExactTable::read_from(
            &mut BufReader::new(file),
            puzzle_def,
            options.symmetry_reduction,
        )
        .wrap_err_with(|| format!("Failed to load the pruning table {}", path.display()));
    }
    Ok(ExactTable::generate(puzzle_def, options)?)
}

fn solve(
    config: TwistConfig,
    scramble: &str,
    puzzle: Puzzle,
    metric: Option<MetricArg>,
    table: Option<&Path>,
    time_limit: Option<f64>,
) -> color_eyre::Result<()> {
    let puzzle_def = puzzle_def(puzzle, metric, &config)?;
    let start = puzzle_def.apply_move_list_generously(&puzzle_def.new_solved_state(), scramble)?;

    let mut solver_config = config.solver;
    if let Some(time_limit) = time_limit {
        solver_config = solver_config.with_time_limit_secs(time_limit);
    }
    let pruning_table = load_or_generate_table(&puzzle_def, &solver_config.prune_table, table)?;
    let solver = Solver::new(puzzle_def, pruning_table.into(), solver_config)?;

    match solver.solve(&start)? {
        SearchOutcome::Solved(solution) => {
            info!("Found a solution of cost {}", solution.cost);
            println!("{}", solution.to_string_with(solver.puzzle_def()));
        }
        SearchOutcome::Unsolvable {
            searched_up_to: Some(searched_up_to),
        } => {
            return Err(eyre!("No solution of cost {searched_up_to} or less exists"));
        }
        SearchOutcome::Unsolvable {
            searched_up_to: None,
        } => {
            return Err(eyre!("The scramble cannot be solved"));
        }
        SearchOutcome::Cancelled => {
            warn!("The search ran out of time");
            return Err(eyre!("Time limit exceeded"));
        }
    }
    Ok(())
}

fn write_table(
    config: &TwistConfig,
    output: &Path,
    puzzle: Puzzle,
    metric: Option<MetricArg>,
) -> color_eyre::Result<()> {
    let puzzle_def = puzzle_def(puzzle, metric, config)?;
    let table = ExactTable::generate(&puzzle_def, &config.solver.prune_table)?;
    let report = table.build_report();
    if report.truncated {
        warn!(
            "The table was truncated to depth {}; consider raising memory_budget_bytes",
            report.effective_depth
        );
    }

    let file = File::create(output)
        .wrap_err_with(|| format!("Failed to create {}", output.display()))?;
    table.write_to(&mut BufWriter::new(file))?;
    eprintln!(
        "Wrote {} entries to depth {} ({} bytes in memory) to {}",
        report.entries,
        report.effective_depth,
        report.memory_bytes,
        output.display()
    );
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Solve {
            scramble,
            puzzle,
            metric,
            table,
            time_limit,
        } => solve(
            config,
            &scramble,
            puzzle,
            metric,
            table.as_deref(),
            time_limit,
        ),
        Commands::Table {
            output,
            puzzle,
            metric,
        } => write_table(&config, &output, puzzle, metric),
    }
}
