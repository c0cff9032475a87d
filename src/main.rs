mod analysis;
mod grid;
mod heuristic;
mod hungarian;
mod level;
mod levels;
mod pqueue;
mod solver;
mod state;
mod zobrist;

use anyhow::{Context, Result};
use clap::Parser;
use heuristic::{Heuristic, HungarianHeuristic, SimpleHeuristic};
use level::Level;
use levels::Levels;
use solver::{SolveResult, Solver, SolverOpts};
use state::{PushMove, State};
use std::rc::Rc;
use std::str::FromStr;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "boulder")]
#[command(about = "A Sokoban solver", long_about = None)]
struct Args {
    /// Path to the levels file
    #[arg(value_name = "FILE")]
    levels_file: String,

    /// Use the Hungarian matching heuristic instead of the simple sum
    #[arg(long)]
    hungarian: bool,

    /// Maximum number of distinct states to visit per level
    #[arg(long, default_value_t = solver::DEFAULT_MAX_SEARCH)]
    max_search: usize,

    /// Replay each solution board by board
    #[arg(short, long)]
    print_solution: bool,

    /// Increase verbosity (-v = warn, -vv = info, -vvv = debug, -vvvv = trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbosity: u8) {
    let verbosity = verbosity.saturating_add(1).clamp(0, 5);
    let level = tracing::Level::from_str(verbosity.to_string().as_str()).unwrap();
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

struct LevelReport {
    solved: bool,
    pushes: usize,
    expanded: usize,
    elapsed_ms: u128,
}

fn format_moves(path: &[PushMove]) -> String {
    path.iter()
        .map(|mv| mv.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_replay<H: Heuristic>(level: &Rc<Level>, heuristic: &H, path: &[PushMove]) {
    let Some(mut state) = State::initial(level.clone(), heuristic) else {
        return;
    };
    println!("\nStarting position:\n{}", state);
    for (i, &mv) in path.iter().enumerate() {
        match state.try_push(mv, heuristic) {
            Some(next) => state = next,
            None => return,
        }
        println!("Push {} ({}/{}):\n{}", mv, i + 1, path.len(), state);
    }
}

fn run_level<H: Heuristic>(
    level: &Rc<Level>,
    make_heuristic: impl Fn(Rc<Level>) -> H,
    opts: SolverOpts,
    print_solution: bool,
) -> LevelReport {
    let mut solver = Solver::new(level.clone(), make_heuristic(level.clone()), opts);
    let start = Instant::now();
    let result = solver.solve();
    let elapsed_ms = start.elapsed().as_millis();
    let expanded = solver.expanded();

    let (solved, pushes) = match &result {
        SolveResult::Solved(path) => (true, path.len()),
        SolveResult::Cutoff | SolveResult::Unsolvable => (false, 0),
    };

    let status = match &result {
        SolveResult::Solved(_) => "solved",
        SolveResult::Cutoff => "skipped (budget)",
        SolveResult::Unsolvable => "skipped (no solution)",
    };
    println!(
        "level: {:<24} {:<20} pushes: {:<4} states: {:<8} elapsed: {} ms",
        level.name(),
        status,
        pushes,
        expanded,
        elapsed_ms
    );

    if let SolveResult::Solved(path) = &result {
        if !path.is_empty() {
            println!("  moves: {}", format_moves(path));
        }
        if print_solution {
            print_replay(level, &make_heuristic(level.clone()), path);
        }
    }

    LevelReport {
        solved,
        pushes,
        expanded,
        elapsed_ms,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let levels = Levels::from_file(&args.levels_file)
        .with_context(|| format!("failed to load levels from {}", args.levels_file))?;
    info!(count = levels.len(), "levels loaded");

    let opts = SolverOpts {
        max_search: args.max_search,
    };

    let mut solved_count = 0;
    let mut skipped: Vec<String> = Vec::new();
    let mut total_pushes = 0;
    let mut total_states = 0;
    let mut total_ms = 0u128;
    let total = levels.len();

    for level in levels.into_levels() {
        let level = Rc::new(level);
        let report = if args.hungarian {
            run_level(&level, HungarianHeuristic::new, opts, args.print_solution)
        } else {
            run_level(&level, SimpleHeuristic::new, opts, args.print_solution)
        };
        if report.solved {
            solved_count += 1;
        } else {
            skipped.push(level.name().to_string());
        }
        total_pushes += report.pushes;
        total_states += report.expanded;
        total_ms += report.elapsed_ms;
    }

    println!("---");
    println!(
        "solved: {:>3}/{:<3}  pushes: {:<5} states: {:<10} elapsed: {} ms",
        solved_count, total, total_pushes, total_states, total_ms
    );
    if !skipped.is_empty() {
        println!("skipped: {}", skipped.join(", "));
    }

    Ok(())
}
