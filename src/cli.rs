use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gto_engine::equilibrium::PlayerPair;
use gto_engine::strategy::{blend, ResolutionMethod};
use gto_engine::{
    DeviationRequest, EngineConfig, GtoError, GtoResult, PayoffMatrix, ServingEngine, Strategy,
    StrategyQuery,
};

use crate::display::{
    deviation_report, headsup_report, multiway_report, print_error, print_section, query_report,
    stats_table, strategy_table,
};

#[derive(Parser)]
#[command(
    name = "gto-engine",
    version = "1.0.0",
    about = "Strategy computation engine: equilibrium solves, exploitative deviations and cached strategy queries."
)]
struct Cli {
    /// Engine configuration (JSON); defaults apply to anything omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a two-player zero-sum payoff matrix (JSON array of rows)
    Solve {
        matrix: PathBuf,
        /// Regret-matching iterations (default: configured cold iterations)
        #[arg(short, long)]
        iterations: Option<usize>,
        /// Names for the row and column players
        #[arg(short, long, value_delimiter = ',', default_values = ["hero", "villain"])]
        players: Vec<String>,
    },
    /// Approximate a multi-way spot from pairwise matrices
    Multiway {
        /// JSON list of {"row": .., "col": .., "matrix": [[..]]}
        pairs: PathBuf,
        #[arg(short, long)]
        iterations: Option<usize>,
    },
    /// Deviate from a baseline strategy toward higher-EV actions
    Deviate {
        /// Deviation request (JSON)
        request: PathBuf,
        /// Lock a node to a single action, as node=action (repeatable)
        #[arg(short, long)]
        lock: Vec<String>,
    },
    /// Answer one strategy query (JSON)
    Query { query: PathBuf },
    /// Answer a JSON list of strategy queries in parallel
    Batch {
        queries: PathBuf,
        /// Print cache and latency statistics afterwards
        #[arg(long)]
        stats: bool,
    },
    /// Blend several strategies: JSON list of {"strategy": {..}, "confidence": x}
    Blend {
        sources: PathBuf,
        #[arg(short, long, default_value = "weighted_vote")]
        method: String,
    },
}

#[derive(Deserialize)]
struct PairSpec {
    row: String,
    col: String,
    matrix: PayoffMatrix,
}

#[derive(Deserialize)]
struct BlendSource {
    strategy: Strategy,
    confidence: f64,
}

pub fn run() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli) {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> GtoResult<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let engine = ServingEngine::new(config)?;

    match cli.command {
        Commands::Solve {
            matrix,
            iterations,
            players,
        } => cmd_solve(&engine, &matrix, iterations, &players, cli.json),
        Commands::Multiway { pairs, iterations } => cmd_multiway(&engine, &pairs, iterations, cli.json),
        Commands::Deviate { request, lock } => cmd_deviate(&engine, &request, &lock, cli.json),
        Commands::Query { query } => cmd_query(&engine, &query, cli.json),
        Commands::Batch { queries, stats } => cmd_batch(&engine, &queries, stats, cli.json),
        Commands::Blend { sources, method } => cmd_blend(&sources, &method, cli.json),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> GtoResult<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> GtoResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_solve(
    engine: &ServingEngine,
    path: &Path,
    iterations: Option<usize>,
    players: &[String],
    json: bool,
) -> GtoResult<()> {
    let matrix: PayoffMatrix = read_json(path)?;
    let (row, col) = match players {
        [row, col] => (row.as_str(), col.as_str()),
        _ => {
            return Err(GtoError::InvalidInput(
                "--players takes exactly two names".to_string(),
            ))
        }
    };
    let iterations = iterations.unwrap_or_else(|| engine.facade().cold_iterations());
    let solution = engine.facade().solve_headsup((row, col), &matrix, iterations, None)?;

    if json {
        return print_json(&solution);
    }
    print_section(&format!(
        "{}x{} matrix | {} vs {}",
        matrix.num_rows(),
        matrix.num_cols(),
        row,
        col
    ));
    println!("{}", headsup_report(&solution));
    Ok(())
}

fn cmd_multiway(engine: &ServingEngine, path: &Path, iterations: Option<usize>, json: bool) -> GtoResult<()> {
    let entries: Vec<PairSpec> = read_json(path)?;
    let mut pairs: BTreeMap<PlayerPair, PayoffMatrix> = BTreeMap::new();
    for entry in entries {
        let key = (entry.row, entry.col);
        if pairs.contains_key(&key) {
            return Err(GtoError::InvalidInput(format!(
                "pair {} vs {} listed twice",
                key.0, key.1
            )));
        }
        pairs.insert(key, entry.matrix);
    }

    let iterations = iterations.unwrap_or_else(|| engine.facade().cold_iterations());
    let solution = engine.facade().solve_multiway(&pairs, iterations)?;

    if json {
        return print_json(&solution);
    }
    let players = solution.strategies.keys().join(", ");
    print_section(&format!("Multi-way approximation | {}", players));
    println!("{}", multiway_report(&solution));
    Ok(())
}

fn cmd_deviate(engine: &ServingEngine, path: &Path, locks: &[String], json: bool) -> GtoResult<()> {
    let request: DeviationRequest = read_json(path)?;

    for entry in locks {
        let (node, action) = entry.split_once('=').ok_or_else(|| {
            GtoError::InvalidInput(format!("lock '{}' is not of the form node=action", entry))
        })?;
        engine.exploitation_mut().locks_mut().lock(node.trim(), action.trim())?;
    }

    let result = engine.compute_deviation(&request)?;
    if json {
        return print_json(&result);
    }
    print_section(&format!("Deviation at {}", request.node_id));
    println!("{}", deviation_report(&result, &request.action_evs));
    Ok(())
}

fn cmd_query(engine: &ServingEngine, path: &Path, json: bool) -> GtoResult<()> {
    let value: Value = read_json(path)?;
    let query = StrategyQuery::from_value(value)?;
    let result = engine.query(&query)?;

    if json {
        return print_json(&result);
    }
    print_section(&format!("{} query", query.query_type));
    println!("{}", query_report(&result));
    Ok(())
}

fn cmd_batch(engine: &ServingEngine, path: &Path, stats: bool, json: bool) -> GtoResult<()> {
    let values: Vec<Value> = read_json(path)?;
    let queries: Vec<StrategyQuery> = values
        .into_iter()
        .map(StrategyQuery::from_value)
        .collect::<GtoResult<_>>()?;
    let results = engine.query_batch(&queries);

    if json {
        return print_json(&results);
    }
    for (i, (query, result)) in queries.iter().zip(&results).enumerate() {
        print_section(&format!("#{} {}", i + 1, query.query_type));
        println!("{}", query_report(result));
    }

    let failed = results.iter().filter(|r| r.is_error()).count();
    println!();
    if failed == 0 {
        println!("  {}", format!("{} queries answered", results.len()).green().bold());
    } else {
        println!(
            "  {}",
            format!("{} of {} queries failed", failed, results.len()).yellow().bold()
        );
    }

    if stats {
        print_section("Serving stats");
        println!("{}", stats_table(&engine.stats()));
    }
    Ok(())
}

fn cmd_blend(path: &Path, method: &str, json: bool) -> GtoResult<()> {
    let method: ResolutionMethod = method.parse()?;
    let sources: Vec<BlendSource> = read_json(path)?;
    let pairs: Vec<(Strategy, f64)> = sources
        .into_iter()
        .map(|s| (s.strategy, s.confidence))
        .collect();
    let blended = blend(&pairs, method)?;

    if json {
        return print_json(&blended);
    }
    print_section(&format!("Blended {} sources ({})", pairs.len(), method.as_str()));
    println!("{}", strategy_table(&blended, &BTreeMap::new()));
    Ok(())
}
