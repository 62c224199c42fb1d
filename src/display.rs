use colored::Colorize;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use itertools::Itertools;

use gto_engine::cache::CacheStats;
use gto_engine::equilibrium::{HeadsUpSolution, MultiwaySolution};
use gto_engine::exploit::DeviationResult;
use gto_engine::query::{Answer, QueryResult};
use gto_engine::serving::ServingStats;
use gto_engine::strategy::{ActionValues, Strategy};

pub fn probability_bar(p: f64, width: usize) -> String {
    let filled = ((p.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let bar: String = "\u{2588}".repeat(filled) + &"\u{2591}".repeat(width - filled);
    let pct = format!("{:.1}%", p * 100.0);

    if p >= 0.6 {
        format!("{} {}", bar.green(), pct)
    } else if p >= 0.3 {
        format!("{} {}", bar.yellow(), pct)
    } else {
        format!("{} {}", bar.dimmed(), pct)
    }
}

pub fn action_style(action: &str) -> &'static str {
    let upper = action.to_uppercase();
    if matches!(upper.as_str(), "RAISE" | "BET" | "JAM" | "ALLIN") {
        "red"
    } else if upper == "CALL" {
        "green"
    } else if upper == "FOLD" {
        "dim"
    } else if upper.contains("CHECK") {
        "yellow"
    } else {
        "bold"
    }
}

pub fn styled_action(action: &str) -> String {
    match action_style(action) {
        "red" => action.red().bold().to_string(),
        "green" => action.green().bold().to_string(),
        "dim" => action.dimmed().bold().to_string(),
        "yellow" => action.yellow().bold().to_string(),
        _ => action.bold().to_string(),
    }
}

fn signed(v: f64) -> String {
    if v >= 0.0 {
        format!("{:+.3}", v).green().to_string()
    } else {
        format!("{:+.3}", v).red().to_string()
    }
}

/// Strategy rows sorted by probability, with EVs when known.
pub fn strategy_table(strategy: &Strategy, evs: &ActionValues) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("Action").set_alignment(CellAlignment::Left),
        Cell::new("Frequency").set_alignment(CellAlignment::Left),
    ];
    if !evs.is_empty() {
        header.push(Cell::new("EV").set_alignment(CellAlignment::Right));
    }
    table.set_header(header);

    for (action, p) in strategy.iter().sorted_by(|a, b| b.1.total_cmp(&a.1)) {
        let mut row = vec![Cell::new(styled_action(action)), Cell::new(probability_bar(p, 20))];
        if !evs.is_empty() {
            let ev = evs.get(action).map(|v| signed(*v)).unwrap_or_else(|| "-".to_string());
            row.push(Cell::new(ev).set_alignment(CellAlignment::Right));
        }
        table.add_row(row);
    }

    table.to_string()
}

fn vector_table(strategies: &[(&String, &Vec<f64>)]) -> String {
    let width = strategies.iter().map(|(_, v)| v.len()).max().unwrap_or(0);

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![Cell::new("Player")];
    for i in 0..width {
        header.push(Cell::new(format!("a{}", i)).set_alignment(CellAlignment::Right));
    }
    table.set_header(header);

    for (name, v) in strategies {
        let mut row = vec![Cell::new(name.bold().to_string())];
        for p in v.iter() {
            row.push(Cell::new(format!("{:.3}", p)).set_alignment(CellAlignment::Right));
        }
        table.add_row(row);
    }
    table.to_string()
}

pub fn headsup_report(solution: &HeadsUpSolution) -> String {
    let rows: Vec<(&String, &Vec<f64>)> = solution.strategies.iter().collect();
    format!(
        "{}\n  Value: {:.4} | Exploitability: {:.6} | Iterations: {}",
        vector_table(&rows),
        solution.game_value,
        solution.exploitability,
        solution.iterations,
    )
}

pub fn multiway_report(solution: &MultiwaySolution) -> String {
    let rows: Vec<(&String, &Vec<f64>)> = solution.strategies.iter().collect();
    let pairs = solution
        .pairwise
        .iter()
        .map(|p| format!("{} vs {} ({:.4})", p.row_player, p.col_player, p.solution.exploitability))
        .join(", ");
    format!(
        "{}\n  Mean exploitability: {:.6}\n  Pairs: {}",
        vector_table(&rows),
        solution.mean_exploitability,
        pairs.dimmed(),
    )
}

pub fn deviation_report(result: &DeviationResult, evs: &ActionValues) -> String {
    let mut lines = vec![strategy_table(&result.strategy, evs)];
    lines.push(format!(
        "  EV gain: {} | Exploitability: {:.3}",
        signed(result.ev_gain),
        result.exploitability
    ));
    if let Some(profile) = &result.profile {
        lines.push(format!("  Profile: {}", profile.cyan()));
    }
    if result.locked {
        lines.push(format!("  {}", "Node locked".yellow().bold()));
    }
    lines.join("\n")
}

pub fn query_report(result: &QueryResult) -> String {
    if let Some(err) = &result.error {
        return format!("  {} {}", "Error:".red().bold(), err);
    }

    let body = match &result.answer {
        Some(Answer::Range { position, range_fraction }) => {
            format!("  {} opens {}", position.bold(), probability_bar(*range_fraction, 20))
        }
        Some(Answer::Action { action, strategy, action_evs }) => {
            format!("  {}\n{}", styled_action(action), strategy_table(strategy, action_evs))
        }
        Some(Answer::Equity { equity }) => format!("  Equity {}", probability_bar(*equity, 20)),
        Some(Answer::Ev { ev }) => format!("  EV {}", signed(*ev)),
        None => String::new(),
    };

    let mut meta = format!(
        "  Confidence {:.2} | Level {} | {:.2}ms",
        result.confidence, result.approximation_level, result.compute_time_ms
    );
    if result.refinement_stages > 0 {
        meta.push_str(&format!(" | {} refinement stages", result.refinement_stages));
    }
    if result.cached {
        meta.push_str(" | cached");
    }
    format!("{}\n{}", body, meta.dimmed())
}

pub fn stats_table(stats: &ServingStats) -> String {
    let CacheStats { hits, misses, evictions, expirations, size } = stats.cache;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Metric").set_alignment(CellAlignment::Left),
        Cell::new("Value").set_alignment(CellAlignment::Right),
    ]);
    let rows: Vec<(&str, String)> = vec![
        ("Queries", stats.queries.to_string()),
        ("Cache hits", hits.to_string()),
        ("Cache misses", misses.to_string()),
        ("Hit rate", format!("{:.1}%", stats.cache.hit_rate() * 100.0)),
        ("Evictions", evictions.to_string()),
        ("Expirations", expirations.to_string()),
        ("Cache size", size.to_string()),
        ("Avg latency", format!("{:.2}ms", stats.average_latency_ms)),
        ("p95 latency", format!("{:.2}ms", stats.p95_latency_ms)),
        ("Approx level", stats.approximation_level.to_string()),
    ];
    for (k, v) in rows {
        table.add_row(vec![
            Cell::new(k.bold().to_string()),
            Cell::new(v).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

pub fn print_section(title: &str) {
    println!("\n{}", title.cyan().bold());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}
