//! Equilibrium facade: heads-up solves, multi-way approximation by pairwise
//! decomposition, and warm-started real-time updates.
//!
//! Multi-way results average each player's pairwise strategies. That is a
//! heuristic, not an N-player equilibrium; no error bound is claimed.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SolverConfig;
use crate::error::{GtoError, GtoResult};
use crate::matrix_solver::{EquilibriumSolution, EquilibriumSolver, PayoffMatrix};

/// `(row_player, column_player)`. The matrix keyed by a pair is written from
/// the row player's perspective.
pub type PlayerPair = (String, String);

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadsUpSolution {
    /// Average strategy per player name.
    pub strategies: BTreeMap<String, Vec<f64>>,
    /// Value to the row player.
    pub game_value: f64,
    pub exploitability: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseSolution {
    pub row_player: String,
    pub col_player: String,
    pub solution: EquilibriumSolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiwaySolution {
    /// Element-wise mean of each player's pairwise strategies.
    pub strategies: BTreeMap<String, Vec<f64>>,
    pub mean_exploitability: f64,
    pub pairwise: Vec<PairwiseSolution>,
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct EquilibriumFacade {
    config: SolverConfig,
}

impl EquilibriumFacade {
    pub fn new(config: SolverConfig) -> Self {
        EquilibriumFacade { config }
    }

    pub fn cold_iterations(&self) -> usize {
        self.config.cold_iterations
    }

    pub fn warm_iterations(&self) -> usize {
        self.config.warm_iterations
    }

    /// One two-player solve with the accumulator slots named after `players`.
    pub fn solve_headsup(
        &self,
        players: (&str, &str),
        matrix: &PayoffMatrix,
        iterations: usize,
        warm_start: Option<(&[f64], &[f64])>,
    ) -> GtoResult<HeadsUpSolution> {
        if players.0 == players.1 {
            return Err(GtoError::invalid(format!(
                "heads-up solve needs two distinct players, got '{}' twice",
                players.0
            )));
        }

        let mut solver = match warm_start {
            Some((p1, p2)) => EquilibriumSolver::with_warm_start(
                matrix.clone(),
                Some(p1),
                Some(p2),
                self.config.warm_start_weight,
            )?,
            None => EquilibriumSolver::new(matrix.clone()),
        };
        let solution = solver.solve(iterations);

        let mut strategies = BTreeMap::new();
        strategies.insert(players.0.to_string(), solution.player_one);
        strategies.insert(players.1.to_string(), solution.player_two);

        Ok(HeadsUpSolution {
            strategies,
            game_value: solution.game_value,
            exploitability: solution.exploitability,
            iterations: solution.iterations,
        })
    }

    /// Solve every pair independently (in parallel) and average each
    /// player's strategy over the pairs they appear in.
    pub fn solve_multiway(
        &self,
        pairwise: &BTreeMap<PlayerPair, PayoffMatrix>,
        iterations: usize,
    ) -> GtoResult<MultiwaySolution> {
        if pairwise.is_empty() {
            return Err(GtoError::invalid("multi-way solve needs at least one pair"));
        }
        let action_counts = validate_pairs(pairwise)?;

        let pairwise: Vec<PairwiseSolution> = pairwise
            .par_iter()
            .map(|((row, col), matrix)| {
                let solution = EquilibriumSolver::new(matrix.clone()).solve(iterations);
                PairwiseSolution {
                    row_player: row.clone(),
                    col_player: col.clone(),
                    solution,
                }
            })
            .collect();

        let mut sums: BTreeMap<String, (Vec<f64>, usize)> = action_counts
            .iter()
            .map(|(name, &n)| (name.clone(), (vec![0.0; n], 0)))
            .collect();
        for pair in &pairwise {
            for (name, strategy) in [
                (&pair.row_player, &pair.solution.player_one),
                (&pair.col_player, &pair.solution.player_two),
            ] {
                if let Some((sum, count)) = sums.get_mut(name) {
                    for (s, &p) in sum.iter_mut().zip(strategy) {
                        *s += p;
                    }
                    *count += 1;
                }
            }
        }

        let strategies: BTreeMap<String, Vec<f64>> = sums
            .into_iter()
            .map(|(name, (sum, count))| {
                let mean: Vec<f64> = sum.iter().map(|s| s / count.max(1) as f64).collect();
                (name, renormalize(mean))
            })
            .collect();

        let mean_exploitability = pairwise
            .iter()
            .map(|p| p.solution.exploitability)
            .sum::<f64>()
            / pairwise.len() as f64;

        log::info!(
            "multi-way solve: {} players, {} pairs, mean exploitability {:.6}",
            strategies.len(),
            pairwise.len(),
            mean_exploitability
        );

        Ok(MultiwaySolution {
            strategies,
            mean_exploitability,
            pairwise,
        })
    }

    /// Low-iteration solve seeded with the caller's previous strategies.
    pub fn approximate_realtime_update(
        &self,
        matrix: &PayoffMatrix,
        previous: (&[f64], &[f64]),
        iterations: usize,
    ) -> GtoResult<EquilibriumSolution> {
        let mut solver = EquilibriumSolver::with_warm_start(
            matrix.clone(),
            Some(previous.0),
            Some(previous.1),
            self.config.warm_start_weight,
        )?;
        Ok(solver.solve(iterations))
    }
}

/// Checks pair shapes up front and returns each player's action count.
fn validate_pairs(pairwise: &BTreeMap<PlayerPair, PayoffMatrix>) -> GtoResult<BTreeMap<String, usize>> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for ((row, col), matrix) in pairwise {
        if row == col {
            return Err(GtoError::invalid(format!("player '{}' paired with itself", row)));
        }
        if pairwise.contains_key(&(col.clone(), row.clone())) {
            return Err(GtoError::invalid(format!(
                "pair ({}, {}) supplied in both orientations",
                row, col
            )));
        }
        for (name, n) in [(row, matrix.num_rows()), (col, matrix.num_cols())] {
            match counts.get(name) {
                Some(&existing) if existing != n => {
                    return Err(GtoError::invalid(format!(
                        "player '{}' has {} actions in one pairing and {} in another",
                        name, existing, n
                    )));
                }
                Some(_) => {}
                None => {
                    counts.insert(name.clone(), n);
                }
            }
        }
    }

    Ok(counts)
}

fn renormalize(mut v: Vec<f64>) -> Vec<f64> {
    let total: f64 = v.iter().sum();
    if total > 0.0 {
        for x in v.iter_mut() {
            *x /= total;
        }
    } else {
        let uniform = 1.0 / v.len() as f64;
        for x in v.iter_mut() {
            *x = uniform;
        }
    }
    v
}
