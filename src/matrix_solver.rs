//! Regret-matching+ solver for two-player zero-sum normal-form games.
//!
//! Payoffs are stored row-major in one contiguous array, indexed from the
//! row player's perspective:
//!
//!   index = row * num_cols + col
//!
//! The column player receives the negated payoff. Each player owns a
//! [`RegretAccumulator`] of fixed length (its action count), so the
//! per-iteration loop never touches a hash map.

use serde::{Deserialize, Serialize};

use crate::error::{GtoError, GtoResult};

// ---------------------------------------------------------------------------
// Payoff matrix
// ---------------------------------------------------------------------------

/// Rectangular payoff table for the row player. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct PayoffMatrix {
    num_rows: usize,
    num_cols: usize,
    payoffs: Vec<f64>,
}

impl PayoffMatrix {
    /// Build a matrix from rows. Fails on an empty matrix, an empty row,
    /// ragged rows, or non-finite payoffs.
    pub fn new(rows: Vec<Vec<f64>>) -> GtoResult<Self> {
        if rows.is_empty() {
            return Err(GtoError::invalid("payoff matrix has no rows"));
        }
        let num_cols = rows[0].len();
        if num_cols == 0 {
            return Err(GtoError::invalid("payoff matrix row 0 is empty"));
        }

        let mut payoffs = Vec::with_capacity(rows.len() * num_cols);
        for (i, row) in rows.iter().enumerate() {
            if row.is_empty() {
                return Err(GtoError::invalid(format!("payoff matrix row {} is empty", i)));
            }
            if row.len() != num_cols {
                return Err(GtoError::invalid(format!(
                    "ragged payoff matrix: row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    num_cols
                )));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(GtoError::invalid(format!(
                    "payoff matrix row {} contains non-finite value {}",
                    i, bad
                )));
            }
            payoffs.extend_from_slice(row);
        }

        Ok(PayoffMatrix {
            num_rows: rows.len(),
            num_cols,
            payoffs,
        })
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Payoff to the row player for the pure profile (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.payoffs[row * self.num_cols + col]
    }

    /// Row player's utility for each row against a column mixed strategy.
    pub fn row_utilities(&self, col_strategy: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.num_rows];
        self.row_utilities_into(col_strategy, &mut out);
        out
    }

    /// Column player's utility for each column against a row mixed strategy.
    /// This is the negated transpose product, so the game stays zero-sum.
    pub fn col_utilities(&self, row_strategy: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.num_cols];
        self.col_utilities_into(row_strategy, &mut out);
        out
    }

    /// Expected payoff to the row player under a mixed profile.
    pub fn value(&self, row_strategy: &[f64], col_strategy: &[f64]) -> f64 {
        dot(row_strategy, &self.row_utilities(col_strategy))
    }

    fn row_utilities_into(&self, col_strategy: &[f64], out: &mut [f64]) {
        for (r, o) in out.iter_mut().enumerate() {
            let row = &self.payoffs[r * self.num_cols..(r + 1) * self.num_cols];
            *o = dot(row, col_strategy);
        }
    }

    fn col_utilities_into(&self, row_strategy: &[f64], out: &mut [f64]) {
        for o in out.iter_mut() {
            *o = 0.0;
        }
        for (r, &p) in row_strategy.iter().enumerate() {
            let row = &self.payoffs[r * self.num_cols..(r + 1) * self.num_cols];
            for (o, &v) in out.iter_mut().zip(row) {
                *o -= p * v;
            }
        }
    }
}

impl TryFrom<Vec<Vec<f64>>> for PayoffMatrix {
    type Error = GtoError;

    fn try_from(rows: Vec<Vec<f64>>) -> GtoResult<Self> {
        PayoffMatrix::new(rows)
    }
}

impl From<PayoffMatrix> for Vec<Vec<f64>> {
    fn from(m: PayoffMatrix) -> Self {
        m.payoffs.chunks(m.num_cols).map(|c| c.to_vec()).collect()
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Regret accumulator
// ---------------------------------------------------------------------------

/// Per-player solver state: cumulative regret and cumulative strategy weight.
#[derive(Debug, Clone)]
pub struct RegretAccumulator {
    regrets: Vec<f64>,
    strategy_sum: Vec<f64>,
}

impl RegretAccumulator {
    fn new(num_actions: usize) -> Self {
        RegretAccumulator {
            regrets: vec![0.0; num_actions],
            strategy_sum: vec![0.0; num_actions],
        }
    }

    /// Accumulator whose strategy weights start at `seed * weight`.
    fn seeded(num_actions: usize, seed: &[f64], weight: f64) -> GtoResult<Self> {
        if seed.len() != num_actions {
            return Err(GtoError::invalid(format!(
                "warm start has {} actions, expected {}",
                seed.len(),
                num_actions
            )));
        }
        if seed.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(GtoError::invalid(
                "warm start weights must be finite and non-negative",
            ));
        }
        let mut acc = RegretAccumulator::new(num_actions);
        for (s, &v) in acc.strategy_sum.iter_mut().zip(seed) {
            *s = v * weight;
        }
        Ok(acc)
    }

    #[inline]
    pub fn num_actions(&self) -> usize {
        self.regrets.len()
    }

    pub fn regrets(&self) -> &[f64] {
        &self.regrets
    }

    pub fn strategy_sum(&self) -> &[f64] {
        &self.strategy_sum
    }

    /// Regret matching: proportional to positive regret, uniform if none.
    pub fn current_strategy(&self, out: &mut [f64]) {
        let positive_sum: f64 = self.regrets.iter().map(|r| r.max(0.0)).sum();
        if positive_sum > 0.0 {
            let inv = 1.0 / positive_sum;
            for (o, &r) in out.iter_mut().zip(&self.regrets) {
                *o = r.max(0.0) * inv;
            }
        } else {
            let uniform = 1.0 / self.num_actions() as f64;
            for o in out[..self.num_actions()].iter_mut() {
                *o = uniform;
            }
        }
    }

    /// Normalized cumulative strategy weight (uniform if nothing accumulated).
    pub fn average_strategy(&self) -> Vec<f64> {
        let total: f64 = self.strategy_sum.iter().sum();
        if total > 0.0 {
            self.strategy_sum.iter().map(|s| s / total).collect()
        } else {
            vec![1.0 / self.num_actions() as f64; self.num_actions()]
        }
    }

    #[inline]
    fn accumulate(&mut self, strategy: &[f64]) {
        for (s, &p) in self.strategy_sum.iter_mut().zip(strategy) {
            *s += p;
        }
    }

    /// CFR+ update: regret is floored at 0 after adding the instantaneous
    /// regret, so it never goes negative.
    #[inline]
    fn update_regrets(&mut self, utilities: &[f64], realized: f64) {
        for (r, &u) in self.regrets.iter_mut().zip(utilities) {
            *r = (*r + (u - realized)).max(0.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// Terminal output of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumSolution {
    pub player_one: Vec<f64>,
    pub player_two: Vec<f64>,
    /// Expected payoff to player one under the average strategies.
    pub game_value: f64,
    /// Sum of both players' best-response gains, each floored at 0.
    pub exploitability: f64,
    pub iterations: usize,
}

/// Regret-matching+ solver over one payoff matrix.
///
/// Not internally synchronized: one instance per concurrent solve.
#[derive(Debug, Clone)]
pub struct EquilibriumSolver {
    matrix: PayoffMatrix,
    players: [RegretAccumulator; 2],
}

impl EquilibriumSolver {
    pub fn new(matrix: PayoffMatrix) -> Self {
        let players = [
            RegretAccumulator::new(matrix.num_rows()),
            RegretAccumulator::new(matrix.num_cols()),
        ];
        EquilibriumSolver { matrix, players }
    }

    /// Build from raw rows; the error path for malformed input.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> GtoResult<Self> {
        Ok(EquilibriumSolver::new(PayoffMatrix::new(rows)?))
    }

    /// Solver whose cumulative strategy weights are seeded from prior
    /// strategies, each scaled by `weight`.
    pub fn with_warm_start(
        matrix: PayoffMatrix,
        player_one: Option<&[f64]>,
        player_two: Option<&[f64]>,
        weight: f64,
    ) -> GtoResult<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(GtoError::invalid("warm start weight must be finite and non-negative"));
        }
        let p1 = match player_one {
            Some(seed) => RegretAccumulator::seeded(matrix.num_rows(), seed, weight)?,
            None => RegretAccumulator::new(matrix.num_rows()),
        };
        let p2 = match player_two {
            Some(seed) => RegretAccumulator::seeded(matrix.num_cols(), seed, weight)?,
            None => RegretAccumulator::new(matrix.num_cols()),
        };
        Ok(EquilibriumSolver {
            matrix,
            players: [p1, p2],
        })
    }

    pub fn matrix(&self) -> &PayoffMatrix {
        &self.matrix
    }

    /// Accumulator for player 0 (rows) or 1 (columns).
    pub fn accumulator(&self, player: usize) -> &RegretAccumulator {
        &self.players[player]
    }

    /// Run exactly `iterations` rounds (at least one).
    pub fn solve(&mut self, iterations: usize) -> EquilibriumSolution {
        let iterations = iterations.max(1);
        let rows = self.matrix.num_rows();
        let cols = self.matrix.num_cols();

        let mut sigma1 = vec![0.0; rows];
        let mut sigma2 = vec![0.0; cols];
        let mut util1 = vec![0.0; rows];
        let mut util2 = vec![0.0; cols];

        for _ in 0..iterations {
            self.players[0].current_strategy(&mut sigma1);
            self.players[1].current_strategy(&mut sigma2);

            self.players[0].accumulate(&sigma1);
            self.players[1].accumulate(&sigma2);

            self.matrix.row_utilities_into(&sigma2, &mut util1);
            self.matrix.col_utilities_into(&sigma1, &mut util2);

            let v1 = dot(&sigma1, &util1);
            let v2 = dot(&sigma2, &util2);

            self.players[0].update_regrets(&util1, v1);
            self.players[1].update_regrets(&util2, v2);
        }

        let player_one = self.players[0].average_strategy();
        let player_two = self.players[1].average_strategy();
        let (game_value, exploitability) = exploitability(&self.matrix, &player_one, &player_two);

        log::debug!(
            "solved {}x{} matrix: {} iterations, value {:.4}, exploitability {:.6}",
            rows,
            cols,
            iterations,
            game_value,
            exploitability
        );

        EquilibriumSolution {
            player_one,
            player_two,
            game_value,
            exploitability,
            iterations,
        }
    }
}

/// Returns (value to player one, exploitability) of a strategy profile.
pub fn exploitability(matrix: &PayoffMatrix, player_one: &[f64], player_two: &[f64]) -> (f64, f64) {
    let util1 = matrix.row_utilities(player_two);
    let util2 = matrix.col_utilities(player_one);
    let v1 = dot(player_one, &util1);
    let v2 = -v1;

    let br1 = util1.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let br2 = util2.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let gain = (br1 - v1).max(0.0) + (br2 - v2).max(0.0);
    (v1, gain)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
