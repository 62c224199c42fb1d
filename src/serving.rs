//! Serving layer: the entry point for strategy queries.
//!
//! ```text
//! query ─ level ─ canonical key ─ cache ── hit ──────────────────────────┐
//!                                   └ miss ─ level 1: exact ─ refinement ─┤
//!                                           level 2+: approximation ─────┴─ cache insert ─ latency
//! ```
//!
//! Batches fan out over a fixed-size rayon pool. A failing or panicking
//! query yields an error placeholder in its own slot only.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::approximation::{self, REFINED_CONFIDENCE_CEILING, REFINEMENT_STEP};
use crate::cache::{CacheStats, StrategyCache};
use crate::config::{EngineConfig, MAX_APPROXIMATION_LEVEL};
use crate::equilibrium::EquilibriumFacade;
use crate::error::{GtoError, GtoResult};
use crate::exploit::{DeviationRequest, DeviationResult, ExploitationEngine};
use crate::latency::{LatencyMonitor, LevelController};
use crate::matrix_solver::{EquilibriumSolver, PayoffMatrix};
use crate::query::{canonical_key, Answer, QueryResult, QueryType, StrategyQuery};
use crate::strategy::{ActionValues, Strategy};

#[derive(Debug, Clone, Serialize)]
pub struct ServingStats {
    pub queries: u64,
    pub cache: CacheStats,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub approximation_level: u8,
}

pub struct ServingEngine {
    config: EngineConfig,
    cache: StrategyCache,
    latency: LatencyMonitor,
    level: LevelController,
    facade: EquilibriumFacade,
    exploitation: RwLock<ExploitationEngine>,
    pool: rayon::ThreadPool,
    queries: AtomicU64,
}

impl ServingEngine {
    pub fn new(config: EngineConfig) -> GtoResult<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.serving.max_workers)
            .thread_name(|i| format!("gto-serve-{}", i))
            .build()
            .map_err(|e| GtoError::ComputationFailure(format!("worker pool: {}", e)))?;

        Ok(ServingEngine {
            cache: StrategyCache::from_config(&config.cache),
            latency: LatencyMonitor::new(config.serving.latency_window),
            level: LevelController::new(
                config.serving.default_approximation_level,
                config.serving.latency_threshold,
            ),
            facade: EquilibriumFacade::new(config.solver.clone()),
            exploitation: RwLock::new(ExploitationEngine::new(config.exploit.clone())),
            pool,
            queries: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &StrategyCache {
        &self.cache
    }

    pub fn facade(&self) -> &EquilibriumFacade {
        &self.facade
    }

    pub fn current_level(&self) -> u8 {
        self.level.current()
    }

    pub fn exploitation(&self) -> RwLockReadGuard<'_, ExploitationEngine> {
        self.exploitation.read()
    }

    /// Write access for registering profiles and node locks.
    pub fn exploitation_mut(&self) -> RwLockWriteGuard<'_, ExploitationEngine> {
        self.exploitation.write()
    }

    pub fn compute_deviation(&self, request: &DeviationRequest) -> GtoResult<DeviationResult> {
        self.exploitation.read().compute_deviation(request)
    }

    pub fn stats(&self) -> ServingStats {
        ServingStats {
            queries: self.queries.load(Ordering::Relaxed),
            cache: self.cache.stats(),
            average_latency_ms: self.latency.average(),
            p95_latency_ms: self.latency.p95(),
            approximation_level: self.level.current(),
        }
    }

    // -----------------------------------------------------------------------
    // Single query
    // -----------------------------------------------------------------------

    pub fn query(&self, query: &StrategyQuery) -> GtoResult<QueryResult> {
        let start = Instant::now();
        self.queries.fetch_add(1, Ordering::Relaxed);

        let level = self.effective_level(query)?;
        let budget = Duration::from_millis(
            query
                .time_budget_ms
                .unwrap_or(self.config.serving.time_budget_ms),
        );
        let key = canonical_key(query, level);

        if let Some(entry) = self.cache.get(&key) {
            let mut result = entry.result;
            result.cached = true;
            self.record_latency(start);
            return Ok(result);
        }

        let mut result = if level == 1 {
            self.compute_exact(query, start, budget)?
        } else {
            approximation::approximate(query, level)?
        };
        result.compute_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.cache.insert(key, result.clone());
        self.record_latency(start);
        Ok(result)
    }

    fn effective_level(&self, query: &StrategyQuery) -> GtoResult<u8> {
        match query.approximation_level {
            Some(0) => Err(GtoError::invalid("approximation level must be at least 1")),
            Some(level) => Ok(level.min(MAX_APPROXIMATION_LEVEL)),
            None => Ok(self.level.current()),
        }
    }

    fn record_latency(&self, start: Instant) {
        self.latency.record(start.elapsed().as_secs_f64() * 1000.0);
        self.level
            .adjust(&self.latency, self.config.serving.time_budget_ms as f64);
    }

    // -----------------------------------------------------------------------
    // Batch
    // -----------------------------------------------------------------------

    /// One result per input, in input order; failures become placeholders.
    pub fn query_batch(&self, queries: &[StrategyQuery]) -> Vec<QueryResult> {
        let results: Vec<QueryResult> = self
            .pool
            .install(|| queries.par_iter().map(|q| self.query_isolated(q)).collect());

        let failed = results.iter().filter(|r| r.is_error()).count();
        log::info!(
            "batch of {} queries done ({} failed)",
            results.len(),
            failed
        );
        results
    }

    fn query_isolated(&self, query: &StrategyQuery) -> QueryResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.query(query)));
        let err = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => GtoError::ComputationFailure(e.to_string()),
            Err(payload) => {
                let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "query panicked".to_string()
                };
                GtoError::ComputationFailure(msg)
            }
        };
        log::warn!("{} query failed: {}", query.query_type, err);
        QueryResult::failure(query.query_type, err.to_string())
    }

    // -----------------------------------------------------------------------
    // Exact path and progressive refinement
    // -----------------------------------------------------------------------

    /// Closed-form answers are final as computed, so only equilibrium
    /// solves go through refinement.
    fn compute_exact(&self, query: &StrategyQuery, start: Instant, budget: Duration) -> GtoResult<QueryResult> {
        match (query.query_type, query.lookup("payoff_matrix")) {
            (QueryType::Action, Some(matrix)) => self.solve_action(query, matrix, start, budget),
            _ => approximation::exact(query),
        }
    }

    /// Time-boxed cold solve, then refinement stages that keep iterating the
    /// same solver.
    fn solve_action(
        &self,
        query: &StrategyQuery,
        matrix: &Value,
        start: Instant,
        budget: Duration,
    ) -> GtoResult<QueryResult> {
        let matrix: PayoffMatrix = serde_json::from_value(matrix.clone())
            .map_err(|e| GtoError::invalid(format!("payoff_matrix: {}", e)))?;
        let labels = action_labels(query, matrix.num_rows())?;

        let cold = self.facade.cold_iterations().max(1);
        let chunk = self.facade.warm_iterations().clamp(1, cold);
        let mut solver = EquilibriumSolver::new(matrix);

        let mut done = chunk;
        let mut solution = solver.solve(chunk);
        while done < cold && start.elapsed() < budget {
            let n = chunk.min(cold - done);
            solution = solver.solve(n);
            done += n;
        }

        // a cold solve cut short by the budget is a degraded result
        let confidence = if done < cold {
            log::debug!("cold solve stopped at {}/{} iterations", done, cold);
            approximation::EXACT_CONFIDENCE * done as f64 / cold as f64
        } else {
            approximation::EXACT_CONFIDENCE
        };

        let mut result = QueryResult::new(
            QueryType::Action,
            action_answer(&labels, &solution.player_one, solver.matrix(), &solution.player_two),
            confidence,
            1,
        );
        result.exploitability = Some(solution.exploitability);
        if done < cold {
            return Ok(result);
        }

        let mut best = solution.exploitability;
        self.refine(result, start, budget, |r| {
            let next = solver.solve(chunk);
            if next.exploitability >= best {
                return Ok(false);
            }
            best = next.exploitability;
            r.answer = Some(action_answer(&labels, &next.player_one, solver.matrix(), &next.player_two));
            r.exploitability = Some(best);
            Ok(true)
        })
    }

    /// Run refinement stages while the remaining budget covers a full stage.
    /// A stage reports whether it improved the answer; only an improvement
    /// raises confidence, up to the ceiling.
    fn refine<F>(&self, mut result: QueryResult, start: Instant, budget: Duration, mut stage: F) -> GtoResult<QueryResult>
    where
        F: FnMut(&mut QueryResult) -> GtoResult<bool>,
    {
        let stage_cost = Duration::from_millis(self.config.serving.refinement_stage_ms);

        for _ in 0..self.config.serving.max_refinement_stages {
            if result.confidence >= REFINED_CONFIDENCE_CEILING {
                break;
            }
            let remaining = budget.saturating_sub(start.elapsed());
            if remaining < stage_cost {
                break;
            }
            if !stage(&mut result)? {
                log::debug!("refinement stage made no progress");
                continue;
            }
            let next = (result.confidence + REFINEMENT_STEP).min(REFINED_CONFIDENCE_CEILING);
            result.confidence = result.confidence.max(next);
            result.refinement_stages += 1;
            log::debug!(
                "refinement stage {} -> confidence {:.2} ({:?} left)",
                result.refinement_stages,
                result.confidence,
                budget.saturating_sub(start.elapsed())
            );
        }
        Ok(result)
    }
}

/// `actions` parameter, or `action0..actionN` when absent.
fn action_labels(query: &StrategyQuery, count: usize) -> GtoResult<Vec<String>> {
    match query.lookup("actions") {
        None => Ok((0..count).map(|i| format!("action{}", i)).collect()),
        Some(Value::Array(items)) => {
            let labels: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect();
            if labels.len() != items.len() || labels.len() != count {
                return Err(GtoError::invalid(format!(
                    "'actions' must list {} names, one per payoff row",
                    count
                )));
            }
            Ok(labels)
        }
        Some(other) => Err(GtoError::invalid(format!("'actions' must be an array, got {}", other))),
    }
}

fn action_answer(labels: &[String], hero: &[f64], matrix: &PayoffMatrix, villain: &[f64]) -> Answer {
    let strategy: Strategy = labels
        .iter()
        .cloned()
        .zip(hero.iter().copied())
        .collect::<Strategy>()
        .normalized();
    let action_evs: ActionValues = labels
        .iter()
        .cloned()
        .zip(matrix.row_utilities(villain))
        .collect();
    let action = strategy
        .most_likely()
        .map(|(a, _)| a.to_string())
        .unwrap_or_default();
    Answer::Action {
        action,
        strategy,
        action_evs,
    }
}
