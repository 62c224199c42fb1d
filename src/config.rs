//! Engine configuration: cache, solver, exploitation and serving knobs.
//!
//! Every section is `#[serde(default)]`, so a JSON file only needs the keys
//! it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GtoError, GtoResult};

/// Highest supported approximation level (coarsest fast path).
pub const MAX_APPROXIMATION_LEVEL: u8 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub solver: SolverConfig,
    pub exploit: ExploitConfig,
    pub serving: ServingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 10_000,
            ttl_secs: 300.0,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs_f64(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Iterations for a solve with no prior strategy.
    pub cold_iterations: usize,
    /// Iterations for a warm-started real-time update.
    pub warm_iterations: usize,
    /// Scale applied to a prior strategy when it seeds cumulative weights.
    pub warm_start_weight: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            cold_iterations: 1_000,
            warm_iterations: 100,
            warm_start_weight: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploitConfig {
    pub max_shift: f64,
    pub min_probability: f64,
    pub max_actions: usize,
    pub min_tendency_confidence: f64,
    pub min_tendency_samples: u32,
    /// Scale applied to tendency-derived population biases.
    pub tendency_weight: f64,
}

impl Default for ExploitConfig {
    fn default() -> Self {
        ExploitConfig {
            max_shift: 0.3,
            min_probability: 0.05,
            max_actions: 3,
            min_tendency_confidence: 0.6,
            min_tendency_samples: 30,
            tendency_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    pub max_workers: usize,
    pub default_approximation_level: u8,
    pub time_budget_ms: u64,
    /// Minimum remaining budget needed to start another refinement stage.
    pub refinement_stage_ms: u64,
    pub max_refinement_stages: usize,
    pub latency_window: usize,
    /// Fraction of the time budget the rolling average may reach before the
    /// approximation level is raised.
    pub latency_threshold: f64,
}

impl Default for ServingConfig {
    fn default() -> Self {
        ServingConfig {
            max_workers: 4,
            default_approximation_level: 1,
            time_budget_ms: 100,
            refinement_stage_ms: 50,
            max_refinement_stages: 3,
            latency_window: 100,
            latency_threshold: 0.8,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> GtoResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GtoResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> GtoResult<()> {
        if self.cache.capacity == 0 {
            return Err(GtoError::invalid("cache.capacity must be at least 1"));
        }
        if !self.cache.ttl_secs.is_finite() || self.cache.ttl_secs <= 0.0 {
            return Err(GtoError::invalid("cache.ttl_secs must be positive"));
        }
        if self.solver.cold_iterations == 0 || self.solver.warm_iterations == 0 {
            return Err(GtoError::invalid("solver iteration counts must be at least 1"));
        }
        if !self.solver.warm_start_weight.is_finite() || self.solver.warm_start_weight < 0.0 {
            return Err(GtoError::invalid("solver.warm_start_weight must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.exploit.max_shift) {
            return Err(GtoError::invalid("exploit.max_shift must be within [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.exploit.min_probability) {
            return Err(GtoError::invalid("exploit.min_probability must be within [0, 1)"));
        }
        if self.exploit.max_actions == 0 {
            return Err(GtoError::invalid("exploit.max_actions must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.exploit.min_tendency_confidence) {
            return Err(GtoError::invalid(
                "exploit.min_tendency_confidence must be within [0, 1]",
            ));
        }
        if !self.exploit.tendency_weight.is_finite() || self.exploit.tendency_weight < 0.0 {
            return Err(GtoError::invalid("exploit.tendency_weight must be non-negative"));
        }
        if self.serving.max_workers == 0 {
            return Err(GtoError::invalid("serving.max_workers must be at least 1"));
        }
        if !(1..=MAX_APPROXIMATION_LEVEL).contains(&self.serving.default_approximation_level) {
            return Err(GtoError::invalid(format!(
                "serving.default_approximation_level must be within [1, {}]",
                MAX_APPROXIMATION_LEVEL
            )));
        }
        if self.serving.latency_window == 0 {
            return Err(GtoError::invalid("serving.latency_window must be at least 1"));
        }
        if !(self.serving.latency_threshold > 0.0 && self.serving.latency_threshold <= 1.0) {
            return Err(GtoError::invalid("serving.latency_threshold must be within (0, 1]"));
        }
        Ok(())
    }
}
