//! Strategy computation engine: regret-matching equilibrium solver, a facade
//! for heads-up / multi-way / warm-started solves, an exploitation layer
//! that deviates from a baseline toward higher-EV actions, and a serving
//! layer with caching, fast approximations and progressive refinement.

pub mod approximation;
pub mod cache;
pub mod config;
pub mod equilibrium;
pub mod error;
pub mod exploit;
pub mod latency;
pub mod math_engine;
pub mod matrix_solver;
pub mod population;
pub mod query;
pub mod serving;
pub mod strategy;

pub use config::EngineConfig;
pub use equilibrium::EquilibriumFacade;
pub use error::{GtoError, GtoResult};
pub use exploit::{DeviationRequest, DeviationResult, ExploitationEngine};
pub use matrix_solver::{EquilibriumSolution, EquilibriumSolver, PayoffMatrix};
pub use query::{QueryResult, QueryType, StrategyQuery};
pub use serving::ServingEngine;
pub use strategy::Strategy;
