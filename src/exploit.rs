//! Exploitative deviations from a baseline strategy.
//!
//! Pipeline per request:
//!
//! ```text
//! baseline ── population bias ── max exploitation ── simplification ── scoring
//!    │
//!    └─ locked node ─────────────── {action: 1.0} ───────────────────── scoring
//! ```
//!
//! The engine is stateless per request; its only state is the profile
//! registry and the node-lock table, both owned by the engine instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ExploitConfig;
use crate::error::{GtoError, GtoResult};
use crate::population::{OpponentTendency, PopulationProfile, ProfileRegistry, TendencyStats};
use crate::strategy::{ActionValues, Strategy};

/// Metadata key naming a registry profile to apply.
pub const PROFILE_METADATA_KEY: &str = "population_profile";

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// Optional pruning of a deviated strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Simplification {
    /// Actions below this probability are dropped.
    #[serde(default)]
    pub min_probability: Option<f64>,
    /// Keep at most this many actions (highest probability first).
    #[serde(default)]
    pub max_actions: Option<usize>,
}

impl Simplification {
    pub fn new(min_probability: Option<f64>, max_actions: Option<usize>) -> Self {
        Simplification {
            min_probability,
            max_actions,
        }
    }

    fn validate(&self) -> GtoResult<()> {
        if let Some(t) = self.min_probability {
            if !(0.0..1.0).contains(&t) {
                return Err(GtoError::invalid(format!(
                    "simplification threshold {} outside [0, 1)",
                    t
                )));
            }
        }
        if self.max_actions == Some(0) {
            return Err(GtoError::invalid("simplification max_actions must be at least 1"));
        }
        Ok(())
    }

    /// Drop actions under the threshold, fall back to the single most likely
    /// action if nothing survives, cap the action count, renormalize.
    pub fn apply(&self, strategy: &Strategy) -> Strategy {
        let mut out = strategy.clone();

        if let Some(threshold) = self.min_probability {
            out.retain(|_, p| p >= threshold);
            if out.is_empty() {
                return match strategy.most_likely() {
                    Some((action, _)) => Strategy::pure(action),
                    None => Strategy::new(),
                };
            }
        }

        if let Some(max) = self.max_actions {
            if out.len() > max {
                let mut ranked: Vec<(String, f64)> =
                    out.iter().map(|(a, p)| (a.to_string(), p)).collect();
                // stable sort keeps key order among equal probabilities
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked.truncate(max);
                out = ranked.into_iter().collect();
            }
        }

        out.normalize();
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationRequest {
    pub node_id: String,
    pub baseline: Strategy,
    pub action_evs: ActionValues,
    #[serde(default)]
    pub profile: Option<PopulationProfile>,
    #[serde(default)]
    pub tendencies: Vec<OpponentTendency>,
    #[serde(default)]
    pub stats: Option<TendencyStats>,
    /// Falls back to the engine's configured budget when absent.
    #[serde(default)]
    pub max_shift: Option<f64>,
    #[serde(default)]
    pub simplification: Option<Simplification>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DeviationRequest {
    pub fn new(node_id: &str, baseline: Strategy, action_evs: ActionValues) -> Self {
        DeviationRequest {
            node_id: node_id.to_string(),
            baseline,
            action_evs,
            profile: None,
            tendencies: Vec::new(),
            stats: None,
            max_shift: None,
            simplification: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_max_shift(mut self, max_shift: f64) -> Self {
        self.max_shift = Some(max_shift);
        self
    }

    pub fn with_profile(mut self, profile: PopulationProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_profile_name(mut self, name: &str) -> Self {
        self.metadata.insert(PROFILE_METADATA_KEY.to_string(), name.to_string());
        self
    }

    pub fn with_tendencies(mut self, tendencies: Vec<OpponentTendency>) -> Self {
        self.tendencies = tendencies;
        self
    }

    pub fn with_stats(mut self, stats: TendencyStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_simplification(mut self, simplification: Simplification) -> Self {
        self.simplification = Some(simplification);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationResult {
    pub node_id: String,
    pub strategy: Strategy,
    /// Deviated EV minus baseline EV.
    pub ev_gain: f64,
    /// Half the L1 distance from the baseline, capped at 1.
    pub exploitability: f64,
    pub best_action: Option<String>,
    pub profile: Option<String>,
    pub locked: bool,
    /// `baseline_ev`, `deviated_ev`, `shift`, and `locked` (0/1).
    pub metadata: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Node locks
// ---------------------------------------------------------------------------

/// Node id → forced action.
#[derive(Debug, Clone, Default)]
pub struct NodeLocks {
    locks: BTreeMap<String, String>,
}

impl NodeLocks {
    pub fn lock(&mut self, node_id: &str, action: &str) -> GtoResult<()> {
        if action.is_empty() {
            return Err(GtoError::invalid(format!("empty lock action for node '{}'", node_id)));
        }
        self.locks.insert(node_id.to_string(), action.to_string());
        Ok(())
    }

    pub fn unlock(&mut self, node_id: &str) -> Option<String> {
        self.locks.remove(node_id)
    }

    pub fn locked_action(&self, node_id: &str) -> Option<&str> {
        self.locks.get(node_id).map(|a| a.as_str())
    }

    pub fn is_locked(&self, node_id: &str) -> bool {
        self.locks.contains_key(node_id)
    }

    pub fn clear(&mut self) {
        self.locks.clear();
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExploitationEngine {
    config: ExploitConfig,
    profiles: ProfileRegistry,
    locks: NodeLocks,
}

impl Default for ExploitationEngine {
    fn default() -> Self {
        ExploitationEngine::new(ExploitConfig::default())
    }
}

impl ExploitationEngine {
    /// Engine with the built-in style profiles registered and no locks.
    pub fn new(config: ExploitConfig) -> Self {
        ExploitationEngine {
            config,
            profiles: ProfileRegistry::with_builtin(),
            locks: NodeLocks::default(),
        }
    }

    pub fn config(&self) -> &ExploitConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut ProfileRegistry {
        &mut self.profiles
    }

    pub fn locks(&self) -> &NodeLocks {
        &self.locks
    }

    pub fn locks_mut(&mut self) -> &mut NodeLocks {
        &mut self.locks
    }

    /// Simplification built from the configured threshold and action cap.
    pub fn default_simplification(&self) -> Simplification {
        Simplification::new(Some(self.config.min_probability), Some(self.config.max_actions))
    }

    pub fn compute_deviation(&self, request: &DeviationRequest) -> GtoResult<DeviationResult> {
        let max_shift = request.max_shift.unwrap_or(self.config.max_shift);
        validate_request(request, max_shift)?;

        let baseline = request.baseline.normalized();
        let best_action = best_ev_action(&request.action_evs);

        if let Some(action) = self.locks.locked_action(&request.node_id) {
            let forced = Strategy::pure(action);
            return Ok(score(request, &baseline, forced, best_action, None, 0.0, true));
        }

        let profile = self.resolve_profile(request, &baseline)?;
        let biased = match &profile {
            Some(p) => p.apply(&baseline),
            None => baseline.clone(),
        };

        let (exploited, shift) = maximum_exploitation(&biased, &request.action_evs, max_shift);

        let deviated = match &request.simplification {
            Some(s) => s.apply(&exploited),
            None => exploited,
        };

        Ok(score(
            request,
            &baseline,
            deviated,
            best_action,
            profile.map(|p| p.name),
            shift,
            false,
        ))
    }

    /// Explicit profile, then metadata name, then stats auto-selection;
    /// significant tendencies are layered on top of whichever is found.
    fn resolve_profile(
        &self,
        request: &DeviationRequest,
        baseline: &Strategy,
    ) -> GtoResult<Option<PopulationProfile>> {
        let named = if let Some(p) = &request.profile {
            Some(p.clone())
        } else if let Some(name) = request.metadata.get(PROFILE_METADATA_KEY) {
            match self.profiles.get(name) {
                Some(p) => Some(p.clone()),
                None => {
                    return Err(GtoError::invalid(format!("unknown population profile '{}'", name)))
                }
            }
        } else {
            request
                .stats
                .as_ref()
                .filter(|s| s.is_significant(self.config.min_tendency_samples))
                .and_then(|s| self.profiles.for_stats(s))
                .cloned()
        };

        let observed = PopulationProfile::from_tendencies(&request.tendencies, baseline, &self.config);

        Ok(match (named, observed) {
            (Some(n), Some(o)) => Some(n.combined(&o)),
            (Some(n), None) => Some(n),
            (None, o) => o,
        })
    }
}

fn validate_request(request: &DeviationRequest, max_shift: f64) -> GtoResult<()> {
    request.baseline.validate("baseline")?;
    if request.action_evs.is_empty() {
        return Err(GtoError::invalid(format!(
            "node '{}' has no action EVs",
            request.node_id
        )));
    }
    if let Some((a, v)) = request.action_evs.iter().find(|(_, v)| !v.is_finite()) {
        return Err(GtoError::invalid(format!("non-finite EV {} for '{}'", v, a)));
    }
    if !max_shift.is_finite() || !(0.0..=1.0).contains(&max_shift) {
        return Err(GtoError::invalid(format!("max_shift {} outside [0, 1]", max_shift)));
    }
    if let Some(s) = &request.simplification {
        s.validate()?;
    }
    Ok(())
}

/// Highest-EV action; first in key order on ties.
fn best_ev_action(evs: &ActionValues) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for (a, &v) in evs {
        if best.map_or(true, |(_, bv)| v > bv) {
            best = Some((a, v));
        }
    }
    best.map(|(a, _)| a.clone())
}

/// Move up to `max_shift` probability into the best-EV action, taking it from
/// every other action in proportion to its current mass. Returns the strategy
/// and the mass actually moved.
pub fn maximum_exploitation(strategy: &Strategy, evs: &ActionValues, max_shift: f64) -> (Strategy, f64) {
    let mut out = strategy.clone();
    let best = match best_ev_action(evs) {
        Some(b) => b,
        None => {
            out.normalize();
            return (out, 0.0);
        }
    };

    let best_before = out.get(&best);
    let available: f64 = out.iter().filter(|(a, _)| *a != best).map(|(_, p)| p).sum();
    let actual = max_shift.min(available).max(0.0);

    if actual > 0.0 && available > 0.0 {
        let scale = 1.0 - actual / available;
        for v in out.values_mut() {
            *v *= scale;
        }
        // best was scaled with the rest; restore it before adding the shift
        out.set(&best, best_before + actual);
    }
    out.normalize();

    let moved = (out.get(&best) - best_before).max(0.0);
    (out, moved)
}

fn score(
    request: &DeviationRequest,
    baseline: &Strategy,
    deviated: Strategy,
    best_action: Option<String>,
    profile: Option<String>,
    shift: f64,
    locked: bool,
) -> DeviationResult {
    let baseline_ev = baseline.expected_value(&request.action_evs);
    let deviated_ev = deviated.expected_value(&request.action_evs);
    let exploitability = (0.5 * baseline.l1_distance(&deviated)).min(1.0);

    let mut metadata = BTreeMap::new();
    metadata.insert("baseline_ev".to_string(), baseline_ev);
    metadata.insert("deviated_ev".to_string(), deviated_ev);
    metadata.insert("shift".to_string(), shift);
    metadata.insert("locked".to_string(), if locked { 1.0 } else { 0.0 });

    log::debug!(
        "deviation at node '{}': ev gain {:.4}, exploitability {:.4}{}",
        request.node_id,
        deviated_ev - baseline_ev,
        exploitability,
        if locked { " (locked)" } else { "" }
    );

    DeviationResult {
        node_id: request.node_id.clone(),
        strategy: deviated,
        ev_gain: deviated_ev - baseline_ev,
        exploitability,
        best_action,
        profile,
        locked,
        metadata,
    }
}
