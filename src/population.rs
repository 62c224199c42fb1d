//! Opponent-population inputs to the exploitation engine: observed
//! tendencies, aggregate stats, and named additive-bias profiles.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::ExploitConfig;
use crate::error::{GtoError, GtoResult};
use crate::strategy::Strategy;

// ---------------------------------------------------------------------------
// Tendencies
// ---------------------------------------------------------------------------

/// Observed action frequency for one decision situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentTendency {
    pub situation: String,
    pub action: String,
    pub frequency: f64,
    pub sample_size: u32,
    pub confidence: f64,
}

impl OpponentTendency {
    /// Both confidence and sample size must clear their thresholds.
    pub fn is_significant(&self, min_confidence: f64, min_samples: u32) -> bool {
        self.confidence >= min_confidence && self.sample_size >= min_samples
    }
}

/// Aggregate VPIP / PFR / aggression-factor summary for an opponent pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TendencyStats {
    pub vpip: f64,
    pub pfr: f64,
    pub aggression_factor: f64,
    pub hands: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStyle {
    Nit,
    TightPassive,
    TightAggressive,
    CallingStation,
    LooseAggressive,
}

impl PlayerStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStyle::Nit => "nit",
            PlayerStyle::TightPassive => "tight_passive",
            PlayerStyle::TightAggressive => "tight_aggressive",
            PlayerStyle::CallingStation => "calling_station",
            PlayerStyle::LooseAggressive => "loose_aggressive",
        }
    }
}

impl fmt::Display for PlayerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TendencyStats {
    pub fn classify(&self) -> PlayerStyle {
        let aggressive = self.aggression_factor >= 2.0;
        if self.vpip < 0.15 {
            PlayerStyle::Nit
        } else if self.vpip < 0.25 {
            if aggressive {
                PlayerStyle::TightAggressive
            } else {
                PlayerStyle::TightPassive
            }
        } else if aggressive && self.pfr >= self.vpip * 0.5 {
            PlayerStyle::LooseAggressive
        } else {
            PlayerStyle::CallingStation
        }
    }

    pub fn is_significant(&self, min_samples: u32) -> bool {
        self.hands >= min_samples
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Named per-action additive probability biases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationProfile {
    pub name: String,
    pub biases: BTreeMap<String, f64>,
}

impl PopulationProfile {
    pub fn new(name: &str, biases: &[(&str, f64)]) -> Self {
        PopulationProfile {
            name: name.to_string(),
            biases: biases.iter().map(|(a, b)| (a.to_string(), *b)).collect(),
        }
    }

    /// Add each action's bias, floor at 0, renormalize. Biases for actions
    /// missing from the baseline are ignored.
    pub fn apply(&self, baseline: &Strategy) -> Strategy {
        let mut out: Strategy = baseline
            .iter()
            .map(|(a, p)| (a, (p + self.biases.get(a).copied().unwrap_or(0.0)).max(0.0)))
            .collect();
        out.normalize();
        out
    }

    /// Sum of both profiles' biases.
    pub fn combined(&self, other: &PopulationProfile) -> PopulationProfile {
        let mut biases = self.biases.clone();
        for (a, b) in &other.biases {
            *biases.entry(a.clone()).or_insert(0.0) += b;
        }
        PopulationProfile {
            name: format!("{}+{}", self.name, other.name),
            biases,
        }
    }

    /// Profile built from significant tendencies:
    /// `bias = weight * confidence * (frequency - baseline)`.
    pub fn from_tendencies(
        tendencies: &[OpponentTendency],
        baseline: &Strategy,
        config: &ExploitConfig,
    ) -> Option<PopulationProfile> {
        let mut biases = BTreeMap::new();
        for t in tendencies {
            if !t.is_significant(config.min_tendency_confidence, config.min_tendency_samples) {
                continue;
            }
            if !baseline.contains(&t.action) {
                continue;
            }
            let bias = config.tendency_weight * t.confidence * (t.frequency - baseline.get(&t.action));
            *biases.entry(t.action.clone()).or_insert(0.0) += bias;
        }
        if biases.is_empty() {
            None
        } else {
            Some(PopulationProfile {
                name: "observed".to_string(),
                biases,
            })
        }
    }
}

static BUILTIN_PROFILES: Lazy<Vec<PopulationProfile>> = Lazy::new(|| {
    vec![
        PopulationProfile::new("nit", &[("fold", 0.10), ("call", -0.05), ("raise", -0.05)]),
        PopulationProfile::new("tight_passive", &[("fold", 0.05), ("call", 0.05), ("raise", -0.10)]),
        PopulationProfile::new("tight_aggressive", &[("fold", 0.05), ("call", -0.10), ("raise", 0.05)]),
        PopulationProfile::new("calling_station", &[("fold", -0.15), ("call", 0.20), ("raise", -0.05)]),
        PopulationProfile::new("loose_aggressive", &[("fold", -0.10), ("call", -0.05), ("raise", 0.15)]),
    ]
});

/// Name-indexed profile store owned by an exploitation engine.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, PopulationProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        ProfileRegistry::default()
    }

    /// Registry pre-loaded with one profile per [`PlayerStyle`].
    pub fn with_builtin() -> Self {
        let mut registry = ProfileRegistry::new();
        for p in BUILTIN_PROFILES.iter() {
            registry.profiles.insert(p.name.clone(), p.clone());
        }
        registry
    }

    /// Insert or replace a profile. Returns the previous one, if any.
    pub fn register(&mut self, profile: PopulationProfile) -> GtoResult<Option<PopulationProfile>> {
        if profile.name.is_empty() {
            return Err(GtoError::invalid("population profile needs a name"));
        }
        if let Some((a, b)) = profile.biases.iter().find(|(_, b)| !b.is_finite()) {
            return Err(GtoError::invalid(format!("non-finite bias {} for '{}'", b, a)));
        }
        Ok(self.profiles.insert(profile.name.clone(), profile))
    }

    pub fn get(&self, name: &str) -> Option<&PopulationProfile> {
        self.profiles.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<PopulationProfile> {
        self.profiles.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profile matching the classified style of `stats`.
    pub fn for_stats(&self, stats: &TendencyStats) -> Option<&PopulationProfile> {
        self.get(stats.classify().as_str())
    }
}
