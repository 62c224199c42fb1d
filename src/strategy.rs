//! Action-keyed strategies and the shared normalization rule.
//!
//! A missing action has probability 0. Keys are kept ordered so iteration,
//! tie-breaking and serialization are deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GtoError, GtoResult};

/// Tolerance for "sums to one" checks on returned strategies.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Per-action expected values.
pub type ActionValues = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strategy(BTreeMap<String, f64>);

impl Strategy {
    pub fn new() -> Self {
        Strategy(BTreeMap::new())
    }

    /// Deterministic strategy: all mass on one action.
    pub fn pure(action: &str) -> Self {
        let mut s = Strategy::new();
        s.set(action, 1.0);
        s
    }

    /// Uniform over the given actions.
    pub fn uniform<S: AsRef<str>>(actions: &[S]) -> Self {
        let p = 1.0 / actions.len().max(1) as f64;
        actions.iter().map(|a| (a.as_ref().to_string(), p)).collect()
    }

    #[inline]
    pub fn get(&self, action: &str) -> f64 {
        self.0.get(action).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, action: &str, probability: f64) {
        self.0.insert(action.to_string(), probability);
    }

    pub fn contains(&self, action: &str) -> bool {
        self.0.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Divide by the sum, or go uniform over the keys when the sum is 0.
    pub fn normalize(&mut self) {
        if self.0.is_empty() {
            return;
        }
        let total = self.total();
        if total == 0.0 {
            let uniform = 1.0 / self.0.len() as f64;
            for v in self.0.values_mut() {
                *v = uniform;
            }
        } else {
            for v in self.0.values_mut() {
                *v /= total;
            }
        }
    }

    pub fn normalized(&self) -> Strategy {
        let mut s = self.clone();
        s.normalize();
        s
    }

    pub fn is_normalized(&self) -> bool {
        !self.0.is_empty()
            && self.0.values().all(|&p| p >= 0.0)
            && (self.total() - 1.0).abs() <= NORMALIZATION_TOLERANCE
    }

    /// Non-empty, every probability finite and non-negative.
    pub fn validate(&self, what: &str) -> GtoResult<()> {
        if self.0.is_empty() {
            return Err(GtoError::invalid(format!("{} strategy is empty", what)));
        }
        if let Some((action, p)) = self.0.iter().find(|(_, p)| !p.is_finite() || **p < 0.0) {
            return Err(GtoError::invalid(format!(
                "{} strategy has invalid probability {} for '{}'",
                what, p, action
            )));
        }
        Ok(())
    }

    /// Probability-weighted sum of action EVs; missing EVs count as 0.
    pub fn expected_value(&self, evs: &ActionValues) -> f64 {
        self.0
            .iter()
            .map(|(a, p)| p * evs.get(a).copied().unwrap_or(0.0))
            .sum()
    }

    /// L1 distance over the union of both key sets.
    pub fn l1_distance(&self, other: &Strategy) -> f64 {
        let mine: f64 = self.0.iter().map(|(a, p)| (p - other.get(a)).abs()).sum();
        let theirs: f64 = other
            .0
            .iter()
            .filter(|(a, _)| !self.0.contains_key(a.as_str()))
            .map(|(_, p)| p.abs())
            .sum();
        mine + theirs
    }

    /// Highest-probability action; first in key order on ties.
    pub fn most_likely(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (a, &p) in &self.0 {
            if best.map_or(true, |(_, bp)| p > bp) {
                best = Some((a.as_str(), p));
            }
        }
        best
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str, f64) -> bool) {
        self.0.retain(|a, p| keep(a, *p));
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.0.values_mut()
    }

    pub fn into_inner(self) -> BTreeMap<String, f64> {
        self.0
    }
}

impl From<BTreeMap<String, f64>> for Strategy {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Strategy(map)
    }
}

impl FromIterator<(String, f64)> for Strategy {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Strategy(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<(&'a str, f64)> for Strategy {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        Strategy(iter.into_iter().map(|(a, p)| (a.to_string(), p)).collect())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(a, p)| format!("{} {:.1}%", a, p * 100.0))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Blending several advice sources
// ---------------------------------------------------------------------------

/// How to combine several (strategy, confidence) sources into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Confidence-weighted average of the normalized sources.
    WeightedVote,
    /// The single most confident source.
    HighestConfidence,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::WeightedVote => "weighted_vote",
            ResolutionMethod::HighestConfidence => "highest_confidence",
        }
    }
}

impl FromStr for ResolutionMethod {
    type Err = GtoError;

    fn from_str(s: &str) -> GtoResult<Self> {
        match s.to_lowercase().as_str() {
            "weighted_vote" => Ok(ResolutionMethod::WeightedVote),
            "highest_confidence" => Ok(ResolutionMethod::HighestConfidence),
            _ => Err(GtoError::UnknownMethod(s.to_string())),
        }
    }
}

pub fn blend(sources: &[(Strategy, f64)], method: ResolutionMethod) -> GtoResult<Strategy> {
    if sources.is_empty() {
        return Err(GtoError::invalid("no strategies to blend"));
    }
    for (s, confidence) in sources {
        s.validate("blended")?;
        if !confidence.is_finite() || *confidence < 0.0 {
            return Err(GtoError::invalid(format!("invalid source confidence {}", confidence)));
        }
    }

    match method {
        ResolutionMethod::HighestConfidence => {
            let mut best = &sources[0];
            for source in &sources[1..] {
                if source.1 > best.1 {
                    best = source;
                }
            }
            Ok(best.0.normalized())
        }
        ResolutionMethod::WeightedVote => {
            let total_conf: f64 = sources.iter().map(|(_, c)| c).sum();
            let mut out = Strategy::new();
            for (s, confidence) in sources {
                let w = if total_conf > 0.0 {
                    confidence / total_conf
                } else {
                    1.0 / sources.len() as f64
                };
                for (a, p) in s.normalized().iter() {
                    let prev = out.get(a);
                    out.set(a, prev + w * p);
                }
            }
            out.normalize();
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(pairs: &[(&str, f64)]) -> Strategy {
        pairs.iter().copied().collect()
    }

    #[test]
    fn zero_sum_normalizes_to_uniform() {
        let mut st = s(&[("fold", 0.0), ("call", 0.0), ("raise", 0.0), ("check", 0.0)]);
        st.normalize();
        for (_, p) in st.iter() {
            assert!((p - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn normalize_divides_by_sum() {
        let st = s(&[("call", 2.0), ("fold", 6.0)]).normalized();
        assert!((st.get("call") - 0.25).abs() < 1e-12);
        assert!((st.get("fold") - 0.75).abs() < 1e-12);
        assert!(st.is_normalized());
    }

    #[test]
    fn missing_action_is_zero() {
        let st = s(&[("call", 1.0)]);
        assert_eq!(st.get("raise"), 0.0);
    }

    #[test]
    fn l1_distance_covers_union() {
        let a = s(&[("fold", 1.0)]);
        let b = s(&[("call", 1.0)]);
        assert!((a.l1_distance(&b) - 2.0).abs() < 1e-12);
        assert_eq!(a.l1_distance(&a), 0.0);
    }

    #[test]
    fn most_likely_breaks_ties_by_key() {
        let st = s(&[("raise", 0.5), ("call", 0.5)]);
        assert_eq!(st.most_likely().unwrap().0, "call");
    }

    #[test]
    fn unknown_resolution_method() {
        let err = "majority".parse::<ResolutionMethod>().unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(
            "weighted_vote".parse::<ResolutionMethod>().unwrap(),
            ResolutionMethod::WeightedVote
        );
    }

    #[test]
    fn weighted_vote_leans_to_confident_source() {
        let sources = vec![(s(&[("call", 1.0)]), 0.9), (s(&[("fold", 1.0)]), 0.1)];
        let out = blend(&sources, ResolutionMethod::WeightedVote).unwrap();
        assert!((out.get("call") - 0.9).abs() < 1e-9);
        assert!(out.is_normalized());

        let top = blend(&sources, ResolutionMethod::HighestConfidence).unwrap();
        assert_eq!(top.get("call"), 1.0);
    }

    #[test]
    fn blend_rejects_empty() {
        assert!(blend(&[], ResolutionMethod::WeightedVote).is_err());
    }
}
