//! Closed-form estimators behind the serving layer.
//!
//! Level 1 is the exact path; levels 2 and 3 are fast heuristics with lower
//! reported confidence. Inputs are read from the query's parameters (which
//! shadow its game state):
//!
//! | query  | required               | optional                                    |
//! |--------|------------------------|---------------------------------------------|
//! | range  | `position`             | `stack` (bb)                                |
//! | action | `pot`, `equity`        | `to_call`, `raise_size`, `fold_probability` |
//! | equity | `hand_strength`        | `texture`, `opponents`, `outs`, `street`    |
//! | ev     | `pot`, `bet`, `win_probability` or `equity` | `rake`                 |
//!
//! `pot` excludes the bet currently faced.

use crate::error::{GtoError, GtoResult};
use crate::math_engine::{ev, fold_equity, mdf, pot_odds, semi_bluff_ev};
use crate::query::{Answer, QueryResult, QueryType, StrategyQuery};
use crate::strategy::{ActionValues, Strategy};

/// Confidence of an unrefined exact computation.
pub const EXACT_CONFIDENCE: f64 = 0.85;
/// Upper bound reached through progressive refinement.
pub const REFINED_CONFIDENCE_CEILING: f64 = 0.99;
/// Confidence added per refinement stage.
pub const REFINEMENT_STEP: f64 = 0.04;

/// Extra equity over the price needed before raising instead of calling.
const RAISE_MARGIN: f64 = 0.15;

pub fn confidence_for_level(level: u8) -> f64 {
    match level {
        0 | 1 => EXACT_CONFIDENCE,
        2 => 0.75,
        _ => 0.6,
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Fast heuristic answer for levels >= 2.
pub fn approximate(query: &StrategyQuery, level: u8) -> GtoResult<QueryResult> {
    let coarse = level >= 3;
    let answer = match query.query_type {
        QueryType::Range => approximate_range(query, coarse)?,
        QueryType::Action => approximate_action(query)?,
        QueryType::Equity => approximate_equity(query, coarse)?,
        QueryType::Ev => approximate_ev(query)?,
    };
    Ok(QueryResult::new(
        query.query_type,
        answer,
        confidence_for_level(level),
        level,
    ))
}

/// Exact closed-form answer (level 1) for queries without a payoff matrix.
pub fn exact(query: &StrategyQuery) -> GtoResult<QueryResult> {
    let answer = match query.query_type {
        QueryType::Range => exact_range(query)?,
        QueryType::Action => exact_action(query)?,
        QueryType::Equity => exact_equity(query)?,
        QueryType::Ev => exact_ev(query)?,
    };
    Ok(QueryResult::new(query.query_type, answer, EXACT_CONFIDENCE, 1))
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// Opening-range fraction by seat.
fn position_range(position: &str) -> GtoResult<f64> {
    let fraction = match position.to_uppercase().as_str() {
        "UTG" => 0.15,
        "UTG1" => 0.16,
        "UTG2" => 0.17,
        "MP" => 0.19,
        "HJ" => 0.22,
        "CO" => 0.28,
        "BTN" => 0.45,
        "SB" => 0.40,
        "BB" => 0.55,
        other => {
            return Err(GtoError::invalid(format!("unknown position '{}'", other)));
        }
    };
    Ok(fraction)
}

fn range_position(query: &StrategyQuery) -> GtoResult<String> {
    match query.lookup("position").and_then(|v| v.as_str()) {
        Some(p) => Ok(p.to_uppercase()),
        None => Err(GtoError::invalid("range query needs 'position'")),
    }
}

fn approximate_range(query: &StrategyQuery, coarse: bool) -> GtoResult<Answer> {
    let position = range_position(query)?;
    let mut fraction = position_range(&position)?;
    if coarse {
        fraction = (fraction * 20.0).round() / 20.0;
    }
    Ok(Answer::Range {
        position,
        range_fraction: fraction,
    })
}

fn exact_range(query: &StrategyQuery) -> GtoResult<Answer> {
    let position = range_position(query)?;
    let stack = query.number_or("stack", 100.0)?;
    if stack <= 0.0 {
        return Err(GtoError::invalid("stack must be positive"));
    }
    // short stacks tighten, deep stacks widen slightly
    let depth_factor = if stack < 20.0 {
        0.85
    } else if stack > 150.0 {
        1.05
    } else {
        1.0
    };
    let fraction = (position_range(&position)? * depth_factor).min(1.0);
    Ok(Answer::Range {
        position,
        range_fraction: fraction,
    })
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

struct Spot {
    pot: f64,
    to_call: f64,
    equity: f64,
}

fn read_spot(query: &StrategyQuery) -> GtoResult<Spot> {
    let pot = query.number("pot")?;
    let to_call = query.number_or("to_call", 0.0)?;
    let equity = query.number("equity")?;
    if pot <= 0.0 {
        return Err(GtoError::invalid("pot must be positive"));
    }
    if to_call < 0.0 {
        return Err(GtoError::invalid("to_call must be non-negative"));
    }
    check_probability("equity", equity)?;
    Ok(Spot { pot, to_call, equity })
}

/// Pot odds against equity, no sizing model.
fn approximate_action(query: &StrategyQuery) -> GtoResult<Answer> {
    let spot = read_spot(query)?;
    let action = if spot.to_call == 0.0 {
        if spot.equity > 0.6 {
            "bet"
        } else {
            "check"
        }
    } else {
        let required = pot_odds(spot.pot, spot.to_call)?;
        if spot.equity >= required + RAISE_MARGIN && spot.equity > 0.55 {
            "raise"
        } else if spot.equity >= required {
            "call"
        } else {
            "fold"
        }
    };
    Ok(Answer::Action {
        action: action.to_string(),
        strategy: Strategy::pure(action),
        action_evs: ActionValues::new(),
    })
}

/// Per-action EVs with a fold-equity model for aggressive actions.
fn exact_action(query: &StrategyQuery) -> GtoResult<Answer> {
    let spot = read_spot(query)?;
    let mut evs = ActionValues::new();

    if spot.to_call == 0.0 {
        let bet = query.number_or("raise_size", spot.pot * 0.66)?;
        let fold_probability = fold_probability(query, bet, spot.pot)?;
        evs.insert("check".to_string(), spot.equity * spot.pot);
        evs.insert(
            "bet".to_string(),
            aggression_ev(fold_probability, spot.equity, spot.pot, bet),
        );
    } else {
        let facing = spot.pot + spot.to_call;
        let raise = query.number_or("raise_size", facing * 0.75)?;
        let fold_probability = fold_probability(query, raise, facing)?;
        evs.insert("fold".to_string(), 0.0);
        evs.insert("call".to_string(), ev(spot.equity, spot.pot, spot.to_call));
        evs.insert(
            "raise".to_string(),
            aggression_ev(fold_probability, spot.equity, facing, raise),
        );
    }

    let mut best: Option<(&String, f64)> = None;
    for (a, &v) in &evs {
        if best.map_or(true, |(_, bv)| v > bv) {
            best = Some((a, v));
        }
    }
    let action = match best {
        Some((a, _)) => a.clone(),
        None => return Err(GtoError::ComputationFailure("no candidate actions".to_string())),
    };

    Ok(Answer::Action {
        strategy: Strategy::pure(&action),
        action,
        action_evs: evs,
    })
}

/// A bet with no showdown equity wins only through folds.
fn aggression_ev(fold_probability: f64, equity: f64, pot: f64, bet: f64) -> f64 {
    if equity == 0.0 {
        fold_equity(fold_probability, pot, bet)
    } else {
        semi_bluff_ev(fold_probability, equity, pot, bet)
    }
}

/// Caller-supplied fold probability, or the share of hands an opponent
/// defending at minimum defense frequency would give up.
fn fold_probability(query: &StrategyQuery, bet: f64, pot: f64) -> GtoResult<f64> {
    if bet <= 0.0 {
        return Err(GtoError::invalid("raise_size must be positive"));
    }
    match query.lookup("fold_probability") {
        Some(_) => {
            let p = query.number("fold_probability")?;
            check_probability("fold_probability", p)?;
            Ok(p)
        }
        None => Ok(1.0 - mdf(bet, pot)?),
    }
}

// ---------------------------------------------------------------------------
// Equity
// ---------------------------------------------------------------------------

fn texture_adjustment(texture: &str) -> GtoResult<f64> {
    match texture.to_lowercase().as_str() {
        "dry" => Ok(0.03),
        "neutral" | "medium" => Ok(0.0),
        "paired" => Ok(-0.02),
        "wet" => Ok(-0.05),
        "monotone" => Ok(-0.07),
        other => Err(GtoError::invalid(format!("unknown board texture '{}'", other))),
    }
}

fn adjusted_strength(query: &StrategyQuery) -> GtoResult<f64> {
    let strength = query.number("hand_strength")?;
    check_probability("hand_strength", strength)?;
    let texture = query.text_or("texture", "neutral")?;
    Ok((strength + texture_adjustment(texture)?).clamp(0.0, 1.0))
}

fn approximate_equity(query: &StrategyQuery, coarse: bool) -> GtoResult<Answer> {
    let mut equity = adjusted_strength(query)?;
    if coarse {
        equity = (equity * 20.0).round() / 20.0;
    }
    Ok(Answer::Equity { equity })
}

fn exact_equity(query: &StrategyQuery) -> GtoResult<Answer> {
    let adjusted = adjusted_strength(query)?;
    let opponents = query.number_or("opponents", 1.0)?;
    if opponents < 1.0 {
        return Err(GtoError::invalid("opponents must be at least 1"));
    }
    let mut equity = adjusted.powf(opponents.floor());

    // rule of 2 and 4 for drawing hands
    let outs = match query.lookup("outs") {
        Some(_) => Some(query.number("outs")?),
        None => None,
    };
    if let Some(outs) = outs {
        if outs < 0.0 {
            return Err(GtoError::invalid("outs must be non-negative"));
        }
        let street = query.text_or("street", "flop")?;
        let per_out = if street.eq_ignore_ascii_case("flop") { 0.04 } else { 0.02 };
        equity = equity.max((outs * per_out).clamp(0.0, 1.0));
    }
    Ok(Answer::Equity { equity })
}

// ---------------------------------------------------------------------------
// EV
// ---------------------------------------------------------------------------

fn win_probability(query: &StrategyQuery) -> GtoResult<f64> {
    let p = match query.lookup("win_probability") {
        Some(_) => query.number("win_probability")?,
        None => query.number("equity")?,
    };
    check_probability("win_probability", p)?;
    Ok(p)
}

fn approximate_ev(query: &StrategyQuery) -> GtoResult<Answer> {
    let pot = query.number("pot")?;
    let bet = query.number("bet")?;
    let p = win_probability(query)?;
    Ok(Answer::Ev { ev: ev(p, pot, bet) })
}

fn exact_ev(query: &StrategyQuery) -> GtoResult<Answer> {
    let pot = query.number("pot")?;
    let bet = query.number("bet")?;
    let p = win_probability(query)?;
    let rake = query.number_or("rake", 0.0)?;
    check_probability("rake", rake)?;
    Ok(Answer::Ev {
        ev: p * (pot + bet) * (1.0 - rake) - (1.0 - p) * bet,
    })
}

fn check_probability(name: &str, p: f64) -> GtoResult<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(GtoError::invalid(format!("{} {} outside [0, 1]", name, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximation_confidence_below_exact() {
        assert!(confidence_for_level(2) < EXACT_CONFIDENCE);
        assert!(confidence_for_level(3) < confidence_for_level(2));
    }

    #[test]
    fn action_follows_pot_odds() {
        // needs 25% equity to call 50 into 100
        let q = StrategyQuery::new(QueryType::Action)
            .with_param("pot", 100.0)
            .with_param("to_call", 50.0);
        let answer = |eq: f64| match approximate(&q.clone().with_param("equity", eq), 2).unwrap().answer {
            Some(Answer::Action { action, .. }) => action,
            other => panic!("unexpected answer {:?}", other),
        };
        assert_eq!(answer(0.1), "fold");
        assert_eq!(answer(0.3), "call");
        assert_eq!(answer(0.7), "raise");
    }

    #[test]
    fn coarse_range_rounds() {
        let q = StrategyQuery::new(QueryType::Range).with_param("position", "hj");
        match approximate(&q, 3).unwrap().answer {
            Some(Answer::Range { position, range_fraction }) => {
                assert_eq!(position, "HJ");
                assert!((range_fraction - 0.2).abs() < 1e-12);
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn unknown_texture_rejected() {
        let q = StrategyQuery::new(QueryType::Equity)
            .with_param("hand_strength", 0.6)
            .with_param("texture", "rainbowish");
        assert!(approximate(&q, 2).unwrap_err().is_invalid_input());
    }

    #[test]
    fn exact_ev_applies_rake() {
        let q = StrategyQuery::new(QueryType::Ev)
            .with_param("pot", 100.0)
            .with_param("bet", 50.0)
            .with_param("win_probability", 0.5)
            .with_param("rake", 0.1);
        match exact(&q).unwrap().answer {
            Some(Answer::Ev { ev }) => assert!((ev - (0.5 * 150.0 * 0.9 - 25.0)).abs() < 1e-9),
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn outs_must_be_numeric() {
        let q = StrategyQuery::new(QueryType::Equity)
            .with_param("hand_strength", 0.1)
            .with_param("street", "flop");
        match exact(&q.clone().with_param("outs", 9.0)).unwrap().answer {
            Some(Answer::Equity { equity }) => assert!((equity - 0.36).abs() < 1e-12),
            other => panic!("unexpected answer {:?}", other),
        }
        assert!(exact(&q.clone().with_param("outs", "nine")).unwrap_err().is_invalid_input());
        assert!(exact(&q.with_param("outs", -2.0)).is_err());
    }

    #[test]
    fn pure_bluff_priced_by_fold_equity() {
        let q = StrategyQuery::new(QueryType::Action)
            .with_param("pot", 100.0)
            .with_param("to_call", 0.0)
            .with_param("equity", 0.0)
            .with_param("raise_size", 50.0)
            .with_param("fold_probability", 0.5);
        match exact(&q).unwrap().answer {
            Some(Answer::Action { action, action_evs, .. }) => {
                assert_eq!(action, "bet");
                assert!((action_evs["bet"] - fold_equity(0.5, 100.0, 50.0)).abs() < 1e-12);
                assert!((action_evs["bet"] - 25.0).abs() < 1e-12);
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }
}
