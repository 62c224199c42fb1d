use approx::assert_abs_diff_eq;
use gto_engine::config::ExploitConfig;
use gto_engine::exploit::{maximum_exploitation, Simplification, PROFILE_METADATA_KEY};
use gto_engine::population::{OpponentTendency, PopulationProfile, TendencyStats};
use gto_engine::strategy::{blend, ActionValues, ResolutionMethod};
use gto_engine::{DeviationRequest, ExploitationEngine, Strategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn baseline() -> Strategy {
    [("fold", 0.6), ("call", 0.2), ("raise", 0.2)].into_iter().collect()
}

fn evs(pairs: &[(&str, f64)]) -> ActionValues {
    pairs.iter().map(|(a, v)| (a.to_string(), *v)).collect()
}

fn facing_bet() -> ActionValues {
    evs(&[("fold", 0.0), ("call", 1.0), ("raise", 3.0)])
}

#[test]
fn shifts_toward_highest_ev_action() {
    let engine = ExploitationEngine::default();
    let request = DeviationRequest::new("river_facing_bet", baseline(), facing_bet()).with_max_shift(0.3);
    let result = engine.compute_deviation(&request).unwrap();

    assert_abs_diff_eq!(result.strategy.get("raise"), 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(result.strategy.get("fold"), 0.375, epsilon = 1e-9);
    assert_abs_diff_eq!(result.strategy.get("call"), 0.125, epsilon = 1e-9);
    assert_abs_diff_eq!(result.ev_gain, 0.825, epsilon = 1e-9);
    assert_abs_diff_eq!(result.exploitability, 0.3, epsilon = 1e-9);
    assert_eq!(result.best_action.as_deref(), Some("raise"));
    assert!(!result.locked);
    assert_abs_diff_eq!(result.metadata["baseline_ev"], 0.8, epsilon = 1e-9);
    assert_abs_diff_eq!(result.metadata["shift"], 0.3, epsilon = 1e-9);
}

#[test]
fn shift_never_exceeds_budget() {
    let mut rng = StdRng::seed_from_u64(42);
    let names = ["fold", "check", "call", "bet", "raise"];

    for _ in 0..200 {
        let n = rng.gen_range(2..=names.len());
        let strategy: Strategy = names[..n]
            .iter()
            .map(|a| (*a, rng.gen_range(0.0..1.0)))
            .collect::<Strategy>()
            .normalized();
        let values: ActionValues = names[..n]
            .iter()
            .map(|a| (a.to_string(), rng.gen_range(-5.0..5.0)))
            .collect();
        let max_shift = rng.gen_range(0.0..=1.0);

        let (out, moved) = maximum_exploitation(&strategy, &values, max_shift);
        assert!(moved <= max_shift + 1e-9, "moved {} > {}", moved, max_shift);
        assert!(out.is_normalized());
        assert!(out.expected_value(&values) >= strategy.expected_value(&values) - 1e-9);

        let l1 = strategy.l1_distance(&out);
        assert!(l1 <= 2.0 * max_shift + 1e-9, "l1 {} for shift {}", l1, max_shift);
    }
}

#[test]
fn zero_budget_keeps_baseline() {
    let engine = ExploitationEngine::default();
    let request = DeviationRequest::new("n", baseline(), facing_bet()).with_max_shift(0.0);
    let result = engine.compute_deviation(&request).unwrap();

    assert_abs_diff_eq!(result.ev_gain, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(result.exploitability, 0.0, epsilon = 1e-12);
}

#[test]
fn unnormalized_baseline_is_normalized_first() {
    let engine = ExploitationEngine::default();
    let scaled: Strategy = [("fold", 6.0), ("call", 2.0), ("raise", 2.0)].into_iter().collect();
    let a = engine
        .compute_deviation(&DeviationRequest::new("n", scaled, facing_bet()).with_max_shift(0.3))
        .unwrap();
    let b = engine
        .compute_deviation(&DeviationRequest::new("n", baseline(), facing_bet()).with_max_shift(0.3))
        .unwrap();
    assert_abs_diff_eq!(a.ev_gain, b.ev_gain, epsilon = 1e-9);
    assert_abs_diff_eq!(a.strategy.get("raise"), b.strategy.get("raise"), epsilon = 1e-9);
}

#[test]
fn invalid_requests_rejected() {
    let engine = ExploitationEngine::default();

    let empty_evs = DeviationRequest::new("n", baseline(), ActionValues::new());
    assert!(engine.compute_deviation(&empty_evs).unwrap_err().is_invalid_input());

    let negative: Strategy = [("fold", -0.1), ("call", 1.1)].into_iter().collect();
    assert!(engine
        .compute_deviation(&DeviationRequest::new("n", negative, facing_bet()))
        .is_err());

    let too_far = DeviationRequest::new("n", baseline(), facing_bet()).with_max_shift(1.5);
    assert!(engine.compute_deviation(&too_far).is_err());

    let bad_simplification = DeviationRequest::new("n", baseline(), facing_bet())
        .with_simplification(Simplification::new(None, Some(0)));
    assert!(engine.compute_deviation(&bad_simplification).is_err());
}

#[test]
fn simplification_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(5);
    let names = ["a", "b", "c", "d", "e", "f"];
    let simplification = Simplification::new(Some(0.05), Some(3));

    for _ in 0..100 {
        let strategy: Strategy = names
            .iter()
            .map(|a| (*a, rng.gen_range(0.0..1.0)))
            .collect::<Strategy>()
            .normalized();
        let once = simplification.apply(&strategy);
        let twice = simplification.apply(&once);

        assert!(once.len() <= 3);
        assert!(once.is_normalized());
        assert_eq!(once.actions().collect::<Vec<_>>(), twice.actions().collect::<Vec<_>>());
        for (action, p) in once.iter() {
            assert_abs_diff_eq!(p, twice.get(action), epsilon = 1e-9);
        }
    }
}

#[test]
fn simplification_falls_back_to_most_likely() {
    let spread: Strategy = [("a", 0.3), ("b", 0.35), ("c", 0.35)].into_iter().collect();
    let out = Simplification::new(Some(0.5), None).apply(&spread);
    assert_eq!(out, Strategy::pure("b"));
}

#[test]
fn locked_node_returns_pure_strategy() {
    let mut engine = ExploitationEngine::default();
    engine.locks_mut().lock("flop_cbet", "call").unwrap();

    let request = DeviationRequest::new("flop_cbet", baseline(), facing_bet()).with_max_shift(0.3);
    let result = engine.compute_deviation(&request).unwrap();

    assert!(result.locked);
    assert_eq!(result.strategy, Strategy::pure("call"));
    assert_abs_diff_eq!(result.ev_gain, 1.0 - 0.8, epsilon = 1e-9);

    assert_eq!(engine.locks_mut().unlock("flop_cbet").as_deref(), Some("call"));
    let unlocked = engine.compute_deviation(&request).unwrap();
    assert!(!unlocked.locked);
}

#[test]
fn profile_selected_by_metadata_name() {
    let engine = ExploitationEngine::default();
    let mut request = DeviationRequest::new("n", baseline(), facing_bet()).with_max_shift(0.0);
    request
        .metadata
        .insert(PROFILE_METADATA_KEY.to_string(), "calling_station".to_string());

    let result = engine.compute_deviation(&request).unwrap();
    assert_eq!(result.profile.as_deref(), Some("calling_station"));
    assert!(result.strategy.get("call") > 0.2);
    assert!(result.strategy.get("fold") < 0.6);

    let unknown = DeviationRequest::new("n", baseline(), facing_bet()).with_profile_name("whale");
    assert!(engine.compute_deviation(&unknown).unwrap_err().is_invalid_input());
}

#[test]
fn explicit_profile_wins_over_stats() {
    let engine = ExploitationEngine::default();
    let custom = PopulationProfile::new("custom", &[("raise", 0.2)]);
    let stats = TendencyStats {
        vpip: 0.12,
        pfr: 0.08,
        aggression_factor: 1.0,
        hands: 500,
    };
    let request = DeviationRequest::new("n", baseline(), facing_bet())
        .with_max_shift(0.0)
        .with_stats(stats)
        .with_profile(custom);

    let result = engine.compute_deviation(&request).unwrap();
    assert_eq!(result.profile.as_deref(), Some("custom"));
}

#[test]
fn stats_pick_builtin_profile() {
    let engine = ExploitationEngine::default();
    let stats = TendencyStats {
        vpip: 0.12,
        pfr: 0.08,
        aggression_factor: 1.0,
        hands: 500,
    };
    let request = DeviationRequest::new("n", baseline(), facing_bet())
        .with_max_shift(0.0)
        .with_stats(stats.clone());
    let result = engine.compute_deviation(&request).unwrap();
    assert_eq!(result.profile.as_deref(), Some(stats.classify().as_str()));

    // too few hands: no profile at all
    let thin = TendencyStats { hands: 5, ..stats };
    let request = DeviationRequest::new("n", baseline(), facing_bet()).with_stats(thin);
    assert!(engine.compute_deviation(&request).unwrap().profile.is_none());
}

#[test]
fn significant_tendencies_move_baseline() {
    let engine = ExploitationEngine::new(ExploitConfig::default());
    let folds_too_much = OpponentTendency {
        situation: "facing_cbet".to_string(),
        action: "fold".to_string(),
        frequency: 0.9,
        sample_size: 200,
        confidence: 0.9,
    };
    let noise = OpponentTendency {
        sample_size: 3,
        ..folds_too_much.clone()
    };

    let request = DeviationRequest::new("n", baseline(), facing_bet())
        .with_max_shift(0.0)
        .with_tendencies(vec![folds_too_much]);
    let result = engine.compute_deviation(&request).unwrap();
    assert_eq!(result.profile.as_deref(), Some("observed"));
    assert!(result.strategy.get("fold") > 0.6);

    let request = DeviationRequest::new("n", baseline(), facing_bet())
        .with_max_shift(0.0)
        .with_tendencies(vec![noise]);
    let result = engine.compute_deviation(&request).unwrap();
    assert!(result.profile.is_none());
}

#[test]
fn blending_sources() {
    let aggressive: Strategy = [("call", 0.2), ("raise", 0.8)].into_iter().collect();
    let passive: Strategy = [("call", 0.8), ("raise", 0.2)].into_iter().collect();
    let sources = vec![(aggressive.clone(), 0.75), (passive, 0.25)];

    let voted = blend(&sources, ResolutionMethod::WeightedVote).unwrap();
    assert_abs_diff_eq!(voted.get("raise"), 0.65, epsilon = 1e-9);
    assert!(voted.is_normalized());

    let top = blend(&sources, ResolutionMethod::HighestConfidence).unwrap();
    assert_abs_diff_eq!(top.get("raise"), aggressive.get("raise"), epsilon = 1e-12);

    assert!(blend(&[], ResolutionMethod::WeightedVote).is_err());
    assert!("majority".parse::<ResolutionMethod>().is_err());
}
