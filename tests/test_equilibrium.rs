use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use gto_engine::config::SolverConfig;
use gto_engine::equilibrium::PlayerPair;
use gto_engine::{EquilibriumFacade, PayoffMatrix};

fn pennies() -> PayoffMatrix {
    PayoffMatrix::new(vec![vec![1.0, -1.0], vec![-1.0, 1.0]]).unwrap()
}

fn pair(row: &str, col: &str) -> PlayerPair {
    (row.to_string(), col.to_string())
}

#[test]
fn headsup_names_strategies() {
    let facade = EquilibriumFacade::default();
    let solution = facade
        .solve_headsup(("btn", "bb"), &pennies(), 2000, None)
        .unwrap();

    assert_eq!(solution.strategies.len(), 2);
    assert_abs_diff_eq!(solution.strategies["btn"][0], 0.5, epsilon = 0.05);
    assert_abs_diff_eq!(solution.strategies["bb"][1], 0.5, epsilon = 0.05);
    assert!(solution.exploitability < 0.05);
    assert_eq!(solution.iterations, 2000);
}

#[test]
fn headsup_needs_distinct_players() {
    let facade = EquilibriumFacade::default();
    let err = facade
        .solve_headsup(("hero", "hero"), &pennies(), 10, None)
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn headsup_warm_start_checks_shape() {
    let facade = EquilibriumFacade::default();
    let bad = facade.solve_headsup(("a", "b"), &pennies(), 10, Some((&[1.0][..], &[0.5, 0.5][..])));
    assert!(bad.unwrap_err().is_invalid_input());

    let ok = facade.solve_headsup(("a", "b"), &pennies(), 10, Some((&[0.5, 0.5][..], &[0.5, 0.5][..])));
    assert!(ok.is_ok());
}

#[test]
fn multiway_averages_pairwise_strategies() {
    // A vs B pushes A to its first action, A vs C to its second
    let mut pairs = BTreeMap::new();
    pairs.insert(
        pair("A", "B"),
        PayoffMatrix::new(vec![vec![2.0, 3.0], vec![0.0, 1.0]]).unwrap(),
    );
    pairs.insert(
        pair("A", "C"),
        PayoffMatrix::new(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap(),
    );

    let facade = EquilibriumFacade::default();
    let solution = facade.solve_multiway(&pairs, 1000).unwrap();

    assert_eq!(solution.pairwise.len(), 2);
    assert_eq!(
        solution.strategies.keys().cloned().collect::<Vec<_>>(),
        vec!["A", "B", "C"]
    );
    assert_abs_diff_eq!(solution.strategies["A"][0], 0.5, epsilon = 0.01);
    assert_abs_diff_eq!(solution.strategies["A"].iter().sum::<f64>(), 1.0, epsilon = 1e-9);

    let mean = solution
        .pairwise
        .iter()
        .map(|p| p.solution.exploitability)
        .sum::<f64>()
        / 2.0;
    assert_abs_diff_eq!(solution.mean_exploitability, mean, epsilon = 1e-12);
}

#[test]
fn multiway_player_appearing_once_keeps_its_strategy() {
    let mut pairs = BTreeMap::new();
    pairs.insert(pair("A", "B"), pennies());
    pairs.insert(
        pair("A", "C"),
        PayoffMatrix::new(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).unwrap(),
    );

    let facade = EquilibriumFacade::default();
    let solution = facade.solve_multiway(&pairs, 500).unwrap();
    let c_pair = solution
        .pairwise
        .iter()
        .find(|p| p.col_player == "C")
        .unwrap();

    assert_eq!(solution.strategies["C"].len(), 3);
    for (a, b) in solution.strategies["C"].iter().zip(&c_pair.solution.player_two) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn multiway_rejects_inconsistent_action_counts() {
    let mut pairs = BTreeMap::new();
    pairs.insert(pair("A", "B"), pennies());
    pairs.insert(
        pair("A", "C"),
        PayoffMatrix::new(vec![vec![1.0], vec![0.0], vec![-1.0]]).unwrap(),
    );

    let facade = EquilibriumFacade::default();
    assert!(facade.solve_multiway(&pairs, 10).unwrap_err().is_invalid_input());
}

#[test]
fn multiway_rejects_duplicate_orientation_and_self_pairs() {
    let facade = EquilibriumFacade::default();

    let mut both = BTreeMap::new();
    both.insert(pair("A", "B"), pennies());
    both.insert(pair("B", "A"), pennies());
    assert!(facade.solve_multiway(&both, 10).is_err());

    let mut selfish = BTreeMap::new();
    selfish.insert(pair("A", "A"), pennies());
    assert!(facade.solve_multiway(&selfish, 10).is_err());

    assert!(facade.solve_multiway(&BTreeMap::new(), 10).is_err());
}

#[test]
fn realtime_update_stays_near_prior() {
    let matrix = PayoffMatrix::new(vec![vec![2.0, -1.0], vec![-1.0, 1.0]]).unwrap();
    let facade = EquilibriumFacade::new(SolverConfig {
        warm_start_weight: 10.0,
        ..SolverConfig::default()
    });

    let cold = facade.solve_headsup(("r", "c"), &matrix, 5000, None).unwrap();
    let update = facade
        .approximate_realtime_update(&matrix, (&cold.strategies["r"], &cold.strategies["c"]), 100)
        .unwrap();

    assert_eq!(update.iterations, 100);
    assert_eq!(update.player_one.len(), 2);
    assert_abs_diff_eq!(update.player_one[0], cold.strategies["r"][0], epsilon = 0.1);
    assert!(update.exploitability >= 0.0);
}

#[test]
fn realtime_update_rejects_wrong_prior_length() {
    let facade = EquilibriumFacade::default();
    let err = facade
        .approximate_realtime_update(&pennies(), (&[1.0, 0.0, 0.0], &[0.5, 0.5]), 10)
        .unwrap_err();
    assert!(err.is_invalid_input());
}
