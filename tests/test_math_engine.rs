//! Closed-form helpers behind the approximation and exact query paths.

use gto_engine::math_engine::*;

#[test]
fn pot_odds_textbook_cases() {
    // bet / (pot + 2 * bet)
    let cases: &[(f64, f64, f64)] = &[
        (100.0, 50.0, 0.25),
        (100.0, 100.0, 1.0 / 3.0),
        (50.0, 150.0, 150.0 / 350.0),
    ];
    for &(pot, bet, expected) in cases {
        let result = pot_odds(pot, bet).unwrap();
        assert!(
            (result - expected).abs() < 1e-9,
            "pot_odds({}, {}) = {}, expected {}",
            pot,
            bet,
            result,
            expected
        );
    }
}

#[test]
fn pot_odds_rejects_empty_pot() {
    assert!(pot_odds(0.0, 50.0).unwrap_err().is_invalid_input());
    assert!(pot_odds(100.0, 0.0).is_err());
}

#[test]
fn ev_is_zero_at_break_even_equity() {
    for &(pot, bet) in &[(100.0, 50.0), (200.0, 100.0), (60.0, 20.0), (80.0, 80.0)] {
        let equity = pot_odds(pot, bet).unwrap();
        assert!(ev(equity, pot, bet).abs() < 1e-9, "pot {} bet {}", pot, bet);
    }
}

#[test]
fn ev_sign_follows_equity() {
    assert!(ev(0.5, 100.0, 50.0) > 0.0);
    assert!(ev(0.1, 100.0, 100.0) < 0.0);
}

#[test]
fn mdf_matches_bet_sizes() {
    assert!((mdf(50.0, 100.0).unwrap() - 2.0 / 3.0).abs() < 1e-9);
    assert!((mdf(100.0, 100.0).unwrap() - 0.5).abs() < 1e-9);
    assert!(mdf(50.0, 0.0).is_err());
}

#[test]
fn semi_bluff_beats_pure_bluff_with_equity() {
    let bluff = fold_equity(0.3, 100.0, 75.0);
    let semi = semi_bluff_ev(0.3, 0.35, 100.0, 75.0);
    assert!(semi > bluff);
    assert!(fold_equity(0.6, 100.0, 75.0) > 0.0);
}
