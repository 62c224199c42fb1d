use crate::error::{GtoError, GtoResult};

/// Equity needed to call `bet` into `pot` (pot excludes the bet).
pub fn pot_odds(pot: f64, bet: f64) -> GtoResult<f64> {
    if pot <= 0.0 || bet <= 0.0 {
        return Err(GtoError::InvalidInput(
            "Pot and bet must be positive".to_string(),
        ));
    }
    Ok(bet / (pot + bet + bet))
}

pub fn ev(equity: f64, pot: f64, bet: f64) -> f64 {
    let win_amount = pot + bet;
    equity * win_amount - (1.0 - equity) * bet
}

pub fn mdf(bet_size: f64, pot_size: f64) -> GtoResult<f64> {
    if pot_size <= 0.0 {
        return Err(GtoError::InvalidInput("Pot must be positive".to_string()));
    }
    Ok(pot_size / (pot_size + bet_size))
}

pub fn fold_equity(fold_pct: f64, pot: f64, bet: f64) -> f64 {
    fold_pct * pot - (1.0 - fold_pct) * bet
}

/// EV of betting with some showdown equity when called.
pub fn semi_bluff_ev(fold_pct: f64, equity: f64, pot: f64, bet: f64) -> f64 {
    fold_pct * pot + (1.0 - fold_pct) * ev(equity, pot, bet)
}
