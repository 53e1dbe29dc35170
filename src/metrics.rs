use crate::constants::{EPS, TRADING_DAYS};

/// Mean per-step simple return, as a percentage.
pub fn mean_daily_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().sum::<f64>() / returns.len() as f64 * 100.0
}

/// Annualized Sharpe ratio: mean / std * sqrt(252). Zero for series too
/// short or too flat to have a standard deviation.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std = variance.sqrt();
    // Constant series leave rounding residue in the deviations, so the flat
    // guard needs a tolerance rather than an exact zero.
    if std < EPS {
        return 0.0;
    }

    mean / std * TRADING_DAYS.sqrt()
}

/// Largest peak-to-trough relative decline of a wealth curve.
///
/// Running-peak formulation: the divisor is the maximum seen so far, which
/// for a positive wealth series is always positive, so degenerate (flat,
/// collapsing, or empty) series are well defined and never divide by zero.
pub fn max_drawdown(wealth: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut drawdown: f64 = 0.0;

    for value in wealth {
        if *value > peak {
            peak = *value;
        }
        if peak > 0.0 {
            drawdown = drawdown.max(1.0 - value / peak);
        }
    }

    drawdown
}
