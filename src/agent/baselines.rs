use ndarray::Array1;

use crate::{
    agent::Agent,
    types::{StateWindow, WeightVec},
};

/// Fixed allocation policies the backtester compares the trained agent
/// against. None of them learn; they only implement `predict`.

/// Puts everything on the asset with the strongest growth over the
/// observation window.
pub struct Winner;

/// Uniform constant-rebalanced portfolio: 1/M on every slot including cash.
pub struct Ucrp;

/// Puts everything on the asset with the weakest growth over the window.
pub struct Loser;

/// Growth of each asset across the observation window, read from the first
/// configured feature (close by convention).
fn window_growth(state: &StateWindow) -> Vec<f64> {
    let (_, assets, window) = state.dim();
    (0..assets)
        .map(|a| state[[0, a, window - 1]] / state[[0, a, 0]])
        .collect()
}

fn all_in(slot: usize, len: usize) -> WeightVec {
    let mut weights = Array1::zeros(len);
    weights[slot] = 1.0;
    weights
}

impl Agent for Winner {
    fn label(&self) -> &'static str {
        "Winner"
    }

    fn predict(&mut self, state: &StateWindow, prev_weights: &WeightVec) -> WeightVec {
        let growth = window_growth(state);
        let best = growth
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(index, _)| index)
            .unwrap_or(0);
        all_in(best + 1, prev_weights.len())
    }
}

impl Agent for Ucrp {
    fn label(&self) -> &'static str {
        "UCRP"
    }

    fn predict(&mut self, _state: &StateWindow, prev_weights: &WeightVec) -> WeightVec {
        let len = prev_weights.len();
        Array1::from_elem(len, 1.0 / len as f64)
    }
}

impl Agent for Loser {
    fn label(&self) -> &'static str {
        "Loser"
    }

    fn predict(&mut self, state: &StateWindow, prev_weights: &WeightVec) -> WeightVec {
        let growth = window_growth(state);
        let worst = growth
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(index, _)| index)
            .unwrap_or(0);
        all_in(worst + 1, prev_weights.len())
    }
}
