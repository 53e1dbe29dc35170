use std::fs;

use crate::{constants::EPS, types::WeightVec};

/// Clamps a raw action into [0, 1] per entry and rescales it to sum to 1.
/// Both the trader's action processor and the environment's noise path go
/// through here so the weight invariant has a single owner.
pub fn renormalize_weights(raw: WeightVec) -> WeightVec {
    let clipped = raw.mapv(|w| w.clamp(0.0, 1.0));
    let total = clipped.sum() + EPS;
    clipped / total
}

pub fn create_folder_if_not_exists(path: &str) {
    if fs::metadata(path).is_err() {
        fs::create_dir_all(path).expect("unable to create directory");
    }
}

/// Render a weight or price vector as fixed-precision comma-joined decimals,
/// the layout the per-episode history files use.
pub fn join_fixed(values: &[f64], precision: usize) -> String {
    values
        .iter()
        .map(|v| format!("{v:.precision$}"))
        .collect::<Vec<String>>()
        .join(",")
}
