use ndarray::{Array1, Array3};

/// A list of values ordered by time, where the last index is the most recent
pub type Data = Vec<f64>;

/// Portfolio allocation across assets plus cash, non-negative, summing to 1.
/// Index 0 is cash.
pub type WeightVec = Array1<f64>;

/// One observation window, laid out as (features, assets, window).
pub type StateWindow = Array3<f64>;
