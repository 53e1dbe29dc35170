use ndarray::Array1;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::constants::noise::{DT, SIGMA, THETA};

/// Mean-reverting exploration noise added to actions during training.
///
/// dx = theta * (mu - x) * dt + sigma * sqrt(dt) * N(0, 1)
///
/// The generator owns its rng so a fixed seed replays the same sequence.
pub struct OrnsteinUhlenbeckNoise {
    mu: Array1<f64>,
    theta: f64,
    sigma: f64,
    dt: f64,
    state: Array1<f64>,
    rng: StdRng,
}

impl OrnsteinUhlenbeckNoise {
    pub fn new(mu: Array1<f64>, seed: u64) -> Self {
        Self::with_params(mu, THETA, SIGMA, DT, seed)
    }

    pub fn with_params(mu: Array1<f64>, theta: f64, sigma: f64, dt: f64, seed: u64) -> Self {
        let state = mu.clone();
        OrnsteinUhlenbeckNoise {
            mu,
            theta,
            sigma,
            dt,
            state,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advances the process one step and returns the new value.
    pub fn sample(&mut self) -> Array1<f64> {
        let gauss = Array1::from_iter(
            (0..self.state.len()).map(|_| self.rng.sample::<f64, _>(StandardNormal)),
        );
        let drift = (&self.mu - &self.state) * (self.theta * self.dt);
        let diffusion = gauss * (self.sigma * self.dt.sqrt());

        self.state = &self.state + &drift + &diffusion;
        self.state.clone()
    }

    /// Reinitializes the process to its mean.
    pub fn reset(&mut self) {
        self.state = self.mu.clone();
    }
}
