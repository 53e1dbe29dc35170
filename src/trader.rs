use std::{error::Error, fs};

use colored::Colorize;
use ndarray::Array1;

use crate::{
    agent::TrainStats,
    constants::INITIAL_WEALTH,
    noise::OrnsteinUhlenbeckNoise,
    types::WeightVec,
    utils::{join_fixed, renormalize_weights},
};

/// Per-episode accumulator: running sums for the metric banner plus ordered
/// histories flushed to a delimited file at episode end.
pub struct StockTrader {
    pub wealth: f64,
    pub total_reward: f64,
    pub ep_ave_max_q: f64,
    pub loss: f64,
    pub actor_loss: f64,
    pub wealth_history: Vec<f64>,
    pub r_history: Vec<f64>,
    pub w_history: Vec<String>,
    pub p_history: Vec<String>,
    noise: OrnsteinUhlenbeckNoise,
}

impl StockTrader {
    pub fn new(asset_count: usize, seed: u64) -> Self {
        StockTrader {
            wealth: INITIAL_WEALTH,
            total_reward: 0.0,
            ep_ave_max_q: 0.0,
            loss: 0.0,
            actor_loss: 0.0,
            wealth_history: Vec::new(),
            r_history: Vec::new(),
            w_history: Vec::new(),
            p_history: Vec::new(),
            noise: OrnsteinUhlenbeckNoise::new(Array1::zeros(asset_count), seed),
        }
    }

    /// Restores every accumulator to its initial value for the next episode.
    pub fn reset(&mut self) {
        self.wealth = INITIAL_WEALTH;
        self.total_reward = 0.0;
        self.ep_ave_max_q = 0.0;
        self.loss = 0.0;
        self.actor_loss = 0.0;
        self.wealth_history.clear();
        self.r_history.clear();
        self.w_history.clear();
        self.p_history.clear();
        self.noise.reset();
    }

    /// Folds one step into the running sums; wealth compounds by exp(r).
    pub fn update_summary(
        &mut self,
        stats: &TrainStats,
        reward: f64,
        weights: &WeightVec,
        price: &Array1<f64>,
    ) {
        self.loss += stats.loss;
        self.actor_loss += stats.actor_loss;
        self.ep_ave_max_q += stats.q_value;
        self.total_reward += reward;

        self.wealth *= reward.exp();
        self.wealth_history.push(self.wealth);
        self.r_history.push(reward);
        self.w_history.push(join_fixed(weights.as_slice().unwrap(), 2));
        self.p_history.push(join_fixed(price.as_slice().unwrap(), 3));
    }

    /// Adds scaled exploration noise and renormalizes so the result is a
    /// valid weight vector.
    pub fn action_processor(&mut self, action: &WeightVec, ratio: f64) -> WeightVec {
        renormalize_weights(action + &(self.noise.sample() * ratio))
    }

    /// Cumulative episode return as a percentage of starting wealth.
    pub fn final_return(&self) -> f64 {
        self.r_history.iter().sum::<f64>().exp() * 100.0
    }

    /// Flushes the histories to `<prefix><agent><codes>-<return>.csv` with
    /// columns [wealth, return, weights, prices]; the vector columns are
    /// quoted since their entries are comma-joined.
    pub fn write(&self, prefix: &str, codes: &[String], agent: &str) -> Result<(), Box<dyn Error>> {
        let mut out = String::from("wealth,return,weights,prices\n");
        for step in 0..self.wealth_history.len() {
            out.push_str(&format!(
                "{},{},\"{}\",\"{}\"\n",
                self.wealth_history[step], self.r_history[step], self.w_history[step],
                self.p_history[step],
            ));
        }

        let path = format!(
            "{prefix}{agent}{}-{}.csv",
            codes.join("-"),
            self.final_return()
        );
        fs::write(path, out)?;
        Ok(())
    }

    pub fn print_result(&self, epoch: usize) {
        let reward = self.final_return();
        let reward_str = if reward >= 100.0 {
            format!("{reward:.6}%").green()
        } else {
            format!("{reward:.6}%").red()
        };
        println!(
            "{} {epoch} - Reward: {reward_str} | Loss: {:.6} | Actor loss: {:.6} | Max Q: {:.6}",
            "Episode".bright_blue(),
            self.loss,
            self.actor_loss,
            self.ep_ave_max_q,
        );
    }
}
