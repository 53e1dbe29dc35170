use std::{collections::VecDeque, error::Error};

use chrono::NaiveDate;
use ndarray::{Array1, Array3};

use crate::{
    config::Session,
    constants::{agent::RISK_WINDOW, noise::ACTION_RATIO, RISK_BETA, TRANSACTION_COST},
    data::{Feature, Panel},
    noise::OrnsteinUhlenbeckNoise,
    types::{StateWindow, WeightVec},
    utils::renormalize_weights,
};

/// Seed for the environment's exploration noise; fixed so a configured run
/// replays identically.
const NOISE_SEED: u64 = 42;

/// What one simulated day hands back to the traversal loop.
pub struct StepInfo {
    /// Log-return of the applied weights net of the transaction-cost proxy.
    pub reward: f64,
    /// False exactly once, at the final index of the window.
    pub continue_flag: bool,
    pub next_state: StateWindow,
    /// Weights after the price move, the `w1` of the next step.
    pub weights: WeightVec,
    /// Price relatives for the step, cash slot first (always 1.0).
    pub price: Array1<f64>,
    /// Trailing-variance risk penalty for value-based transitions.
    pub risk: f64,
}

/// Replays a historical window one day at a time. Holds the full aligned
/// panel in memory; `step` only ever advances the index by one, so replay is
/// deterministic for a fixed codes/date-range/feature configuration.
pub struct Environment {
    codes: Vec<String>,
    window_length: usize,
    /// values[feature][asset][t]
    values: Vec<Vec<Vec<f64>>>,
    /// closes[asset][t], used for price relatives.
    closes: Vec<Vec<f64>>,
    dates: Vec<NaiveDate>,
    index: usize,
    noise: OrnsteinUhlenbeckNoise,
    return_history: VecDeque<f64>,
}

impl Environment {
    pub fn new(panel: &Panel, session: &Session) -> Result<Self, Box<dyn Error>> {
        let first = panel
            .get(&session.codes[0])
            .ok_or("panel is missing the first configured code")?;
        let dates: Vec<NaiveDate> = first.iter().map(|bar| bar.date).collect();

        if dates.len() < session.window_length + 1 {
            return Err(format!(
                "need at least {} aligned days for window_length {}, got {}",
                session.window_length + 1,
                session.window_length,
                dates.len()
            )
            .into());
        }

        let mut values = vec![
            vec![Vec::with_capacity(dates.len()); session.codes.len()];
            session.features.len()
        ];
        let mut closes = vec![Vec::with_capacity(dates.len()); session.codes.len()];

        for (asset, code) in session.codes.iter().enumerate() {
            let bars = panel
                .get(code)
                .ok_or_else(|| format!("panel is missing code {code}"))?;
            if bars.len() != dates.len() {
                return Err(format!("panel for {code} is not date-aligned").into());
            }

            for bar in bars {
                closes[asset].push(bar.close);
                for (f, feature) in session.features.iter().enumerate() {
                    values[f][asset].push(feature.value(bar));
                }
            }
        }

        let asset_count = session.asset_count();
        let mut env = Environment {
            codes: session.codes.clone(),
            window_length: session.window_length,
            values,
            closes,
            dates,
            index: 0,
            noise: OrnsteinUhlenbeckNoise::new(Array1::zeros(asset_count), NOISE_SEED),
            return_history: VecDeque::with_capacity(RISK_WINDOW),
        };
        env.reset();
        Ok(env)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Assets plus cash.
    pub fn asset_count(&self) -> usize {
        self.closes.len() + 1
    }

    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        (self.dates[0], self.dates[self.dates.len() - 1])
    }

    /// Rewinds to the first index with a full observation window.
    pub fn reset(&mut self) {
        self.index = self.window_length - 1;
        self.noise.reset();
        self.return_history.clear();
    }

    /// Advances one simulated day.
    ///
    /// Called with `None` weights it resets and returns the initial
    /// observation: zero reward, all-cash weights, unit price relatives.
    /// Otherwise it applies the proposed weights (noise-adjusted when
    /// `noise_flag` is set), charges the turnover cost, and moves the index
    /// forward exactly one day. The final index returns `continue_flag:
    /// false`; stepping again without a reset is a caller bug and trips a
    /// debug assertion.
    pub fn step(
        &mut self,
        prev_weights: Option<&WeightVec>,
        new_weights: Option<&WeightVec>,
        noise_flag: bool,
    ) -> StepInfo {
        let (Some(w1), Some(w2)) = (prev_weights, new_weights) else {
            self.reset();
            let mut weights = Array1::zeros(self.asset_count());
            weights[0] = 1.0;
            return StepInfo {
                reward: 0.0,
                continue_flag: true,
                next_state: self.observation(self.index),
                weights,
                price: Array1::ones(self.asset_count()),
                risk: 0.0,
            };
        };

        debug_assert!(
            self.index + 1 < self.dates.len(),
            "step called past the terminal index; call reset (step with None) first"
        );

        // Exploration perturbs the action, never the recorded prices.
        let applied = if noise_flag {
            renormalize_weights(w2 + &(self.noise.sample() * ACTION_RATIO))
        } else {
            w2.clone()
        };

        let price = self.price_relatives(self.index);
        let growth = applied.dot(&price);
        let turnover: f64 = (&applied - w1).mapv(f64::abs).sum();
        let reward = growth.ln() - TRANSACTION_COST * turnover;

        // Weights drift with the price move before the next rebalance.
        let realized = (&applied * &price) / growth;

        if self.return_history.len() == RISK_WINDOW {
            self.return_history.pop_front();
        }
        self.return_history.push_back(reward);
        let risk = RISK_BETA * variance(self.return_history.make_contiguous());

        self.index += 1;
        let continue_flag = self.index + 1 < self.dates.len();

        StepInfo {
            reward,
            continue_flag,
            next_state: self.observation(self.index),
            weights: realized,
            price,
            risk,
        }
    }

    /// Price relatives from day `t` to `t + 1`, cash slot first.
    fn price_relatives(&self, t: usize) -> Array1<f64> {
        let mut relatives = Array1::ones(self.asset_count());
        for (asset, closes) in self.closes.iter().enumerate() {
            relatives[asset + 1] = closes[t + 1] / closes[t];
        }
        relatives
    }

    /// Observation window ending at day `t`, shaped (features, assets,
    /// window) and normalized by each asset's close at `t` so windows are
    /// scale-free.
    fn observation(&self, t: usize) -> StateWindow {
        let features = self.values.len();
        let assets = self.closes.len();
        let mut window = Array3::zeros((features, assets, self.window_length));

        for f in 0..features {
            for a in 0..assets {
                let anchor = self.closes[a][t];
                for k in 0..self.window_length {
                    let day = t + 1 - self.window_length + k;
                    window[[f, a, k]] = self.values[f][a][day] / anchor;
                }
            }
        }

        window
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Mode, Session};
    use crate::data::Bar;
    use chrono::Duration;
    use ndarray::arr1;

    fn synthetic_session(codes: &[&str], window: usize) -> Session {
        let raw = format!(
            r#"{{
                "session": {{
                    "codes": [{}],
                    "start_date": "2020-01-01",
                    "end_date": "2020-03-01",
                    "features": ["close"],
                    "agents": ["CNN", "PG", "{window}"],
                    "market_types": "stock",
                    "noise_flag": "False",
                    "record_flag": "False",
                    "plot_flag": "False",
                    "reload_flag": "False",
                    "trainable": "True",
                    "method": "model_free",
                    "epochs": 1
                }}
            }}"#,
            codes
                .iter()
                .map(|code| format!("\"{code}\""))
                .collect::<Vec<String>>()
                .join(","),
        );
        let config: Config = serde_json::from_str(&raw).unwrap();
        Session::resolve(&config, Mode::Train).unwrap()
    }

    fn synthetic_panel(codes: &[&str], closes: &[Vec<f64>]) -> Panel {
        let start = NaiveDate::parse_from_str("2020-01-01", "%Y-%m-%d").unwrap();
        let mut panel = Panel::new();
        for (code, series) in codes.iter().zip(closes) {
            let bars: Vec<Bar> = series
                .iter()
                .enumerate()
                .map(|(day, close)| Bar {
                    date: start + Duration::days(day as i64),
                    open: *close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close: *close,
                })
                .collect();
            panel.insert(code.to_string(), bars);
        }
        panel
    }

    fn drive_episode(env: &mut Environment) -> (Vec<f64>, Vec<Array1<f64>>) {
        let first = env.step(None, None, false);
        let mut w1 = first.weights;
        let hold = {
            let mut weights: Array1<f64> = Array1::zeros(env.asset_count());
            weights[1] = 1.0;
            weights
        };

        let mut rewards = Vec::new();
        let mut prices = Vec::new();
        let mut contin = true;
        while contin {
            let info = env.step(Some(&w1), Some(&hold), false);
            rewards.push(info.reward);
            prices.push(info.price.clone());
            w1 = info.weights;
            contin = info.continue_flag;
        }

        (rewards, prices)
    }

    #[test]
    fn terminates_exactly_at_the_final_index() {
        let codes = ["A"];
        let closes = vec![vec![1.0, 1.1, 1.21, 1.331, 1.4641, 1.61051]];
        let session = synthetic_session(&codes, 2);
        let mut env = Environment::new(&synthetic_panel(&codes, &closes), &session).unwrap();

        // 6 days, window 2: first observation at day 1, steps to days 2..=5.
        let (rewards, _) = drive_episode(&mut env);
        assert_eq!(rewards.len(), 4);
    }

    #[test]
    fn replay_is_deterministic_without_noise() {
        let codes = ["A", "B"];
        let closes = vec![
            vec![10.0, 10.5, 10.2, 10.8, 11.0, 10.9, 11.3],
            vec![20.0, 19.5, 19.8, 20.4, 20.2, 20.8, 21.0],
        ];
        let session = synthetic_session(&codes, 3);
        let panel = synthetic_panel(&codes, &closes);

        let mut first = Environment::new(&panel, &session).unwrap();
        let mut second = Environment::new(&panel, &session).unwrap();

        let (rewards_a, prices_a) = drive_episode(&mut first);
        let (rewards_b, prices_b) = drive_episode(&mut second);

        assert_eq!(rewards_a, rewards_b);
        assert_eq!(prices_a, prices_b);
    }

    #[test]
    fn all_in_single_asset_reward_tracks_its_log_return() {
        let codes = ["A"];
        let closes = vec![vec![1.0, 1.0, 2.0, 1.0]];
        let session = synthetic_session(&codes, 2);
        let mut env = Environment::new(&synthetic_panel(&codes, &closes), &session).unwrap();

        let first = env.step(None, None, false);
        let all_in = arr1(&[0.0, 1.0]);

        // Rebalancing from all-cash into the asset pays the turnover cost.
        let info = env.step(Some(&first.weights), Some(&all_in), false);
        let expected = 2.0_f64.ln() - TRANSACTION_COST * 2.0;
        assert!((info.reward - expected).abs() < 1e-12);

        // Holding through the halving costs nothing further.
        let info2 = env.step(Some(&info.weights), Some(&all_in), false);
        assert!((info2.reward - 0.5_f64.ln()).abs() < 1e-12);
        assert!(!info2.continue_flag);
    }

    #[test]
    fn realized_weights_stay_normalized() {
        let codes = ["A", "B"];
        let closes = vec![
            vec![5.0, 5.5, 5.2, 5.9, 6.1],
            vec![3.0, 2.9, 3.1, 3.0, 3.3],
        ];
        let session = synthetic_session(&codes, 2);
        let mut env = Environment::new(&synthetic_panel(&codes, &closes), &session).unwrap();

        let first = env.step(None, None, false);
        let mut w1 = first.weights;
        let proposed = arr1(&[0.2, 0.4, 0.4]);

        let mut contin = true;
        while contin {
            let info = env.step(Some(&w1), Some(&proposed), false);
            assert!((info.weights.sum() - 1.0).abs() < 1e-9);
            assert!(info.weights.iter().all(|w| *w >= 0.0));
            w1 = info.weights;
            contin = info.continue_flag;
        }
    }

    #[test]
    #[should_panic(expected = "past the terminal index")]
    fn stepping_past_the_terminal_index_is_rejected() {
        let codes = ["A"];
        let closes = vec![vec![1.0, 1.1, 1.2, 1.3]];
        let session = synthetic_session(&codes, 2);
        let mut env = Environment::new(&synthetic_panel(&codes, &closes), &session).unwrap();

        let (rewards, _) = drive_episode(&mut env);
        assert_eq!(rewards.len(), 2);

        let hold = arr1(&[1.0, 0.0]);
        env.step(Some(&hold), Some(&hold), false);
    }

    #[test]
    fn cash_slot_relative_is_always_one() {
        let codes = ["A"];
        let closes = vec![vec![4.0, 4.2, 4.1, 4.4, 4.3]];
        let session = synthetic_session(&codes, 2);
        let mut env = Environment::new(&synthetic_panel(&codes, &closes), &session).unwrap();

        let first = env.step(None, None, false);
        let info = env.step(Some(&first.weights), Some(&first.weights.clone()), false);
        assert_eq!(info.price[0], 1.0);
    }
}
