use std::{error::Error, fs};

use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{
    agent::{Agent, TrainStats, Transition},
    config::{Method, Session},
    constants::{agent::LEARNING_RATE, files},
    types::{StateWindow, WeightVec},
    utils::create_folder_if_not_exists,
};

/// Policy-gradient agent over a softmax-linear policy.
///
/// The policy maps the flattened observation window plus the previous weight
/// vector to allocation logits. Training happens once per episode on the
/// collected trajectory, ascending the mean log-growth of the chosen
/// weights; for softmax weights the gradient is closed-form, so no autodiff
/// stack is needed.
pub struct PgAgent {
    theta: Array2<f64>,
    bias: Array1<f64>,
    learning_rate: f64,
    trainable: bool,
    weights_path: String,
    /// Input of the most recent `predict`, paired with the transition that
    /// follows it.
    last_input: Option<Array1<f64>>,
    trajectory: Vec<TrajectoryStep>,
}

struct TrajectoryStep {
    input: Array1<f64>,
    price: Array1<f64>,
}

#[derive(Serialize, Deserialize)]
struct PolicyParams {
    theta: Array2<f64>,
    bias: Array1<f64>,
}

impl PgAgent {
    pub fn new(session: &Session, libpath: &str, num: u32) -> Result<Self, Box<dyn Error>> {
        let outputs = session.asset_count();
        let inputs = session.features.len() * session.codes.len() * session.window_length + outputs;
        let weights_path = format!(
            "{libpath}/{}/{}-{num}.bin",
            files::WEIGHTS_DIR,
            session.agent_tag
        );

        let (theta, bias) = if session.reload_flag {
            match Self::load_params(&weights_path) {
                Some(params) => (params.theta, params.bias),
                None => {
                    println!("no saved policy at {weights_path}, starting fresh");
                    Self::fresh_params(outputs, inputs, num as u64)
                }
            }
        } else {
            Self::fresh_params(outputs, inputs, num as u64)
        };

        if theta.nrows() != outputs || theta.ncols() != inputs {
            return Err(format!(
                "saved policy at {weights_path} has shape {:?}, expected ({outputs}, {inputs}); \
                 was it trained with a different config?",
                theta.dim()
            )
            .into());
        }

        Ok(PgAgent {
            theta,
            bias,
            learning_rate: LEARNING_RATE,
            trainable: session.trainable,
            weights_path,
            last_input: None,
            trajectory: Vec::new(),
        })
    }

    fn fresh_params(outputs: usize, inputs: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let theta = Array2::from_shape_fn((outputs, inputs), |_| {
            rng.sample::<f64, _>(StandardNormal) * 0.01
        });
        (theta, Array1::zeros(outputs))
    }

    fn load_params(path: &str) -> Option<PolicyParams> {
        let raw = fs::read(path).ok()?;
        postcard::from_bytes(&raw).ok()
    }

    fn build_input(&self, state: &StateWindow, prev_weights: &WeightVec) -> Array1<f64> {
        let mut input = Vec::with_capacity(state.len() + prev_weights.len());
        input.extend(state.iter().copied());
        input.extend(prev_weights.iter().copied());
        Array1::from_vec(input)
    }

    fn policy(&self, input: &Array1<f64>) -> WeightVec {
        let logits = self.theta.dot(input) + &self.bias;
        softmax(&logits)
    }
}

impl Agent for PgAgent {
    fn label(&self) -> &'static str {
        "PG"
    }

    fn predict(&mut self, state: &StateWindow, prev_weights: &WeightVec) -> WeightVec {
        let input = self.build_input(state, prev_weights);
        let weights = self.policy(&input);
        self.last_input = Some(input);
        weights
    }

    fn save_transition(&mut self, transition: Transition) {
        // predict always precedes save_transition within a step
        if let Some(input) = self.last_input.take() {
            self.trajectory.push(TrajectoryStep {
                input,
                price: transition.price,
            });
        }
    }

    /// One gradient ascent step on the episode's mean log-growth.
    fn train(&mut self, _method: Method, _epoch: usize) -> TrainStats {
        if !self.trainable || self.trajectory.is_empty() {
            return TrainStats::default();
        }

        let steps = self.trajectory.len() as f64;
        let mut grad_theta: Array2<f64> = Array2::zeros(self.theta.dim());
        let mut grad_bias: Array1<f64> = Array1::zeros(self.bias.len());
        let mut objective = 0.0;

        for step in &self.trajectory {
            let weights = self.policy(&step.input);
            let growth = weights.dot(&step.price);
            objective += growth.ln();

            // d ln(w . y) / d logit_i = w_i * y_i / (w . y) - w_i
            let grad_logits = (&weights * &step.price) / growth - &weights;
            for (row, g) in grad_logits.iter().enumerate() {
                let mut theta_row = grad_theta.row_mut(row);
                theta_row.scaled_add(*g, &step.input);
                grad_bias[row] += *g;
            }
        }

        self.theta
            .scaled_add(self.learning_rate / steps, &grad_theta);
        self.bias.scaled_add(self.learning_rate / steps, &grad_bias);

        let loss = -objective / steps;
        TrainStats {
            loss,
            q_value: 0.0,
            actor_loss: loss,
        }
    }

    fn reset_buffer(&mut self) {
        self.trajectory.clear();
        self.last_input = None;
    }

    fn close(&mut self) -> Result<(), Box<dyn Error>> {
        if !self.trainable {
            return Ok(());
        }

        if let Some(dir) = self.weights_path.rsplit_once('/').map(|(dir, _)| dir) {
            create_folder_if_not_exists(dir);
        }
        let params = PolicyParams {
            theta: self.theta.clone(),
            bias: self.bias.clone(),
        };
        fs::write(&self.weights_path, postcard::to_allocvec(&params)?)?;
        Ok(())
    }
}

fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
    let exp = logits.mapv(|v| (v - max).exp());
    let total = exp.sum();
    exp / total
}
