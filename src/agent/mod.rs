use std::error::Error;

use ndarray::Array1;

use crate::{
    config::{Framework, Method, Session},
    types::{StateWindow, WeightVec},
};

pub mod baselines;
pub mod pg;

/// One step of experience. Every agent kind receives the same record and
/// consumes the fields it cares about: the policy-gradient agent keeps the
/// price relatives, value-based agents would keep reward/next-state.
pub struct Transition {
    pub state: StateWindow,
    pub action: WeightVec,
    pub reward: f64,
    pub continue_flag: bool,
    pub next_state: StateWindow,
    pub realized_weights: WeightVec,
    pub price: Array1<f64>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TrainStats {
    pub loss: f64,
    pub q_value: f64,
    pub actor_loss: f64,
}

/// Capability surface shared by the trainable agent and the fixed baselines.
/// Baselines only implement `predict`; the defaults make the rest no-ops.
pub trait Agent {
    fn label(&self) -> &'static str;

    fn predict(&mut self, state: &StateWindow, prev_weights: &WeightVec) -> WeightVec;

    fn save_transition(&mut self, _transition: Transition) {}

    fn train(&mut self, _method: Method, _epoch: usize) -> TrainStats {
        TrainStats::default()
    }

    fn reset_buffer(&mut self) {}

    fn close(&mut self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}

/// Constructs the configured agent kind exactly once; there is no string
/// dispatch past this point.
pub fn build_agent(
    session: &Session,
    libpath: &str,
    num: u32,
) -> Result<Box<dyn Agent>, Box<dyn Error>> {
    match session.framework {
        Framework::Pg => Ok(Box::new(pg::PgAgent::new(session, libpath, num)?)),
        other => Err(format!(
            "{} agents are not available in this build; configure the PG framework",
            other.label()
        )
        .into()),
    }
}
