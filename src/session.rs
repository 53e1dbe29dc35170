use std::{error::Error, fs};

use chrono::NaiveDate;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::{
    agent::{build_agent, Agent, TrainStats, Transition},
    backtest::backtest,
    charts::wealth_chart,
    config::{Method, Mode, Session},
    data::{load_panel, split_date_range, Feature},
    env::Environment,
    trader::StockTrader,
    utils::create_folder_if_not_exists,
};

/// Resolved run record written to the run directory so a later test run
/// replays the exact same windows the training run used.
#[derive(Debug, Serialize, Deserialize)]
struct RunArtifact {
    codes: Vec<String>,
    features: Vec<Feature>,
    window_length: usize,
    epochs: usize,
    train_start: NaiveDate,
    train_end: NaiveDate,
    test_start: NaiveDate,
    test_end: NaiveDate,
}

impl RunArtifact {
    fn resolve(session: &Session) -> Self {
        let (train_start, train_end, test_start, test_end) =
            split_date_range(session.start_date, session.end_date);
        RunArtifact {
            codes: session.codes.clone(),
            features: session.features.clone(),
            window_length: session.window_length,
            epochs: session.epochs,
            train_start,
            train_end,
            test_start,
            test_end,
        }
    }

    fn load(path: &str) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

/// One full run: resolve the run directory and the train/test windows, build
/// the environment and the configured agent, then either train for the
/// configured epochs or backtest over the held-out period.
pub fn run_session(
    session: &Session,
    mode: Mode,
    num: u32,
    logpath: &str,
    libpath: &str,
) -> Result<(), Box<dyn Error>> {
    let run_dir = format!("{logpath}/result/{}/{num}/", session.framework.label());
    create_folder_if_not_exists(run_dir.trim_end_matches('/'));

    let artifact_path = format!("{run_dir}config.json");
    let artifact = match mode {
        Mode::Train => {
            let artifact = RunArtifact::resolve(session);
            fs::write(&artifact_path, serde_json::to_string_pretty(&artifact)?)?;
            artifact
        }
        _ => match RunArtifact::load(&artifact_path) {
            Some(artifact) => artifact,
            None => {
                println!("no run record at {artifact_path}, splitting the configured range");
                RunArtifact::resolve(session)
            }
        },
    };

    let (start, end) = match mode {
        Mode::Train => (artifact.train_start, artifact.train_end),
        _ => (artifact.test_start, artifact.test_end),
    };
    println!(
        "{} {} over {start} to {end}",
        "Running".bright_blue(),
        session.agent_tag,
    );

    let panel = load_panel(libpath, &session.codes, start, end)?;
    let mut env = Environment::new(&panel, session)?;
    let mut agent = build_agent(session, libpath, num)?;

    match mode {
        Mode::Train => {
            let mut trader = StockTrader::new(session.asset_count(), num as u64);
            for epoch in 0..session.epochs {
                traversal(&mut trader, agent.as_mut(), &mut env, epoch, session)?;

                if session.record_flag {
                    trader.write(&run_dir, &session.codes, agent.label())?;
                }
                if session.plot_flag {
                    wealth_chart(
                        run_dir.trim_end_matches('/'),
                        &format!("wealth_{epoch}"),
                        &trader.wealth_history,
                    )?;
                }

                trader.print_result(epoch);
                agent.reset_buffer();
                trader.reset();
            }
            agent.close()?;
        }
        Mode::Test => {
            backtest(vec![agent], &mut env, &run_dir)?;
        }
        Mode::Download => unreachable!("download mode never reaches run_session"),
    }

    Ok(())
}

/// One episode: start the environment, then predict/step/record until the
/// terminal index, training once on the collected trajectory when enabled.
fn traversal(
    trader: &mut StockTrader,
    agent: &mut dyn Agent,
    env: &mut Environment,
    epoch: usize,
    session: &Session,
) -> Result<(), Box<dyn Error>> {
    let first = env.step(None, None, session.noise_flag);
    let mut state = first.next_state;
    let mut w1 = first.weights;

    let mut contin = true;
    while contin {
        let action = agent.predict(&state, &w1);
        let info = env.step(Some(&w1), Some(&action), session.noise_flag);

        // Value-based transitions learn from the risk-penalized reward; the
        // trader always records the gross one.
        let stored_reward = match session.method {
            Method::ModelFree => info.reward,
            Method::ModelBased => info.reward - info.risk,
        };
        agent.save_transition(Transition {
            state,
            action: action.clone(),
            reward: stored_reward,
            continue_flag: info.continue_flag,
            next_state: info.next_state.clone(),
            realized_weights: info.weights.clone(),
            price: info.price.clone(),
        });
        trader.update_summary(&TrainStats::default(), info.reward, &action, &info.price);

        state = info.next_state;
        w1 = info.weights;
        contin = info.continue_flag;
    }

    if session.trainable {
        let stats = agent.train(session.method, epoch);
        trader.loss += stats.loss;
        trader.actor_loss += stats.actor_loss;
        trader.ep_ave_max_q += stats.q_value;
    }

    Ok(())
}
