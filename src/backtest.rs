use std::error::Error;

use colored::Colorize;
use ordered_float::OrderedFloat;

use crate::{
    agent::{
        baselines::{Loser, Ucrp, Winner},
        Agent, TrainStats,
    },
    charts::backtest_chart,
    constants::INITIAL_WEALTH,
    env::Environment,
    metrics::{max_drawdown, mean_daily_return, sharpe_ratio},
    trader::StockTrader,
    types::Data,
};

pub struct BacktestReport {
    pub label: String,
    pub wealth: Data,
    pub mean_daily_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

impl BacktestReport {
    pub fn final_wealth(&self) -> f64 {
        *self.wealth.last().unwrap_or(&INITIAL_WEALTH)
    }
}

/// Replays the held-out period once per agent - the trained one(s) plus the
/// fixed baselines - with noise and training disabled, then renders the
/// comparison chart and prints a summary ranked by Sharpe ratio.
pub fn backtest(
    agents: Vec<Box<dyn Agent>>,
    env: &mut Environment,
    prefix: &str,
) -> Result<Vec<BacktestReport>, Box<dyn Error>> {
    println!("starting backtest over {:?}", env.date_range());

    let mut agents = agents;
    agents.push(Box::new(Winner));
    agents.push(Box::new(Ucrp));
    agents.push(Box::new(Loser));

    let mut reports = Vec::with_capacity(agents.len());
    for mut agent in agents {
        let (wealth, returns) = run_agent(agent.as_mut(), env, prefix)?;
        reports.push(BacktestReport {
            label: agent.label().to_string(),
            mean_daily_return: mean_daily_return(&returns),
            sharpe: sharpe_ratio(&returns),
            max_drawdown: max_drawdown(&wealth),
            wealth,
        });
    }

    let curves: Vec<(String, Data)> = reports
        .iter()
        .map(|report| (report.label.clone(), report.wealth.clone()))
        .collect();
    backtest_chart(prefix.trim_end_matches('/'), &curves)?;

    print_summary(&mut reports);
    Ok(reports)
}

/// One full pass of the held-out window for a single agent.
fn run_agent(
    agent: &mut dyn Agent,
    env: &mut Environment,
    prefix: &str,
) -> Result<(Data, Vec<f64>), Box<dyn Error>> {
    let mut trader = StockTrader::new(env.asset_count(), 0);

    let first = env.step(None, None, false);
    let mut state = first.next_state;
    let mut w1 = first.weights;

    let mut wealth = INITIAL_WEALTH;
    let mut curve = vec![wealth];
    let mut returns = Vec::new();

    let mut contin = true;
    while contin {
        let action = agent.predict(&state, &w1);
        let info = env.step(Some(&w1), Some(&action), false);

        wealth *= info.reward.exp();
        curve.push(wealth);
        returns.push(info.reward.exp() - 1.0);
        trader.update_summary(&TrainStats::default(), info.reward, &action, &info.price);

        state = info.next_state;
        w1 = info.weights;
        contin = info.continue_flag;
    }

    trader.write(prefix, env.codes(), agent.label())?;
    println!("finished {}", agent.label());

    Ok((curve, returns))
}

fn print_summary(reports: &mut [BacktestReport]) {
    reports.sort_by_key(|report| OrderedFloat(-report.sharpe));

    println!(
        "{:<10} {:>14} {:>10} {:>14} {:>14}",
        "agent".bold(),
        "mean return %",
        "sharpe",
        "max drawdown",
        "final wealth"
    );
    for report in reports.iter() {
        let line = format!(
            "{:<10} {:>14.3} {:>10.3} {:>14.3} {:>14.2}",
            report.label,
            report.mean_daily_return,
            report.sharpe,
            report.max_drawdown,
            report.final_wealth(),
        );
        if report.final_wealth() >= INITIAL_WEALTH {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Mode, Session};
    use crate::constants::TRANSACTION_COST;
    use crate::data::{Bar, Panel};
    use chrono::{Duration, NaiveDate};
    use std::fs;

    fn session_for(codes: &[&str], window: usize) -> Session {
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
                    "trainable": "False",
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
        Session::resolve(&config, Mode::Test).unwrap()
    }

    fn panel_for(code: &str, closes: &[f64]) -> Panel {
        let start = NaiveDate::parse_from_str("2020-01-01", "%Y-%m-%d").unwrap();
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(day, close)| Bar {
                date: start + Duration::days(day as i64),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
            })
            .collect();
        let mut panel = Panel::new();
        panel.insert(code.to_string(), bars);
        panel
    }

    fn temp_prefix(name: &str) -> String {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        format!("{}/", dir.to_str().unwrap())
    }

    #[test]
    fn ucrp_on_flat_prices_pays_only_the_initial_rebalance() {
        // 6 flat days, window 1: five steps. UCRP holds [0.5, 0.5]; the only
        // turnover is the first move out of cash (|0.5-1| + |0.5-0| = 1).
        let session = session_for(&["A"], 1);
        let panel = panel_for("A", &[2.0; 6]);
        let mut env = Environment::new(&panel, &session).unwrap();
        let prefix = temp_prefix("rlportfolio-backtest-flat");

        let reports = backtest(Vec::new(), &mut env, &prefix).unwrap();
        let ucrp = reports.iter().find(|r| r.label == "UCRP").unwrap();

        let after_entry = INITIAL_WEALTH * (-TRANSACTION_COST).exp();
        let expected = [
            INITIAL_WEALTH,
            after_entry,
            after_entry,
            after_entry,
            after_entry,
            after_entry,
        ];
        assert_eq!(ucrp.wealth.len(), expected.len());
        for (got, want) in ucrp.wealth.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        assert!((ucrp.max_drawdown - (1.0 - (-TRANSACTION_COST).exp())).abs() < 1e-12);

        let _ = fs::remove_dir_all(prefix.trim_end_matches('/'));
    }

    #[test]
    fn ucrp_wealth_matches_hand_computed_reference() {
        // closes [1, 1, 2, 2]: the asset doubles on the second step.
        let session = session_for(&["A"], 1);
        let panel = panel_for("A", &[1.0, 1.0, 2.0, 2.0]);
        let mut env = Environment::new(&panel, &session).unwrap();
        let prefix = temp_prefix("rlportfolio-backtest-double");

        let reports = backtest(Vec::new(), &mut env, &prefix).unwrap();
        let ucrp = reports.iter().find(|r| r.label == "UCRP").unwrap();

        // step 1: flat prices, leave cash: r = -c * 1
        let r1 = -TRANSACTION_COST;
        // step 2: growth 0.5 + 0.5 * 2 = 1.5, no turnover: r = ln(1.5)
        let r2 = 1.5_f64.ln();
        // step 3: drifted weights [1/3, 2/3] rebalance to [1/2, 1/2]:
        // turnover 1/3, flat prices: r = -c / 3
        let r3 = -TRANSACTION_COST / 3.0;

        let expected = [
            INITIAL_WEALTH,
            INITIAL_WEALTH * r1.exp(),
            INITIAL_WEALTH * (r1 + r2).exp(),
            INITIAL_WEALTH * (r1 + r2 + r3).exp(),
        ];
        assert_eq!(ucrp.wealth.len(), expected.len());
        for (got, want) in ucrp.wealth.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }

        let _ = fs::remove_dir_all(prefix.trim_end_matches('/'));
    }

    #[test]
    fn winner_and_loser_bracket_a_trending_market() {
        // one steadily rising asset, one steadily falling one
        let mut panel = panel_for("A", &[1.0, 1.1, 1.21, 1.331, 1.4641, 1.61051]);
        let start = NaiveDate::parse_from_str("2020-01-01", "%Y-%m-%d").unwrap();
        let falling: Vec<Bar> = [1.0, 0.95, 0.9, 0.85, 0.8, 0.75]
            .iter()
            .enumerate()
            .map(|(day, close)| Bar {
                date: start + Duration::days(day as i64),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
            })
            .collect();
        panel.insert("B".to_string(), falling);

        let session = session_for(&["A", "B"], 2);
        let mut env = Environment::new(&panel, &session).unwrap();
        let prefix = temp_prefix("rlportfolio-backtest-trend");

        let reports = backtest(Vec::new(), &mut env, &prefix).unwrap();
        let winner = reports.iter().find(|r| r.label == "Winner").unwrap();
        let loser = reports.iter().find(|r| r.label == "Loser").unwrap();

        assert!(winner.final_wealth() > loser.final_wealth());
        assert!(winner.final_wealth() > INITIAL_WEALTH);
        assert!(loser.final_wealth() < INITIAL_WEALTH);

        // ranked output: reports come back sorted by sharpe descending
        for pair in reports.windows(2) {
            assert!(pair[0].sharpe >= pair[1].sharpe);
        }

        let _ = fs::remove_dir_all(prefix.trim_end_matches('/'));
    }
}
