/// Guard against division by a zero weight sum when renormalizing actions.
pub const EPS: f64 = 1e-7;

/// Wealth every episode and backtest run starts from.
pub const INITIAL_WEALTH: f64 = 10_000.0;

/// Trading days per year, used to annualize the Sharpe ratio.
pub const TRADING_DAYS: f64 = 252.0;

/// Proportional transaction cost charged on turnover.
pub const TRANSACTION_COST: f64 = 0.0025;

/// Scale applied to the trailing-variance risk penalty.
pub const RISK_BETA: f64 = 0.1;

/// Fraction of the configured date range used for training; the rest is the
/// held-out backtest period.
pub const TRAIN_SPLIT: f64 = 0.8;

pub mod noise {
    pub const THETA: f64 = 0.15;
    pub const SIGMA: f64 = 0.3;
    pub const DT: f64 = 1e-2;
    /// How much of the noise sample is mixed into the action.
    pub const ACTION_RATIO: f64 = 0.2;
}

pub mod agent {
    pub const LEARNING_RATE: f64 = 0.05;
    /// Steps of portfolio history behind the environment's risk penalty.
    pub const RISK_WINDOW: usize = 10;
}

pub mod files {
    pub const DATA_DIR: &str = "data";
    pub const RAW_DIR: &str = "raw";
    pub const WEIGHTS_DIR: &str = "weights";
}
