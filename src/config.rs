use std::{error::Error, fs};

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer};

use crate::data::Feature;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Train,
    Test,
    Download,
}

/// Agent families the config can name. Only the policy-gradient family is
/// buildable; the value-based ones are recognized so configs written for the
/// reference setup fail with a clear message instead of a parse error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framework {
    Pg,
    Ddpg,
    Ppo,
}

impl Framework {
    fn parse(raw: &str) -> Result<Self, Box<dyn Error>> {
        match raw {
            "PG" => Ok(Framework::Pg),
            "DDPG" => Ok(Framework::Ddpg),
            "PPO" => Ok(Framework::Ppo),
            other => Err(format!("unknown framework {other:?}, expected PG, DDPG or PPO").into()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Framework::Pg => "PG",
            Framework::Ddpg => "DDPG",
            Framework::Ppo => "PPO",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    ModelFree,
    ModelBased,
}

impl Method {
    fn parse(raw: &str) -> Result<Self, Box<dyn Error>> {
        match raw {
            "model_free" => Ok(Method::ModelFree),
            "model_based" => Ok(Method::ModelBased),
            other => {
                Err(format!("unknown method {other:?}, expected model_free or model_based").into())
            }
        }
    }
}

/// Raw shape of `config.json`. Booleans are accepted both as JSON booleans
/// and as the reference's "True"/"False" strings; they are real `bool`s from
/// here on.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub codes: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub features: Vec<String>,
    /// [predictor, framework, window_length]
    pub agents: (String, String, StringOrInt),
    pub market_types: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub noise_flag: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub record_flag: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub plot_flag: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub reload_flag: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub trainable: bool,
    pub method: String,
    pub epochs: StringOrInt,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, Box<dyn Error>> {
        let raw = fs::read_to_string(path)
            .map_err(|err| format!("unable to read config at {path}: {err}"))?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StringOrInt {
    Int(u64),
    Text(String),
}

impl StringOrInt {
    fn as_usize(&self, field: &str) -> Result<usize, Box<dyn Error>> {
        match self {
            StringOrInt::Int(value) => Ok(*value as usize),
            StringOrInt::Text(text) => text
                .parse::<usize>()
                .map_err(|_| format!("{field} must be an integer, got {text:?}").into()),
        }
    }
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(value) => Ok(value),
        Raw::Text(text) => match text.as_str() {
            "True" | "true" => Ok(true),
            "False" | "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean or \"True\"/\"False\", got {other:?}"
            ))),
        },
    }
}

/// Everything one run needs, resolved and validated once. Replaces the
/// reference's global `epochs`/`M`/`PATH_prefix` state: components receive
/// this by reference instead of reaching for globals.
#[derive(Debug, Clone)]
pub struct Session {
    pub codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub features: Vec<Feature>,
    pub predictor: String,
    pub framework: Framework,
    pub window_length: usize,
    pub market: String,
    pub noise_flag: bool,
    pub record_flag: bool,
    pub plot_flag: bool,
    pub reload_flag: bool,
    pub trainable: bool,
    pub method: Method,
    pub epochs: usize,
    /// predictor-framework-window tag used for weight file names.
    pub agent_tag: String,
}

impl Session {
    pub fn resolve(config: &Config, mode: Mode) -> Result<Self, Box<dyn Error>> {
        let session = &config.session;

        if session.codes.is_empty() {
            return Err("config has no asset codes".into());
        }

        let start_date = parse_date(&session.start_date, "start_date")?;
        let end_date = parse_date(&session.end_date, "end_date")?;
        if start_date >= end_date {
            return Err(format!("start_date {start_date} is not before end_date {end_date}").into());
        }

        let features = session
            .features
            .iter()
            .map(|name| Feature::parse(name))
            .collect::<Result<Vec<Feature>, _>>()?;
        if features.is_empty() {
            return Err("config has no features".into());
        }

        let (predictor, framework_raw, window_raw) = &session.agents;
        let framework = Framework::parse(framework_raw)?;
        let window_length = window_raw.as_usize("window_length")?;
        if window_length == 0 {
            return Err("window_length must be at least 1".into());
        }

        let mut resolved = Session {
            codes: session.codes.clone(),
            start_date,
            end_date,
            features,
            predictor: predictor.clone(),
            framework,
            window_length,
            market: session.market_types.clone(),
            noise_flag: session.noise_flag,
            record_flag: session.record_flag,
            plot_flag: session.plot_flag,
            reload_flag: session.reload_flag,
            trainable: session.trainable,
            method: Method::parse(&session.method)?,
            epochs: session.epochs.as_usize("epochs")?,
            agent_tag: format!("{predictor}-{framework_raw}-{window_length}"),
        };

        // Test mode replays a trained policy: recording and plotting on,
        // exploration and learning off.
        if mode == Mode::Test {
            resolved.record_flag = true;
            resolved.noise_flag = false;
            resolved.plot_flag = true;
            resolved.reload_flag = true;
            resolved.trainable = false;
            resolved.method = Method::ModelFree;
        }

        Ok(resolved)
    }

    /// Assets plus the cash slot: the length of every weight vector.
    pub fn asset_count(&self) -> usize {
        self.codes.len() + 1
    }
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, Box<dyn Error>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("{field} must be an ISO date (YYYY-MM-DD), got {raw:?}").into())
}
