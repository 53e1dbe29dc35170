use std::{error::Error, fs};

use chrono::{Duration, NaiveDate};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    constants::{files, TRAIN_SPLIT},
    utils::create_folder_if_not_exists,
};

/// Per-bar fields the environment can expose as observation features.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    Close,
    High,
    Low,
    Open,
}

impl Feature {
    pub fn parse(name: &str) -> Result<Self, Box<dyn Error>> {
        match name.to_ascii_lowercase().as_str() {
            "close" => Ok(Feature::Close),
            "high" => Ok(Feature::High),
            "low" => Ok(Feature::Low),
            "open" => Ok(Feature::Open),
            other => {
                Err(format!("unknown feature {other:?}, expected close/high/low/open").into())
            }
        }
    }

    pub fn value(&self, bar: &Bar) -> f64 {
        match self {
            Feature::Close => bar.close,
            Feature::High => bar.high,
            Feature::Low => bar.low,
            Feature::Open => bar.open,
        }
    }
}

/// One daily bar of a single asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Date-aligned bars per asset code.
pub type Panel = HashMap<String, Vec<Bar>>;

/// Reads the postcard cache written by download mode.
pub fn load_cached_bars(libpath: &str, code: &str) -> Result<Vec<Bar>, Box<dyn Error>> {
    let path = format!("{libpath}/{}/{code}.bin", files::DATA_DIR);
    let raw = fs::read(&path)
        .map_err(|_| format!("no cached data for {code} at {path}; run --mode download first"))?;
    let bars: Vec<Bar> = postcard::from_bytes(&raw)?;
    Ok(bars)
}

/// Loads every configured code for [start, end] and keeps only the dates all
/// codes share, so each row of the panel is one tradable day.
pub fn load_panel(
    libpath: &str,
    codes: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Panel, Box<dyn Error>> {
    let mut series = Vec::with_capacity(codes.len());
    for code in codes {
        let bars: Vec<Bar> = load_cached_bars(libpath, code)?
            .into_iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();
        if bars.is_empty() {
            return Err(format!("no bars for {code} between {start} and {end}").into());
        }
        series.push(bars);
    }

    let mut shared: HashSet<NaiveDate> = series[0].iter().map(|bar| bar.date).collect();
    for bars in series.iter().skip(1) {
        let dates: HashSet<NaiveDate> = bars.iter().map(|bar| bar.date).collect();
        shared.retain(|date| dates.contains(date));
    }
    if shared.is_empty() {
        return Err("asset series share no dates in the configured range".into());
    }

    let mut panel = Panel::new();
    for (code, bars) in codes.iter().zip(series) {
        let aligned: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| shared.contains(&bar.date))
            .collect();
        panel.insert(code.clone(), aligned);
    }

    Ok(panel)
}

/// Splits the configured range into a training period and a held-out test
/// period at `TRAIN_SPLIT`. The resolved dates are recorded in the run
/// artifact so downstream runs replay the exact same windows.
pub fn split_date_range(
    start: NaiveDate,
    end: NaiveDate,
) -> (NaiveDate, NaiveDate, NaiveDate, NaiveDate) {
    let total_days = (end - start).num_days();
    let train_days = (total_days as f64 * TRAIN_SPLIT) as i64;
    let train_end = start + Duration::days(train_days);
    let test_start = train_end + Duration::days(1);

    (start, train_end, test_start, end)
}

/// External collaborator boundary: turns raw per-code CSV series into the
/// binary cache the environment replays. Missing raw files are reported and
/// skipped; the cache keeps whatever could be built.
pub struct DataDownloader {
    codes: Vec<String>,
    libpath: String,
}

impl DataDownloader {
    pub fn new(config: &Config, libpath: &str) -> Self {
        DataDownloader {
            codes: config.session.codes.clone(),
            libpath: libpath.to_string(),
        }
    }

    pub fn save_data(&self) -> Result<(), Box<dyn Error>> {
        let data_dir = format!("{}/{}", self.libpath, files::DATA_DIR);
        create_folder_if_not_exists(&data_dir);

        for code in &self.codes {
            let raw_path = format!("{}/{}/{code}.csv", self.libpath, files::RAW_DIR);
            let raw = match fs::read_to_string(&raw_path) {
                Ok(raw) => raw,
                Err(_) => {
                    println!("no raw series at {raw_path}, skipping {code}");
                    continue;
                }
            };

            let bars = parse_raw_csv(&raw)
                .map_err(|err| format!("malformed raw series for {code}: {err}"))?;
            let encoded = postcard::to_allocvec(&bars)?;
            fs::write(format!("{data_dir}/{code}.bin"), encoded.as_slice())?;
            println!("cached {} bars for {code}", bars.len());
        }

        Ok(())
    }
}

/// Parses `date,open,high,low,close` rows, header optional. Rows come back
/// sorted by date.
fn parse_raw_csv(raw: &str) -> Result<Vec<Bar>, Box<dyn Error>> {
    let mut bars = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.to_ascii_lowercase().starts_with("date") {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            return Err(format!("expected 5 columns, got {}: {line:?}", fields.len()).into());
        }

        bars.push(Bar {
            date: NaiveDate::parse_from_str(fields[0].trim(), "%Y-%m-%d")?,
            open: fields[1].trim().parse()?,
            high: fields[2].trim().parse()?,
            low: fields[3].trim().parse()?,
            close: fields[4].trim().parse()?,
        });
    }

    if bars.is_empty() {
        return Err("no data rows".into());
    }

    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}
