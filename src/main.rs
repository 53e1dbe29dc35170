use clap::Parser;
use colored::Colorize;

use config::{Config, Mode, Session};
use data::DataDownloader;

mod agent;
mod backtest;
mod charts;
mod config;
mod constants;
mod data;
mod env;
mod metrics;
mod noise;
mod session;
mod trader;
mod types;
mod utils;

#[derive(Parser)]
#[command(about = "Policy-gradient portfolio allocation over daily bars")]
struct Cli {
    /// What to do: train an agent, backtest a trained one, or build the
    /// local price cache.
    #[arg(long, value_enum, default_value = "train")]
    mode: Mode,

    /// Run number: names the run directory and seeds a fresh policy.
    #[arg(long, default_value_t = 0)]
    num: u32,

    /// Where run artifacts (records, charts) are written.
    #[arg(long, default_value = ".")]
    logpath: String,

    /// Where config.json lives.
    #[arg(long, default_value = ".")]
    rootpath: String,

    /// Where the price cache and policy weights live.
    #[arg(long, default_value = ".")]
    libpath: String,
}

fn main() {
    let cli = Cli::parse();
    println!("{}", "Start".bright_green().bold());

    let config = Config::from_file(&format!("{}/config.json", cli.rootpath))
        .expect("unable to load config");

    if cli.mode == Mode::Download {
        DataDownloader::new(&config, &cli.libpath)
            .save_data()
            .expect("download failed");
    } else {
        let session = Session::resolve(&config, cli.mode).expect("invalid config");
        session::run_session(&session, cli.mode, cli.num, &cli.logpath, &cli.libpath)
            .expect("run failed");
    }

    println!("{}", "End".bright_green().bold());
}
