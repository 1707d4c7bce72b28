//! A driver that builds many quantile sketches concurrently, merges them, and reports quantiles of the merged result.

#![deny(warnings)]
#![deny(missing_docs)]

use anyhow::Error;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod config;
use self::config::Config;

mod driver;
use self::driver::Driver;

fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_target(true)
        .init();

    match run() {
        Ok(()) => info!("sketch-reducer stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<(), Error> {
    info!("sketch-reducer starting...");

    // We accept at most a single command line argument: the path to the configuration file.
    let config = match std::env::args().nth(1) {
        Some(config_path) => Config::try_from_file(&config_path)?,
        None => {
            info!("No configuration file given, using defaults.");
            Config::default()
        }
    };

    let driver = Driver::new(config)?;
    driver.run()
}
