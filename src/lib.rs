pub mod automap;
pub mod cli;
pub mod compare;
pub mod error;
pub mod executor;
pub mod index;
pub mod io_utils;
pub mod mapping;
pub mod matcher;
pub mod migrate;
pub mod parser;
pub mod preview;
pub mod profile;
pub mod reconcile;
pub mod report;
pub mod session;
pub mod spreadsheet;
pub mod store;
pub mod table;
pub mod values;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_migrate", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Preview(args) => preview::execute(&args),
        Commands::Compare(args) => compare::execute(&args),
        Commands::Automap(args) => automap::execute(&args),
        Commands::Migrate(args) => migrate::execute(&args),
    }
}
