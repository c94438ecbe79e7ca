mod cli;
mod collab;
mod commands;
mod error;
mod eval;
mod model;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        warn!(error = %err, "failed to load .env");
    }

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Questions(args) => commands::questions::run(args),
        Commands::Retrieve(args) => commands::retrieve::run(args),
        Commands::Sweep(args) => commands::sweep::run(args),
        Commands::Judge(args) => commands::judge::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
