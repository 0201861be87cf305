mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod judge;
mod model;
mod semantic;
mod store;
mod system;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::Workspace;

fn main() {
    init_tracing();

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
    let workspace = Workspace::new(&cli.config_root, &cli.data_root);

    match cli.command {
        Commands::Run(args) => commands::run::run(&workspace, args),
        Commands::Compare(args) => commands::compare::run(&workspace, args),
        Commands::List(args) => commands::list::run(&workspace, args),
        Commands::Show(args) => commands::show::run(&workspace, args),
        Commands::Stats(args) => commands::stats::run(&workspace, args),
        Commands::Index(args) => commands::index::run(args),
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
