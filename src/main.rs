mod cli;
mod commands;
mod config;
mod engine;
mod resource;
mod state;
mod ui;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};

/// Global context for the application
pub struct Context {
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context { quiet: cli.quiet };

    match cli.command {
        Command::Plan { target } => commands::converge::plan(&ctx, &cli.manifest, target.as_deref()),
        Command::Apply { target, yes } => {
            commands::converge::apply(&ctx, &cli.manifest, target.as_deref(), yes)
        }
        Command::Destroy { target, yes } => {
            commands::converge::destroy(&cli.manifest, target.as_deref(), yes)
        }
        Command::Show { target } => commands::show::run(&cli.manifest, target.as_deref()),
    }
}
