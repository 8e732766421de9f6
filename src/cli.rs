use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nixverge")]
#[command(version)]
#[command(about = "Converge NixOS machines and Nix builds on declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the manifest file
    #[arg(short, long, global = true, default_value = "nixverge.toml")]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what would change without touching anything
    Plan {
        /// Only plan a specific build or host
        target: Option<String>,
    },

    /// Build and activate everything the manifest declares
    Apply {
        /// Only apply a specific build or host
        target: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove everything nixverge created for this manifest
    Destroy {
        /// Only destroy a specific build or host
        target: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show recorded state for builds and hosts
    Show {
        /// Only show a specific build or host
        target: Option<String>,
    },
}
