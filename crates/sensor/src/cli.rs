use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Distributed traffic sensor: scores observed IPs against an
/// arbiter-managed reputation mirror and reports alerts and block
/// recommendations.
#[derive(Parser)]
#[command(name = "traffic-sensor", version, about)]
pub struct Cli {
    /// Verbose logging (overrides the DEBUG environment variable).
    #[arg(long)]
    pub debug: bool,

    /// Score store location (overrides STORE_PATH).
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the sensor version and exit.
    Version,
}

pub fn parse() -> Cli {
    Cli::parse()
}
