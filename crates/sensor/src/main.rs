#![forbid(unsafe_code)]

mod cli;
mod shutdown;
mod startup;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();

    match cli.command {
        Some(cli::Command::Version) => {
            println!("traffic-sensor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => startup::run(&cli).await,
    }
}
