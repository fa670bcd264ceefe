//! Binary crate for the `meteoclock` station.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and installing the logger
//! - Wiring real transport, network and console display into the core
//! - Interactive configuration

use clap::Parser;

mod cli;
mod console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.init_logging();
    cmd.run().await
}
