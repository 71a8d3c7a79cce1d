//! Binary crate for the `supernova` chat bot.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration and database migrations
//! - Command dispatch with role-based authorization

use clap::Parser;

mod bot;
mod cli;
mod command;
mod logging;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.load_env()?;
    logging::init();
    cmd.run().await
}
