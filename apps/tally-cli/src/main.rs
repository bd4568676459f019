//! # Tally Entry Point
//!
//! Parses arguments and hands over to [`tally_cli::run`].

use clap::Parser;
use std::process::ExitCode;

use tally_cli::args::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    tally_cli::init_tracing();

    let cli = Cli::parse();
    match tally_cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
