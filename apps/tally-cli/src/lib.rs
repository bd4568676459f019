//! # Tally CLI Library
//!
//! Command handlers and wiring behind the `tally` binary.
//!
//! ## Module Organization
//! ```text
//! tally_cli/
//! ├── lib.rs          ◄─── You are here (tracing setup & run)
//! ├── args.rs         ◄─── clap definitions
//! ├── state.rs        ◄─── AppState: config, store, engine, facade
//! └── commands/
//!     ├── mod.rs      ◄─── Dispatch
//!     ├── records.rs  ◄─── list, add, summary
//!     ├── sync.rs     ◄─── flush, status, pending, watch
//!     └── config.rs   ◄─── config show, config init
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Command Startup                                │
//! │                                                                         │
//! │  1. Initialize Logging                                                  │
//! │     • tracing-subscriber with env filter, written to stderr             │
//! │     • Default: info, can be overridden with RUST_LOG                    │
//! │                                                                         │
//! │  2. Load SyncConfig (file → environment → validate)                     │
//! │     • `config` subcommands stop here                                    │
//! │                                                                         │
//! │  3. Open Database (WAL mode, migrations applied)                        │
//! │                                                                         │
//! │  4. Start SyncEngine, build RecordsFacade                               │
//! │                                                                         │
//! │  5. Run the command, then shut the engine down and close the pool       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod args;
pub mod commands;
pub mod state;

use anyhow::Context;
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_sync::SyncConfig;

use args::{Cli, Command};
use state::AppState;

/// Initializes the tracing subscriber for structured logging.
///
/// Output goes to stderr so `--json` output on stdout stays parseable.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tally=trace` - Show trace for tally crates only
/// - Default: INFO level
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Runs one command to completion.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stdout = io::stdout();

    if let Command::Config(command) = &cli.command {
        return commands::config::run(command, cli.config, &mut stdout);
    }

    let config = SyncConfig::load(cli.config).context("loading configuration")?;
    info!(remote = %config.api.base_url, offline = cli.offline, "Starting tally");

    let state = AppState::open(config, cli.offline).await?;
    let result = commands::execute(&cli.command, &state, cli.json, &mut stdout).await;
    state.close().await?;
    result
}
