//! # Commands Module
//!
//! One handler per subcommand. Handlers write to the `out` they are given
//! so tests can capture what a user would see.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs      ◄─── You are here (dispatch)
//! ├── records.rs  ◄─── list, add, summary
//! ├── sync.rs     ◄─── flush, status, pending, watch
//! └── config.rs   ◄─── config show, config init
//! ```

pub mod config;
pub mod records;
pub mod sync;

use std::io::Write;

use crate::args::Command;
use crate::state::AppState;

/// Runs a command that needs the engine.
///
/// `config` subcommands are handled before state is opened and are rejected
/// here.
pub async fn execute(
    command: &Command,
    state: &AppState,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::List(args) => records::list(state, args, json, out).await,
        Command::Add(args) => records::add(state, args, json, out).await,
        Command::Summary => records::summary(state, json, out).await,
        Command::Flush => sync::flush(state, json, out).await,
        Command::Status => sync::status(state, json, out),
        Command::Pending => sync::pending(state, json, out).await,
        Command::Watch => sync::watch(state, tokio::signal::ctrl_c(), out).await,
        Command::Config(_) => anyhow::bail!("config commands do not use the sync engine"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tally_sync::SyncConfig;

    use crate::state::AppState;

    /// In-memory state over the in-process remote, simulation off.
    pub(crate) async fn test_state(offline: bool) -> AppState {
        let mut config = SyncConfig::default();
        config.api.base_url = tally_sync::remote::MEMORY_URL.to_string();
        config.simulation.enabled = false;
        config.simulation.failure_rate = 0.0;
        config.engine.seed_demo_data = false;
        AppState::ephemeral(config, offline).await.unwrap()
    }

    pub(crate) fn output(out: &[u8]) -> String {
        String::from_utf8(out.to_vec()).unwrap()
    }
}
