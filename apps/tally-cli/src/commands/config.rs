//! # Config Commands
//!
//! `tally config show` and `tally config init`. Neither opens the database.

use anyhow::{bail, Context};
use std::io::Write;
use std::path::PathBuf;

use tally_sync::SyncConfig;

use crate::args::ConfigCommand;

pub fn run(
    command: &ConfigCommand,
    config_path: Option<PathBuf>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => show(config_path, out),
        ConfigCommand::Init { force } => init(config_path, *force, out),
    }
}

/// Prints the effective configuration: file, then environment, then defaults.
fn show(config_path: Option<PathBuf>, out: &mut impl Write) -> anyhow::Result<()> {
    let config = SyncConfig::load(config_path).context("loading configuration")?;

    write!(out, "{}", toml::to_string_pretty(&config)?)?;
    writeln!(out, "\n# database: {}", config.database_path().display())?;
    Ok(())
}

fn init(config_path: Option<PathBuf>, force: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let path = config_path
        .or_else(SyncConfig::default_config_path)
        .context("no configuration directory on this platform, pass --config")?;

    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }

    let written = SyncConfig::default()
        .save(Some(path))
        .context("writing configuration")?;
    writeln!(out, "Wrote {}", written.display())?;
    Ok(())
}
