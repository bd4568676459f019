//! Command line interface definition for `tally`.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use tally_core::{Category, NewRecord};

/// tally: record expenses, even when the records service is unreachable.
///
/// Records that cannot be submitted are kept in a local queue and shown with
/// a provisional id until `tally flush` delivers them.
#[derive(Debug, Parser)]
#[command(name = "tally", version)]
pub struct Cli {
    /// Configuration file. Defaults to tally.toml in the platform config
    /// directory.
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Treat the records service as unreachable for this run.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List records, from the service when reachable, cached otherwise.
    List(ListArgs),
    /// Record a new expense.
    Add(AddArgs),
    /// Deliver queued records to the service.
    Flush,
    /// Show connectivity and the number of queued records.
    Status,
    /// List queued records, oldest first.
    Pending,
    /// Keep running and deliver queued records in the background.
    Watch,
    /// Show spend totals.
    Summary,
    /// Inspect or create the configuration file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for `tally list`.
#[derive(Debug, Default, Args)]
pub struct ListArgs {
    /// Order by expense date. Without it records keep the service's order.
    #[arg(long, value_enum)]
    pub sort: Option<DateOrder>,

    /// Print one section per category.
    #[arg(long)]
    pub by_category: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DateOrder {
    Newest,
    Oldest,
}

/// Arguments for `tally add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// Who was paid.
    #[arg(long)]
    pub merchant: String,

    /// Amount in currency units.
    #[arg(long, allow_hyphen_values = true)]
    pub amount: f64,

    /// One of Food, Transport, Entertainment, Utilities, Shopping,
    /// Healthcare, Other.
    #[arg(long, default_value = "Other")]
    pub category: Category,

    /// When the expense happened: YYYY-MM-DD or RFC 3339. Defaults to now.
    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,
}

impl AddArgs {
    pub fn to_payload(&self) -> NewRecord {
        let payload = NewRecord::new(self.merchant.clone(), self.amount, self.category);
        match self.date {
            Some(date) => payload.with_date(date),
            None => payload,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Parses `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD or RFC 3339", raw))
}
