use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use ratewatch::history::DEFAULT_LIMIT;
use ratewatch::poll::LIVE_INTERVAL;
use ratewatch::rate::{HISTORY_MAX_GAP_SECS, LIVE_MAX_GAP_SECS};
use ratewatch::source::DEFAULT_BASE_URL;
use ratewatch::timezone::parse_timestamp;
use ratewatch::units::NetworkUnit;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Where display preferences are persisted
    #[arg(long, global = true, default_value = "ratewatch-prefs.json")]
    pub prefs: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the current snapshot and print live rates
    Live(Live),
    /// Print the rate series of a historical range
    History(History),
    /// Show or change display preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct SourceArgs {
    /// Base URL of the metrics API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub url: String,

    /// Bearer token for the metrics API
    #[arg(long)]
    pub token: Option<String>,

    /// Read snapshots from a JSON file instead of the API
    #[arg(long, conflicts_with_all = ["url", "token"])]
    pub file: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
pub struct Live {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = LIVE_INTERVAL.as_millis() as u64)]
    pub interval_ms: u64,

    /// Longest gap between two polls that still yields a rate
    #[arg(long, default_value_t = LIVE_MAX_GAP_SECS)]
    pub max_gap_secs: f64,

    /// Stop after this many frames
    #[arg(long)]
    pub ticks: Option<usize>,

    /// Override the stored unit for this run
    #[arg(long, value_enum)]
    pub unit: Option<UnitOpt>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone, Debug)]
pub struct History {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Range start (RFC 3339; a timestamp without offset is UTC)
    #[arg(long, value_parser = parse_instant)]
    pub start: Option<DateTime<Utc>>,

    /// Range end, defaults to now
    #[arg(long, value_parser = parse_instant)]
    pub end: Option<DateTime<Utc>>,

    /// Range length when --start is omitted
    #[arg(long, default_value_t = 24)]
    pub hours: i64,

    /// Maximum number of snapshots requested
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub limit: u32,

    /// Longest gap between two stored points that still yields a rate
    #[arg(long, default_value_t = HISTORY_MAX_GAP_SECS)]
    pub max_gap_secs: f64,

    /// Override the stored timezone for this run
    #[arg(long)]
    pub zone: Option<String>,

    /// Override the stored unit for this run
    #[arg(long, value_enum)]
    pub unit: Option<UnitOpt>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PrefsAction {
    /// Print the stored preferences
    Show,
    /// Store the network unit
    Unit {
        #[arg(value_enum)]
        unit: UnitOpt,
    },
    /// Store the display timezone (IANA identifier, e.g. Europe/Paris)
    Zone { zone: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitOpt {
    ByteRate,
    BitRate,
}

impl From<UnitOpt> for NetworkUnit {
    fn from(v: UnitOpt) -> Self {
        match v {
            UnitOpt::ByteRate => NetworkUnit::ByteRate,
            UnitOpt::BitRate => NetworkUnit::BitRate,
        }
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| format!("`{raw}` is not an RFC 3339 timestamp"))
}
