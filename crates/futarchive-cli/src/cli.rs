//! CLI argument definitions for futarchive.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `download` | Download every missing contract file |
//! | `update` | Append recent bars to existing contract files |
//! | `migrate` | Rename or delete legacy files without a resolution prefix |
//! | `contracts` | Print the download work-list |
//! | `path` | Print the archive file name for a contract id |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `futarchive.yaml` if present | YAML configuration file |
//! | `--archive-dir` | from config | Archive directory |
//! | `--dry-run` | `false` | Plan without network calls or writes |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! # Plan a download of AUD and GOLD contracts for 2023 and 2024
//! futarchive download --instrument AUD --instrument GOLD --start-year 2023 --end-year 2025 --dry-run
//!
//! # Hourly files only, no pauses
//! futarchive download --hourly-only --no-pause
//!
//! # Bring existing files up to date
//! futarchive update --from 2024-01-01
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use futarchive_core::Resolution;

/// futarchive - futures price archive maintainer
///
/// Keeps a directory of per-contract CSV price files in sync with the
/// provider, one (contract, resolution) unit at a time.
#[derive(Debug, Parser)]
#[command(
    name = "futarchive",
    author,
    version,
    about = "Futures contract price archive maintainer",
    long_about = "futarchive downloads historical futures prices into a local archive of \
per-contract CSV files and keeps them current.\n\
\n\
  • Round-robin work-list across instruments, newest contracts first\n\
  • Skips files already on disk, so interrupted runs resume cleanly\n\
  • Stops at the provider's daily download quota\n\
\n\
Use 'futarchive <command> --help' for command-specific help."
)]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Archive directory; overrides the configuration file.
    #[arg(long, global = true)]
    pub archive_dir: Option<PathBuf>,

    /// Log what would happen without network calls or file writes.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download missing contract files.
    Download(DownloadArgs),
    /// Append recent prices to existing contract files.
    Update(UpdateArgs),
    /// Migrate legacy files named without a resolution prefix.
    Migrate(MigrateArgs),
    /// Print the contract work-list without downloading.
    Contracts(ContractsArgs),
    /// Print the archive file name for a contract id.
    Path(PathArgs),
}

impl Command {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Update(_) => "update",
            Self::Migrate(_) => "migrate",
            Self::Contracts(_) => "contracts",
            Self::Path(_) => "path",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct YearRangeArgs {
    /// First contract year (inclusive).
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last contract year (exclusive).
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Restrict to these instrument codes (repeatable).
    #[arg(long = "instrument", short = 'i')]
    pub instruments: Vec<String>,

    /// Explicit contract ids, e.g. A6H20 (repeatable); replaces the work-list.
    #[arg(long = "contract", short = 'c')]
    pub contracts: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub range: YearRangeArgs,

    /// Skip daily files.
    #[arg(long, default_value_t = false)]
    pub hourly_only: bool,

    /// No random pause between downloads.
    #[arg(long, default_value_t = false)]
    pub no_pause: bool,

    /// Use the site without logging in.
    #[arg(long, default_value_t = false)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    /// Restrict to these instrument codes (repeatable).
    #[arg(long = "instrument", short = 'i')]
    pub instruments: Vec<String>,

    /// Only update contracts whose month is after this date (YYYY-MM-DD).
    /// Defaults to one year ago.
    #[arg(long)]
    pub from: Option<String>,

    /// Skip daily files.
    #[arg(long, default_value_t = false)]
    pub hourly_only: bool,

    /// No random pause between updates.
    #[arg(long, default_value_t = false)]
    pub no_pause: bool,

    /// Use the site without logging in.
    #[arg(long, default_value_t = false)]
    pub anonymous: bool,
}

#[derive(Debug, Clone, Args)]
pub struct MigrateArgs {
    /// Restrict to these instrument codes (repeatable).
    #[arg(long = "instrument", short = 'i')]
    pub instruments: Vec<String>,

    /// Rename and delete files; without this flag the plan is only printed.
    #[arg(long, default_value_t = false)]
    pub execute: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ContractsArgs {
    #[command(flatten)]
    pub range: YearRangeArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PathArgs {
    /// Contract id, e.g. A6H20.
    pub contract: String,

    #[arg(long, value_enum, default_value_t = ResolutionArg::Hour)]
    pub resolution: ResolutionArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    Day,
    Hour,
}

impl From<ResolutionArg> for Resolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Day => Self::Day,
            ResolutionArg::Hour => Self::Hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn download_flags_parse() {
        let cli = Cli::parse_from([
            "futarchive",
            "download",
            "-i",
            "AUD",
            "--instrument",
            "GOLD",
            "--start-year",
            "2023",
            "--hourly-only",
            "--dry-run",
        ]);

        assert!(cli.dry_run);
        match cli.command {
            Command::Download(args) => {
                assert_eq!(args.range.instruments, ["AUD", "GOLD"]);
                assert_eq!(args.range.start_year, Some(2023));
                assert!(args.hourly_only);
                assert!(!args.no_pause);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn path_defaults_to_hourly() {
        let cli = Cli::parse_from(["futarchive", "path", "A6H20"]);
        match cli.command {
            Command::Path(args) => assert_eq!(Resolution::from(args.resolution), Resolution::Hour),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
