mod contracts;
mod download;
mod migrate;
mod path;
mod update;

use std::sync::Arc;

use futarchive_core::{
    build_contract_list, parse_contract_list, AppConfig, BarchartDriver, ContractId, DownloadDriver,
    NoopHttpClient, Registry, ReqwestHttpClient,
};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::cli::{Cli, Command, YearRangeArgs};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    /// Units or files that failed; a non-zero count exits with 3.
    pub failed_units: usize,
    /// Quota exhaustion stopped the run; exits with 5.
    pub aborted: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            failed_units: 0,
            aborted: false,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_failed_units(mut self, failed_units: usize) -> Self {
        self.failed_units = failed_units;
        self
    }

    pub fn with_aborted(mut self, aborted: bool) -> Self {
        self.aborted = aborted;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.archive_dir {
        config.archive_dir = Some(dir.clone());
    }
    if cli.dry_run {
        config.dry_run = true;
    }

    match &cli.command {
        Command::Download(args) => download::run(args, config).await,
        Command::Update(args) => update::run(args, config).await,
        Command::Migrate(args) => migrate::run(args, &config),
        Command::Contracts(args) => contracts::run(args, &config),
        Command::Path(args) => path::run(args, &config),
    }
}

/// Contracts to process, plus explicit ids that were skipped.
struct WorkList {
    contracts: Vec<ContractId>,
    skipped: Vec<String>,
}

impl WorkList {
    fn warnings(&self) -> impl Iterator<Item = String> + '_ {
        self.skipped.iter().map(|message| format!("skipped {message}"))
    }
}

/// Work-list from explicit ids (flags, then config) or the universe builder.
///
/// Explicit ids whose root is not configured are skipped, not fatal.
fn work_list(
    range: &YearRangeArgs,
    config: &AppConfig,
    registry: &Registry,
) -> Result<WorkList, CliError> {
    let explicit = if range.contracts.is_empty() {
        config.contract_list.clone()
    } else {
        Some(range.contracts.clone())
    };

    if let Some(ids) = explicit {
        let mut list = WorkList {
            contracts: Vec::new(),
            skipped: Vec::new(),
        };
        for contract in parse_contract_list(&ids)? {
            match registry.instrument_for_root(contract.root()) {
                Ok(_) => list.contracts.push(contract),
                Err(error) => {
                    warn!(%contract, %error, "skipping contract");
                    list.skipped.push(format!("{contract}: {error}"));
                }
            }
        }
        return Ok(list);
    }

    let (start, end) = config.year_range(OffsetDateTime::now_utc().year());
    let start = range.start_year.unwrap_or(start);
    let end = range.end_year.unwrap_or(end);
    let instruments = if range.instruments.is_empty() {
        config.download_list.clone()
    } else {
        Some(range.instruments.clone())
    };

    Ok(WorkList {
        contracts: build_contract_list(registry, start, end, instruments.as_deref())?,
        skipped: Vec::new(),
    })
}

/// Provider session; dry runs get an offline driver that never leaves the process.
async fn open_driver(config: &AppConfig, anonymous: bool) -> Result<Arc<BarchartDriver>, CliError> {
    if config.dry_run {
        return Ok(Arc::new(BarchartDriver::new(Arc::new(NoopHttpClient))?));
    }

    let authenticate = !anonymous;
    info!(authenticate, "opening provider session");
    let driver = BarchartDriver::open_session(
        &config.credentials(),
        authenticate,
        Arc::new(ReqwestHttpClient::default()),
    )
    .await?;
    Ok(Arc::new(driver))
}

/// Close the session, turning a failure into a warning.
async fn close_driver(driver: &dyn DownloadDriver, result: CommandResult) -> CommandResult {
    match driver.close_session().await {
        Ok(()) => result,
        Err(error) => result.with_warning(format!("failed to close provider session: {error}")),
    }
}

/// Close the session on a failed command; the command's error is kept.
async fn close_after_error(driver: &dyn DownloadDriver, error: CliError) -> CliError {
    if let Err(close_error) = driver.close_session().await {
        warn!(error = %close_error, "failed to close provider session");
    }
    error
}
