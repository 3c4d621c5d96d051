use std::fs;
use std::sync::Arc;

use futarchive_core::{AppConfig, ArchiveStore, Reconciler};
use tracing::info;

use crate::cli::DownloadArgs;
use crate::error::CliError;

use super::{close_driver, open_driver, work_list, CommandResult};

pub async fn run(args: &DownloadArgs, mut config: AppConfig) -> Result<CommandResult, CliError> {
    if args.hourly_only {
        config.daily = false;
    }
    if args.no_pause {
        config.pause_between_downloads = false;
    }

    let registry = Arc::new(config.registry()?);
    let list = work_list(&args.range, &config, &registry)?;
    info!(contracts = list.contracts.len(), dry_run = config.dry_run, "download work-list ready");

    let archive_dir = config.archive_dir();
    if !config.dry_run {
        fs::create_dir_all(&archive_dir)?;
    }

    let driver = open_driver(&config, args.anonymous).await?;
    let engine = Reconciler::new(
        driver.clone(),
        registry,
        ArchiveStore::new(archive_dir),
        config.engine_options(),
    );
    let report = engine.run_downloads(&list.contracts).await;

    let mut result = CommandResult::ok(serde_json::to_value(&report)?)
        .with_failed_units(report.failures.len() + list.skipped.len())
        .with_aborted(report.aborted);
    for warning in list.warnings() {
        result = result.with_warning(warning);
    }

    if config.dry_run {
        return Ok(result);
    }
    Ok(close_driver(driver.as_ref(), result).await)
}
