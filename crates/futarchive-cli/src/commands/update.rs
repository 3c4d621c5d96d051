use std::sync::Arc;

use futarchive_core::{AppConfig, ArchiveStore, Reconciler, ValidationError};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

use crate::cli::UpdateArgs;
use crate::error::CliError;

use super::{close_after_error, close_driver, open_driver, CommandResult};

pub async fn run(args: &UpdateArgs, mut config: AppConfig) -> Result<CommandResult, CliError> {
    if args.hourly_only {
        config.daily = false;
    }
    if args.no_pause {
        config.pause_between_downloads = false;
    }

    let from_date = match &args.from {
        Some(raw) => parse_from_date(raw)?,
        None => OffsetDateTime::now_utc().date() - Duration::days(365),
    };
    let instruments = if args.instruments.is_empty() {
        config.update_list.clone()
    } else {
        Some(args.instruments.clone())
    };

    let registry = Arc::new(config.registry()?);
    let driver = open_driver(&config, args.anonymous).await?;
    let engine = Reconciler::new(
        driver.clone(),
        registry,
        ArchiveStore::new(config.archive_dir()),
        config.engine_options(),
    );
    let report = match engine.update_downloads(instruments.as_deref(), from_date).await {
        Ok(report) => report,
        Err(error) if config.dry_run => return Err(error.into()),
        Err(error) => return Err(close_after_error(driver.as_ref(), error.into()).await),
    };

    let result = CommandResult::ok(serde_json::to_value(&report)?)
        .with_failed_units(report.failures.len() + report.integrity_problems.len())
        .with_aborted(report.aborted);

    if config.dry_run {
        return Ok(result);
    }
    Ok(close_driver(driver.as_ref(), result).await)
}

fn parse_from_date(raw: &str) -> Result<Date, CliError> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        CliError::Validation(ValidationError::InvalidTimestamp {
            value: raw.to_owned(),
        })
    })
}
