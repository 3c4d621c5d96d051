use futarchive_core::{migrate_legacy, AppConfig, ArchiveStore};

use crate::cli::MigrateArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &MigrateArgs, config: &AppConfig) -> Result<CommandResult, CliError> {
    let instruments = if !args.instruments.is_empty() {
        args.instruments.clone()
    } else if let Some(list) = &config.update_list {
        list.clone()
    } else {
        let registry = config.registry()?;
        registry
            .instruments()
            .filter(|(_, instrument)| !instrument.is_excluded())
            .map(|(code, _)| code.to_owned())
            .collect()
    };

    let execute = args.execute && !config.dry_run;
    let store = ArchiveStore::new(config.archive_dir());
    let report = migrate_legacy(&store, &instruments, execute)?;

    let mut result =
        CommandResult::ok(serde_json::to_value(&report)?).with_failed_units(report.problems.len());
    if args.execute && config.dry_run {
        result = result.with_warning("--execute ignored in dry-run mode");
    }
    Ok(result)
}
