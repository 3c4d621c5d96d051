use futarchive_core::{filename_from_contract_id, AppConfig, Resolution};
use serde::Serialize;

use crate::cli::ContractsArgs;
use crate::error::CliError;

use super::{work_list, CommandResult};

#[derive(Debug, Serialize)]
struct WorkItem {
    contract: String,
    hourly_file: String,
}

#[derive(Debug, Serialize)]
struct ContractsResponseData {
    count: usize,
    contracts: Vec<WorkItem>,
}

pub fn run(args: &ContractsArgs, config: &AppConfig) -> Result<CommandResult, CliError> {
    let registry = config.registry()?;
    let list = work_list(&args.range, config, &registry)?;

    let items = list
        .contracts
        .iter()
        .map(|contract| -> Result<WorkItem, CliError> {
            Ok(WorkItem {
                contract: contract.to_string(),
                hourly_file: filename_from_contract_id(contract, &registry, Resolution::Hour)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let data = serde_json::to_value(ContractsResponseData {
        count: items.len(),
        contracts: items,
    })?;
    Ok(list
        .warnings()
        .fold(CommandResult::ok(data), |result, warning| result.with_warning(warning)))
}
