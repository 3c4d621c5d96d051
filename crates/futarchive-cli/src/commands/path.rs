use futarchive_core::{filename_from_contract_id, AppConfig, ContractId, Resolution};
use serde::Serialize;

use crate::cli::PathArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct PathResponseData {
    contract: String,
    resolution: Resolution,
    file: String,
    path: String,
    exists: bool,
}

pub fn run(args: &PathArgs, config: &AppConfig) -> Result<CommandResult, CliError> {
    let registry = config.registry()?;
    let contract = ContractId::parse(&args.contract)?;
    let resolution = Resolution::from(args.resolution);
    let file = filename_from_contract_id(&contract, &registry, resolution)?;
    let path = config.archive_dir().join(&file);

    let data = serde_json::to_value(PathResponseData {
        contract: contract.to_string(),
        resolution,
        exists: path.exists(),
        path: path.display().to_string(),
        file,
    })?;
    Ok(CommandResult::ok(data))
}
