//! JSON rendering of command results on stdout.

use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::commands::CommandResult;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    command: &'a str,
    generated_at: String,
    warnings: &'a [String],
    data: &'a Value,
}

pub fn render(command: &str, result: &CommandResult, pretty: bool) -> Result<(), CliError> {
    let payload = to_json(command, result, pretty)?;
    println!("{payload}");
    Ok(())
}

fn to_json(command: &str, result: &CommandResult, pretty: bool) -> Result<String, CliError> {
    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|error| CliError::Command(format!("failed to format timestamp: {error}")))?;
    let envelope = Envelope {
        command,
        generated_at,
        warnings: &result.warnings,
        data: &result.data,
    };

    Ok(if pretty {
        serde_json::to_string_pretty(&envelope)?
    } else {
        serde_json::to_string(&envelope)?
    })
}
