//! Legacy archive migration.
//!
//! Older archives named files `{code}_{YYYYMM}00.csv` with no resolution
//! prefix. The resolution is recovered from the row cadence: the median gap
//! between the last [`CADENCE_SAMPLE`] timestamps.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::archive::ArchiveStore;
use crate::domain::timestamp::parse_archive;
use crate::domain::Resolution;
use crate::ArchiveError;

/// Rows sampled from the end of a file to estimate its cadence.
pub const CADENCE_SAMPLE: usize = 100;

/// One-day cadences with more than this intraday remainder are unreliable.
const UNRELIABLE_REMAINDER_SECS: i64 = 64_800;

const SECONDS_PER_DAY: i64 = 86_400;

/// Legacy files with at most this many rows are deleted whatever their cadence.
pub const SHORT_FILE_ROWS: usize = 21;

/// What a legacy file's cadence says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Rename with this resolution prefix.
    Keep(Resolution),
    /// Three days or more between rows.
    Stale,
    /// One day plus a large intraday remainder.
    Unreliable,
    /// Fewer than two rows, or no gap between them.
    Degenerate,
    /// Timestamps run backwards.
    Unordered,
}

/// Classify a median row gap.
pub fn classify_cadence(delta: Option<Duration>) -> Cadence {
    let Some(delta) = delta else {
        return Cadence::Degenerate;
    };
    if delta.is_negative() {
        return Cadence::Unordered;
    }

    let total = delta.whole_seconds();
    let days = total.div_euclid(SECONDS_PER_DAY);
    let seconds = total.rem_euclid(SECONDS_PER_DAY);

    match days {
        d if d >= 3 => Cadence::Stale,
        2 => Cadence::Keep(Resolution::Day),
        1 if seconds > UNRELIABLE_REMAINDER_SECS => Cadence::Unreliable,
        1 => Cadence::Keep(Resolution::Day),
        _ if seconds > 0 => Cadence::Keep(Resolution::Hour),
        _ => Cadence::Degenerate,
    }
}

/// Median gap between consecutive timestamps among the last [`CADENCE_SAMPLE`].
pub fn median_delta(index: &[OffsetDateTime]) -> Option<Duration> {
    let tail = &index[index.len().saturating_sub(CADENCE_SAMPLE)..];
    let mut deltas: Vec<Duration> = tail.windows(2).map(|pair| pair[1] - pair[0]).collect();
    if deltas.is_empty() {
        return None;
    }
    deltas.sort();

    let middle = deltas.len() / 2;
    if deltas.len() % 2 == 1 {
        Some(deltas[middle])
    } else {
        Some((deltas[middle - 1] + deltas[middle]) / 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MigrationAction {
    Rename { from: PathBuf, to: PathBuf },
    Delete { path: PathBuf, reason: String },
    Skip { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationProblem {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// False for a plan-only pass.
    pub executed: bool,
    pub actions: Vec<MigrationAction>,
    pub problems: Vec<MigrationProblem>,
}

/// Plan (and with `execute`, apply) the migration of every legacy file of `instruments`.
///
/// Unreadable files are reported and left alone; the pass carries on.
pub fn migrate_legacy(
    store: &ArchiveStore,
    instruments: &[String],
    execute: bool,
) -> Result<MigrationReport, ArchiveError> {
    let mut report = MigrationReport {
        executed: execute,
        ..MigrationReport::default()
    };

    for code in instruments {
        for path in store.legacy_files(code)? {
            let action = match plan_file(&path) {
                Ok(action) => action,
                Err(error) => {
                    warn!(path = %path.display(), %error, "cannot read legacy file");
                    report.problems.push(MigrationProblem {
                        path,
                        message: error.to_string(),
                    });
                    continue;
                }
            };

            if execute {
                if let Err(error) = apply(&action) {
                    report.problems.push(MigrationProblem {
                        path,
                        message: error.to_string(),
                    });
                    continue;
                }
            }
            report.actions.push(action);
        }
    }

    info!(
        actions = report.actions.len(),
        problems = report.problems.len(),
        executed = execute,
        "legacy migration finished"
    );
    Ok(report)
}

fn plan_file(path: &Path) -> Result<MigrationAction, ArchiveError> {
    let index = read_index(path)?;
    let delta = median_delta(&index);
    let path = path.to_path_buf();
    if delta.is_some() && index.len() <= SHORT_FILE_ROWS {
        return Ok(MigrationAction::Delete {
            path,
            reason: format!("{} rows, too few to keep", index.len()),
        });
    }
    let cadence = classify_cadence(delta);

    Ok(match cadence {
        Cadence::Keep(resolution) => {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let to = path.with_file_name(format!("{resolution}_{name}"));
            if to.exists() {
                MigrationAction::Skip {
                    path,
                    reason: format!("{} already exists", to.display()),
                }
            } else {
                MigrationAction::Rename { from: path, to }
            }
        }
        Cadence::Stale => MigrationAction::Delete {
            path,
            reason: String::from("three days or more between rows"),
        },
        Cadence::Unreliable => MigrationAction::Delete {
            path,
            reason: String::from("daily rows with a large intraday offset"),
        },
        Cadence::Degenerate => MigrationAction::Delete {
            path,
            reason: String::from("no usable row cadence"),
        },
        Cadence::Unordered => MigrationAction::Skip {
            path,
            reason: String::from("timestamps are not in order"),
        },
    })
}

fn apply(action: &MigrationAction) -> Result<(), ArchiveError> {
    match action {
        MigrationAction::Rename { from, to } => {
            info!(from = %from.display(), to = %to.display(), "renaming legacy file");
            fs::rename(from, to)?;
        }
        MigrationAction::Delete { path, reason } => {
            info!(path = %path.display(), %reason, "deleting legacy file");
            fs::remove_file(path)?;
        }
        MigrationAction::Skip { path, reason } => {
            warn!(path = %path.display(), %reason, "leaving legacy file in place");
        }
    }
    Ok(())
}

fn read_index(path: &Path) -> Result<Vec<OffsetDateTime>, ArchiveError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut index = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let ts = parse_archive(record.get(0).unwrap_or_default()).map_err(|error| {
            ArchiveError::Integrity {
                path: path.to_path_buf(),
                reason: format!("row {}: {error}", row + 1),
            }
        })?;
        index.push(ts);
    }
    Ok(index)
}
