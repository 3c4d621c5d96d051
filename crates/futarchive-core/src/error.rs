use std::path::PathBuf;

use thiserror::Error;

use crate::driver::ProviderError;
use crate::normalize::NormalizeError;

/// Validation errors for identifiers, filenames, and series invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("contract id '{value}' must end with a month letter and a 2-digit year")]
    MalformedContractId { value: String },

    #[error("unknown resolution token '{value}', expected one of Day, Hour")]
    UnknownResolution { value: String },

    #[error("archive filename '{value}' does not match {{Resolution}}_{{Code}}_{{YYYYMM}}00.csv")]
    MalformedFilename { value: String },

    #[error("month {value} is outside 1..=12")]
    InvalidMonth { value: u8 },

    #[error("year {value} cannot be encoded as a contract year")]
    InvalidYear { value: i32 },

    #[error("unknown month letter '{letter}'")]
    UnknownMonthLetter { letter: char },

    #[error("timestamp '{value}' is not in archive format YYYY-MM-DDTHH:MM:SS+HHMM")]
    InvalidTimestamp { value: String },

    #[error("series timestamps must be strictly increasing (row {index})")]
    UnorderedSeries { index: usize },

    #[error("duplicate timestamp {value} in series")]
    DuplicateTimestamp { value: String },
}

/// Instrument and exchange configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("instrument '{instrument}' has no exchange configured")]
    MissingExchange { instrument: String },

    #[error("exchange '{exchange}' is not in the exchange registry")]
    UnknownExchange { exchange: String },

    #[error("instrument '{instrument}' is not in the instrument registry")]
    UnknownInstrument { instrument: String },

    #[error("no instrument is configured with root symbol '{root}'")]
    UnknownRoot { root: String },

    #[error("root symbol '{root}' is used by both '{first}' and '{second}'")]
    DuplicateRoot {
        root: String,
        first: String,
        second: String,
    },

    #[error("roll cycle '{cycle}' for '{instrument}' contains invalid month letters")]
    InvalidCycle { instrument: String, cycle: String },

    #[error("invalid date '{value}' for exchange '{exchange}', expected YYYY-MM-DD")]
    InvalidExchangeDate { exchange: String, value: String },

    #[error("year range {start}..{end} is empty")]
    EmptyYearRange { start: i32, end: i32 },

    #[error("failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("credentials are required for an authenticated session")]
    MissingCredentials,
}

/// Errors from lookups that combine identifier parsing with registry state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by the archive reconciliation engine.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive file {path} has an invalid index and needs manual inspection: {reason}")]
    Integrity { path: PathBuf, reason: String },

    #[error("archive file {path} was updated recently (last bar {last})")]
    RecentUpdate { path: PathBuf, last: String },

    #[error("provider returned no new data for contract '{contract}'")]
    EmptyData { contract: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<CoreError> for ArchiveError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Config(error) => Self::Config(error),
        }
    }
}

impl ArchiveError {
    /// True when the whole run must stop, not just the current unit.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Provider(error) if error.is_quota_exceeded())
    }
}
