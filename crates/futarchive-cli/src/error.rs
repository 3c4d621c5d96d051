use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] futarchive_core::ValidationError),

    #[error(transparent)]
    Config(#[from] futarchive_core::ConfigError),

    #[error(transparent)]
    Provider(#[from] futarchive_core::ProviderError),

    #[error(transparent)]
    Archive(#[from] futarchive_core::ArchiveError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<futarchive_core::CoreError> for CliError {
    fn from(error: futarchive_core::CoreError) -> Self {
        match error {
            futarchive_core::CoreError::Validation(error) => Self::Validation(error),
            futarchive_core::CoreError::Config(error) => Self::Config(error),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) | Self::Command(_) => 2,
            Self::Provider(error) if error.is_quota_exceeded() => 5,
            Self::Provider(_) => 2,
            Self::Archive(error) if error.is_fatal_to_run() => 5,
            Self::Archive(_) => 10,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
