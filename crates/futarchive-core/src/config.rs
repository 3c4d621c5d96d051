//! Run configuration: a YAML file layered over built-in defaults and the
//! environment.
//!
//! ```yaml
//! archive_dir: /data/futures
//! start_year: 2020
//! end_year: 2024
//! download_list: [AUD, GOLD]
//! daily: false
//! instruments:
//!   AUD: { code: A6, cycle: HMUZ, exchange: CME }
//!   GOLD: { code: GC, cycle: GJMQVZ, exchange: COMEX, days_count: 90 }
//! ```
//!
//! Credentials come from `FUTARCHIVE_USERNAME` / `FUTARCHIVE_PASSWORD`
//! unless the file sets `username` / `password`.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::driver::Credentials;
use crate::engine::EngineOptions;
use crate::pacing::Pacing;
use crate::registry::{builtin_exchanges, builtin_instruments, ExchangeConfig, InstrumentTable, Registry};
use crate::window::DEFAULT_DAYS_COUNT;
use crate::ConfigError;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "futarchive.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub archive_dir: Option<PathBuf>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub download_list: Option<Vec<String>>,
    pub update_list: Option<Vec<String>>,
    /// Explicit contract ids; replaces the universe builder when set.
    pub contract_list: Option<Vec<String>>,
    pub dry_run: bool,
    /// False restricts runs to hourly data.
    pub daily: bool,
    pub pause_between_downloads: bool,
    pub days_count: u32,
    pub instruments: Option<InstrumentTable>,
    pub exchanges: Option<BTreeMap<String, ExchangeConfig>>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            archive_dir: None,
            start_year: None,
            end_year: None,
            download_list: None,
            update_list: None,
            contract_list: None,
            dry_run: false,
            daily: true,
            pause_between_downloads: true,
            days_count: DEFAULT_DAYS_COUNT,
            instruments: None,
            exchanges: None,
            username: None,
            password: None,
        }
    }
}

impl AppConfig {
    /// Load `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        Self::from_yaml(&text, path)
    }

    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Instrument and exchange tables, falling back to the built-in ones.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        let instruments = match &self.instruments {
            Some(table) => table.clone().into_inner(),
            None => builtin_instruments(),
        };
        let exchanges = match &self.exchanges {
            Some(exchanges) => exchanges.clone(),
            None => builtin_exchanges()?,
        };
        Registry::new(instruments, exchanges)
    }

    pub fn archive_dir(&self) -> PathBuf {
        resolve_archive_dir(
            self.archive_dir.as_deref(),
            env::var_os("FUTARCHIVE_HOME"),
            env::var_os("HOME"),
        )
    }

    /// `[start, end)` years, defaulting to the current year and the next.
    pub fn year_range(&self, current_year: i32) -> (i32, i32) {
        let start = self.start_year.unwrap_or(current_year);
        let end = self.end_year.unwrap_or(current_year + 1);
        (start, end)
    }

    pub fn credentials(&self) -> Credentials {
        let username = self
            .username
            .clone()
            .or_else(|| env::var("FUTARCHIVE_USERNAME").ok())
            .unwrap_or_default();
        let password = self
            .password
            .clone()
            .or_else(|| env::var("FUTARCHIVE_PASSWORD").ok())
            .unwrap_or_default();
        Credentials::new(username, password)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            dry_run: self.dry_run,
            daily: self.daily,
            pacing: Pacing::new(self.pause_between_downloads && !self.dry_run),
            default_days_count: self.days_count,
        }
    }
}

/// Explicit directory, else `$FUTARCHIVE_HOME/archive`, else
/// `$HOME/.futarchive/archive`, else `.futarchive/archive`.
pub fn resolve_archive_dir(
    explicit: Option<&Path>,
    futarchive_home: Option<OsString>,
    home: Option<OsString>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(path) = futarchive_home {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path.join("archive");
        }
    }

    if let Some(home) = home {
        return PathBuf::from(home).join(".futarchive").join("archive");
    }

    PathBuf::from(".futarchive").join("archive")
}
