//! # Futarchive Core
//!
//! Contract enumeration and archive reconciliation for a local archive of
//! futures price history.
//!
//! ## Overview
//!
//! - **Contract universe** built from per-instrument roll cycles and a year range
//! - **Codec** between contract ids (`A6H20`) and archive file names (`Hour_AUD_20200300.csv`)
//! - **Availability policy** that skips resolutions an exchange never published
//! - **Reconciliation engine** that downloads missing files and appends to existing ones
//! - **Barchart driver** behind the [`DownloadDriver`] trait
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`archive`] | CSV archive store with atomic writes |
//! | [`availability`] | Exchange cutover checks |
//! | [`barchart`] | Web session driver for barchart.com |
//! | [`codec`] | Contract id and file name encoding |
//! | [`config`] | YAML configuration and environment |
//! | [`domain`] | Month codes, resolutions, contract ids, price series |
//! | [`driver`] | Download driver trait and provider errors |
//! | [`engine`] | Download and update runs |
//! | [`error`] | Error taxonomy |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`migrate`] | Legacy file name migration |
//! | [`normalize`] | Provider payload to UTC price series |
//! | [`pacing`] | Inter-download delay and rate-limit cooldown |
//! | [`registry`] | Instrument and exchange tables |
//! | [`universe`] | Contract work-list builder |
//! | [`window`] | Download date window |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use futarchive_core::{
//!     build_contract_list, AppConfig, ArchiveStore, BarchartDriver, Reconciler, ReqwestHttpClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     let registry = Arc::new(config.registry()?);
//!     let contracts = build_contract_list(&registry, 2023, 2025, None)?;
//!
//!     let http = Arc::new(ReqwestHttpClient::default());
//!     let driver = Arc::new(BarchartDriver::open_session(&config.credentials(), true, http).await?);
//!     let engine = Reconciler::new(
//!         driver,
//!         registry,
//!         ArchiveStore::new(config.archive_dir()),
//!         config.engine_options(),
//!     );
//!
//!     let report = engine.run_downloads(&contracts).await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Universe        │────▶│ Reconciler       │
//! │ (work-list)     │     │ (per unit)       │
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!            ┌─────────────────────┼─────────────────────┐
//!            ▼                     ▼                     ▼
//! ┌─────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ Availability    │   │ DownloadDriver   │   │ ArchiveStore     │
//! │ (registry)      │   │ (barchart/http)  │   │ (CSV files)      │
//! └─────────────────┘   └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Only quota exhaustion stops a run. Every other failure is scoped to one
//! (contract, resolution) unit:
//!
//! ```rust
//! use futarchive_core::{ArchiveError, ProviderError};
//!
//! let error = ArchiveError::from(ProviderError::quota_exceeded("max daily downloads"));
//! assert!(error.is_fatal_to_run());
//! ```

pub mod archive;
pub mod availability;
pub mod barchart;
pub mod codec;
pub mod config;
pub mod domain;
pub mod driver;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod migrate;
pub mod normalize;
pub mod pacing;
pub mod registry;
pub mod universe;
pub mod window;

pub use archive::{read_series, write_series, ArchiveStore, ARCHIVE_HEADER};

pub use availability::is_before_available_resolution;

pub use barchart::{BarchartDriver, BARCHART_URL};

pub use codec::{
    decode_contract_id, decode_instrument_and_date_from_filename, decode_resolution_from_path,
    encode_contract_id, encode_save_path, filename_from_contract_id, ArchiveFileKey,
};

pub use config::{resolve_archive_dir, AppConfig, DEFAULT_CONFIG_FILE};

pub use domain::{
    expand_year, parse_cycle, Bar, ContractId, MonthCode, PriceSeries, Resolution, MONTH_LETTERS,
    YEAR_PIVOT,
};

pub use driver::{Credentials, DownloadDriver, DriverFuture, ProviderError, ProviderErrorKind};

pub use engine::{
    parse_contract_list, DownloadOutcome, EngineOptions, MergeSummary, Reconciler, RunReport,
    UnitFailure, UnitRecord, UnitState, UpdateReport, MIN_USEFUL_ROWS, RECENT_UPDATE_DAYS,
};

pub use error::{ArchiveError, ConfigError, CoreError, ValidationError};

pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};

pub use migrate::{
    classify_cadence, median_delta, migrate_legacy, Cadence, MigrationAction, MigrationProblem,
    MigrationReport, CADENCE_SAMPLE, SHORT_FILE_ROWS,
};

pub use normalize::{central_to_utc, normalize, NormalizeError, RawLayout, RawTable, ERROR_SENTINEL};

pub use pacing::{Pacing, RateLimitPolicy};

pub use registry::{
    builtin_exchanges, builtin_instruments, ExchangeConfig, InstrumentConfig, InstrumentTable,
    Registry, EXCLUDED_CODE,
};

pub use universe::{batch_size, build_contract_list};

pub use window::{DateWindow, DEFAULT_DAYS_COUNT};
