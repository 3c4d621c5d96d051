//! # Archive Reconciliation Engine
//!
//! Decides, for every (contract, resolution) unit, whether to skip, fetch or
//! merge, and drives the [`DownloadDriver`] accordingly.
//!
//! ## Download path
//!
//! | Step | Check | Terminal state |
//! |------|-------|----------------|
//! | 1 | archive file already on disk | [`UnitState::Exists`] |
//! | 2 | window start before the exchange cutover | [`UnitState::Unavailable`] |
//! | 3 | dry run | [`UnitState::Planned`] |
//! | 4 | recent-series probe below [`MIN_USEFUL_ROWS`] (or failing) | [`UnitState::Insufficient`] |
//! | 5 | provider has nothing / quota spent / data written | [`UnitState::NotFound`] / [`UnitState::Exceeded`] / [`UnitState::Fetched`] |
//!
//! Units run strictly one after another. Quota exhaustion aborts the run;
//! every other failure is logged and the run moves on to the next unit.
//!
//! ## Update path
//!
//! [`Reconciler::update_contract_file`] appends recent bars to an existing
//! file after checking its index. The file is rewritten only when the merged
//! series is valid.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::ArchiveStore;
use crate::availability::is_before_available_resolution;
use crate::codec::{encode_contract_id, filename_from_contract_id, ArchiveFileKey};
use crate::domain::timestamp::format_archive;
use crate::domain::{ContractId, Resolution};
use crate::driver::{DownloadDriver, ProviderErrorKind};
use crate::normalize::normalize;
use crate::pacing::Pacing;
use crate::registry::Registry;
use crate::window::{DateWindow, DEFAULT_DAYS_COUNT};
use crate::{ArchiveError, ValidationError};

/// Fewest probe rows worth a full download.
pub const MIN_USEFUL_ROWS: usize = 30;

/// Files whose last bar is younger than this many whole days are not updated.
pub const RECENT_UPDATE_DAYS: i64 = 4;

/// Result of one download attempt as seen by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadOutcome {
    /// Provider has nothing for this identifier.
    None,
    /// Fetched and written.
    Ok,
    /// Local file already present.
    Exists,
    /// Provider quota exhausted; the run must stop.
    Exceed,
    /// Provider has too little data to be useful.
    Insufficient,
}

/// Terminal state of one (contract, resolution) unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Exists,
    Unavailable,
    Planned,
    Insufficient,
    NotFound,
    Exceeded,
    Fetched,
    Failed,
}

impl From<UnitState> for DownloadOutcome {
    fn from(state: UnitState) -> Self {
        match state {
            UnitState::Exists => Self::Exists,
            UnitState::Insufficient => Self::Insufficient,
            UnitState::Exceeded => Self::Exceed,
            UnitState::Fetched | UnitState::Planned => Self::Ok,
            UnitState::Unavailable | UnitState::NotFound | UnitState::Failed => Self::None,
        }
    }
}

/// Run-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Plan units without network calls or file writes.
    pub dry_run: bool,
    /// Visit daily as well as hourly resolution.
    pub daily: bool,
    pub pacing: Pacing,
    /// Lookback for instruments without their own `days_count`.
    pub default_days_count: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            daily: true,
            pacing: Pacing::default(),
            default_days_count: DEFAULT_DAYS_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub contract: String,
    pub resolution: Resolution,
    pub state: UnitState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    /// Contract id, or the instrument code or file name when no contract could be formed.
    pub contract: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub message: String,
}

/// Summary of a download run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub units: Vec<UnitRecord>,
    pub counts: BTreeMap<UnitState, usize>,
    pub failures: Vec<UnitFailure>,
    /// True when quota exhaustion stopped the run early.
    pub aborted: bool,
}

impl RunReport {
    fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            units: Vec::new(),
            counts: BTreeMap::new(),
            failures: Vec::new(),
            aborted: false,
        }
    }

    fn record(&mut self, contract: &ContractId, resolution: Resolution, state: UnitState) {
        *self.counts.entry(state).or_default() += 1;
        self.units.push(UnitRecord {
            contract: contract.to_string(),
            resolution,
            state,
        });
    }

    pub fn count(&self, state: UnitState) -> usize {
        self.counts.get(&state).copied().unwrap_or_default()
    }
}

/// Result of merging new bars into one archive file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub added: usize,
    pub last: String,
}

/// Summary of a batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    /// Files that gained rows.
    pub updated: Vec<String>,
    /// Files a dry run would update.
    pub planned: Vec<String>,
    pub recently_updated: Vec<String>,
    /// Files whose index needs manual inspection.
    pub integrity_problems: Vec<String>,
    /// Contracts for which the provider returned nothing new.
    pub empty_data: Vec<String>,
    pub failures: Vec<UnitFailure>,
    pub aborted: bool,
}

impl UpdateReport {
    fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            updated: Vec::new(),
            planned: Vec::new(),
            recently_updated: Vec::new(),
            integrity_problems: Vec::new(),
            empty_data: Vec::new(),
            failures: Vec::new(),
            aborted: false,
        }
    }
}

/// Reconciles the archive directory against the provider.
pub struct Reconciler {
    driver: Arc<dyn DownloadDriver>,
    registry: Arc<Registry>,
    store: ArchiveStore,
    options: EngineOptions,
    fixed_now: Option<OffsetDateTime>,
}

impl Reconciler {
    pub fn new(
        driver: Arc<dyn DownloadDriver>,
        registry: Arc<Registry>,
        store: ArchiveStore,
        options: EngineOptions,
    ) -> Self {
        Self {
            driver,
            registry,
            store,
            options,
            fixed_now: None,
        }
    }

    /// Pin "now" instead of reading the system clock.
    pub fn with_now(mut self, now: OffsetDateTime) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    fn now(&self) -> OffsetDateTime {
        self.fixed_now.unwrap_or_else(OffsetDateTime::now_utc)
    }

    /// Download one contract at one resolution, classified for callers.
    pub async fn save_prices_for_contract(
        &self,
        contract: &ContractId,
        resolution: Resolution,
    ) -> Result<DownloadOutcome, ArchiveError> {
        self.reconcile_unit(contract, resolution)
            .await
            .map(DownloadOutcome::from)
    }

    /// Run the download state machine for one unit.
    pub async fn reconcile_unit(
        &self,
        contract: &ContractId,
        resolution: Resolution,
    ) -> Result<UnitState, ArchiveError> {
        let instrument = self.registry.instrument_for_root(contract.root())?;
        let config = self.registry.instrument(instrument)?;
        let (month, year) = contract.month_year()?;

        let key = ArchiveFileKey::new(resolution, instrument, year, month);
        let path = self.store.path_for(&key);
        if path.exists() {
            info!(
                %contract,
                path = %path.display(),
                "{} data already downloaded, skipping",
                resolution.period()
            );
            return Ok(UnitState::Exists);
        }

        let days_count = config.days_count.unwrap_or(self.options.default_days_count);
        let window = DateWindow::for_contract(month, year, days_count, self.now().date())?;

        if is_before_available_resolution(resolution, window.start, instrument, &self.registry)? {
            info!(
                %contract,
                start = %window.start,
                "{} prices start before the exchange cutover, skipping",
                resolution.period()
            );
            return Ok(UnitState::Unavailable);
        }

        if self.options.dry_run {
            info!(%contract, %window, path = %path.display(), "dry run, not downloading");
            return Ok(UnitState::Planned);
        }

        if !self.has_sufficient_data(contract, resolution).await {
            info!(%contract, "insufficient {} data, skipping", resolution.period());
            return Ok(UnitState::Insufficient);
        }

        info!(%contract, %window, "getting historic {} prices", resolution.period());
        let table = match self
            .driver
            .fetch_contract_series(contract, resolution, window)
            .await
        {
            Ok(table) => table,
            Err(error) => match error.kind() {
                ProviderErrorKind::NotFound => {
                    info!(%contract, reason = error.message(), "no downloadable data");
                    return Ok(UnitState::NotFound);
                }
                ProviderErrorKind::QuotaExceeded => {
                    warn!(%contract, "max daily download reached");
                    return Ok(UnitState::Exceeded);
                }
                _ => return Err(error.into()),
            },
        };

        let series = normalize(&table, resolution)?;
        if series.is_empty() {
            info!(%contract, "provider returned no rows");
            return Ok(UnitState::NotFound);
        }

        self.store.write(&path, &series)?;
        info!(%contract, path = %path.display(), rows = series.len(), "wrote archive file");
        Ok(UnitState::Fetched)
    }

    async fn has_sufficient_data(&self, contract: &ContractId, resolution: Resolution) -> bool {
        match self.driver.fetch_recent_series(contract, resolution).await {
            Ok(table) => table.len() >= MIN_USEFUL_ROWS,
            Err(error) => {
                warn!(%contract, %error, "sufficiency probe failed");
                false
            }
        }
    }

    /// Process a work-list in order, stopping on quota exhaustion.
    pub async fn run_downloads(&self, contracts: &[ContractId]) -> RunReport {
        let mut report = RunReport::new(self.options.dry_run);
        let resolutions = Resolution::for_run(self.options.daily);

        'contracts: for contract in contracts {
            for &resolution in resolutions {
                match self.reconcile_unit(contract, resolution).await {
                    Ok(UnitState::Exceeded) => {
                        report.record(contract, resolution, UnitState::Exceeded);
                        report.aborted = true;
                        info!("max daily download reached, aborting run");
                        break 'contracts;
                    }
                    Ok(state) => {
                        report.record(contract, resolution, state);
                        if state == UnitState::Fetched {
                            self.options.pacing.pause().await;
                        }
                    }
                    Err(error) => {
                        error!(%contract, %resolution, %error, "unit failed");
                        report.record(contract, resolution, UnitState::Failed);
                        report.failures.push(UnitFailure {
                            contract: contract.to_string(),
                            resolution: Some(resolution),
                            message: error.to_string(),
                        });
                        if error.is_fatal_to_run() {
                            report.aborted = true;
                            break 'contracts;
                        }
                    }
                }
            }
        }

        info!(
            run_id = %report.run_id,
            units = report.units.len(),
            fetched = report.count(UnitState::Fetched),
            failures = report.failures.len(),
            aborted = report.aborted,
            "download run finished"
        );
        report
    }

    /// Append recent bars to the archive file of `contract`.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Integrity`] if the existing index is unparseable, unordered or duplicated
    /// - [`ArchiveError::RecentUpdate`] if the last bar is less than four days old
    /// - [`ArchiveError::EmptyData`] if the provider has nothing after the last bar
    ///
    /// The file is left untouched on every error.
    pub async fn update_contract_file(
        &self,
        contract: &ContractId,
        resolution: Resolution,
    ) -> Result<MergeSummary, ArchiveError> {
        let now = self.now();
        let name = filename_from_contract_id(contract, &self.registry, resolution)?;
        let path = self.store.dir().join(name);
        info!(path = %path.display(), "starting update");

        let mut existing = self.store.read(&path)?;
        let last = existing.last_timestamp().ok_or_else(|| ArchiveError::Integrity {
            path: path.clone(),
            reason: String::from("archive has no rows"),
        })?;

        if (now - last).whole_days() < RECENT_UPDATE_DAYS {
            return Err(ArchiveError::RecentUpdate {
                path,
                last: format_archive(last),
            });
        }
        info!(%contract, last = %format_archive(last), "last archived bar");

        let table = match self.driver.fetch_recent_series(contract, resolution).await {
            Ok(table) => table,
            Err(error) if error.kind() == ProviderErrorKind::NotFound => {
                return Err(ArchiveError::EmptyData {
                    contract: contract.to_string(),
                });
            }
            Err(error) => return Err(error.into()),
        };

        let start = last + resolution.restart_offset();
        let update = normalize(&table, resolution)?.between(start, now);
        if update.is_empty() {
            return Err(ArchiveError::EmptyData {
                contract: contract.to_string(),
            });
        }

        let added = update.len();
        info!(
            %contract,
            from = %format_archive(start),
            to = %format_archive(now),
            rows = added,
            "adding new rows"
        );
        existing
            .append(update)
            .map_err(|error| ArchiveError::Integrity {
                path: path.clone(),
                reason: error.to_string(),
            })?;
        self.store.write(&path, &existing)?;

        Ok(MergeSummary {
            path,
            added,
            last: existing.last_timestamp().map(format_archive).unwrap_or_default(),
        })
    }

    /// Update every archived contract of `instruments` whose month is after `from_date`.
    ///
    /// Unknown instruments and unmappable file names are reported as failures
    /// and skipped; only directory errors and quota exhaustion end the batch.
    pub async fn update_downloads(
        &self,
        instruments: Option<&[String]>,
        from_date: Date,
    ) -> Result<UpdateReport, ArchiveError> {
        let mut report = UpdateReport::new(self.options.dry_run);
        let codes = match instruments {
            Some(codes) => codes.to_vec(),
            None => self.registry.instrument_codes(),
        };

        for code in &codes {
            let instrument = match self.registry.instrument(code) {
                Ok(instrument) => instrument,
                Err(error) => {
                    error!(instrument = %code, %error, "cannot update instrument");
                    report.failures.push(UnitFailure {
                        contract: code.clone(),
                        resolution: None,
                        message: error.to_string(),
                    });
                    continue;
                }
            };
            if instrument.is_excluded() {
                continue;
            }
            info!(instrument = %code, "updating contract prices");

            for &resolution in Resolution::for_run(self.options.daily) {
                for file in self.store.contract_files(resolution, code)? {
                    let name = file_display(&file);
                    let contract = match self.contract_for_file(code, &name, from_date) {
                        Ok(Some(contract)) => contract,
                        Ok(None) => continue,
                        Err(error) => {
                            error!(file = %name, %error, "cannot map archive file to a contract");
                            report.failures.push(UnitFailure {
                                contract: name,
                                resolution: Some(resolution),
                                message: error.to_string(),
                            });
                            continue;
                        }
                    };

                    if self.options.dry_run {
                        info!(%contract, file = %name, "dry run, not updating");
                        report.planned.push(name);
                        continue;
                    }

                    match self.update_contract_file(&contract, resolution).await {
                        Ok(summary) => {
                            info!(file = %name, added = summary.added, "updated");
                            report.updated.push(name);
                            self.options.pacing.pause().await;
                        }
                        Err(ArchiveError::Integrity { reason, .. }) => {
                            error!(file = %name, %reason, "file index problem, needs manual check");
                            report.integrity_problems.push(name);
                        }
                        Err(ArchiveError::RecentUpdate { .. }) => {
                            warn!(%contract, "skipping, recently updated");
                            report.recently_updated.push(name);
                        }
                        Err(ArchiveError::EmptyData { .. }) => {
                            info!(%contract, "empty data");
                            report.empty_data.push(contract.to_string());
                            self.options.pacing.pause().await;
                        }
                        Err(error) => {
                            error!(%contract, %error, "update failed");
                            let fatal = error.is_fatal_to_run();
                            report.failures.push(UnitFailure {
                                contract: contract.to_string(),
                                resolution: Some(resolution),
                                message: error.to_string(),
                            });
                            if fatal {
                                report.aborted = true;
                                return Ok(report);
                            }
                        }
                    }
                }
            }
        }

        if !report.integrity_problems.is_empty() {
            warn!(files = ?report.integrity_problems, "files with integrity problems");
        }
        if !report.empty_data.is_empty() {
            warn!(contracts = ?report.empty_data, "retry these contracts with daily prices");
        }
        Ok(report)
    }

    /// Contract archived in `name`, or `None` when its month is not after `from_date`.
    fn contract_for_file(
        &self,
        code: &str,
        name: &str,
        from_date: Date,
    ) -> Result<Option<ContractId>, ArchiveError> {
        let key = ArchiveFileKey::parse(name)?;
        if key.contract_date()? <= from_date {
            return Ok(None);
        }
        Ok(Some(encode_contract_id(&self.registry, code, key.year, key.month)?))
    }
}

fn file_display(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse an explicit contract list, preserving its order.
pub fn parse_contract_list(ids: &[String]) -> Result<Vec<ContractId>, ValidationError> {
    ids.iter().map(|id| ContractId::parse(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_states_map_onto_download_outcomes() {
        assert_eq!(DownloadOutcome::from(UnitState::Exists), DownloadOutcome::Exists);
        assert_eq!(DownloadOutcome::from(UnitState::Fetched), DownloadOutcome::Ok);
        assert_eq!(DownloadOutcome::from(UnitState::Planned), DownloadOutcome::Ok);
        assert_eq!(DownloadOutcome::from(UnitState::Exceeded), DownloadOutcome::Exceed);
        assert_eq!(DownloadOutcome::from(UnitState::NotFound), DownloadOutcome::None);
        assert_eq!(
            DownloadOutcome::from(UnitState::Insufficient),
            DownloadOutcome::Insufficient
        );
    }

    #[test]
    fn outcomes_serialize_in_upper_case() {
        let json = serde_json::to_string(&DownloadOutcome::Insufficient).expect("serialize");
        assert_eq!(json, "\"INSUFFICIENT\"");
    }

    #[test]
    fn explicit_contract_list_keeps_order() {
        let ids = vec![String::from("XH18"), String::from("XM19"), String::from("XU20")];
        let contracts = parse_contract_list(&ids).expect("valid ids");
        assert_eq!(contracts[2].to_string(), "XU20");
        assert!(parse_contract_list(&[String::from("bad")]).is_err());
    }
}
