//! On-disk archive of per-contract CSV files.
//!
//! Files hold `Time,Open,High,Low,Close,Volume` rows with UTC timestamps in
//! `YYYY-MM-DDTHH:MM:SS+0000` form. Writes go to a temporary file in the same
//! directory and are renamed into place, so a failed write never leaves a
//! partial file behind.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tempfile::NamedTempFile;

use crate::codec::ArchiveFileKey;
use crate::domain::timestamp::{format_archive, parse_archive};
use crate::domain::{Bar, PriceSeries, Resolution};
use crate::ArchiveError;

pub const ARCHIVE_HEADER: [&str; 6] = ["Time", "Open", "High", "Low", "Close", "Volume"];

/// Archive directory handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &ArchiveFileKey) -> PathBuf {
        key.path_in(&self.dir)
    }

    /// Load a file, verifying the index parses and is strictly increasing.
    ///
    /// Any index problem is reported as [`ArchiveError::Integrity`].
    pub fn read(&self, path: &Path) -> Result<PriceSeries, ArchiveError> {
        read_series(path)
    }

    pub fn write(&self, path: &Path, series: &PriceSeries) -> Result<(), ArchiveError> {
        write_series(path, series)
    }

    /// Files named `{resolution}_{instrument}_{8 digits}.csv`, sorted by name.
    pub fn contract_files(&self, resolution: Resolution, instrument: &str) -> Result<Vec<PathBuf>, ArchiveError> {
        self.matching(&format!(
            "^{}_{}_[0-9]{{8}}\\.csv$",
            resolution,
            regex::escape(instrument)
        ))
    }

    /// Legacy files named `{instrument}_{8 digits}.csv`, sorted by name.
    pub fn legacy_files(&self, instrument: &str) -> Result<Vec<PathBuf>, ArchiveError> {
        self.matching(&format!("^{}_[0-9]{{8}}\\.csv$", regex::escape(instrument)))
    }

    fn matching(&self, pattern: &str) -> Result<Vec<PathBuf>, ArchiveError> {
        let regex = Regex::new(pattern).map_err(|error| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, error.to_string())
        })?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if regex.is_match(name) {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

pub fn read_series(path: &Path) -> Result<PriceSeries, ArchiveError> {
    let integrity = |reason: String| ArchiveError::Integrity {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let header = reader.headers()?.clone();
    let column = |name: &str| {
        header
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| integrity(format!("missing column '{name}'")))
    };
    let columns = [
        column("Time")?,
        column("Open")?,
        column("High")?,
        column("Low")?,
        column("Close")?,
        column("Volume")?,
    ];

    let mut bars = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let cell = |position: usize| record.get(columns[position]).unwrap_or_default();
        let number = |position: usize| {
            cell(position)
                .parse::<f64>()
                .map_err(|_| integrity(format!("row {row}: '{}' is not a number", cell(position))))
        };

        let ts = parse_archive(cell(0)).map_err(|error| integrity(format!("row {row}: {error}")))?;
        let volume = number(5)?;
        bars.push(Bar::new(
            ts,
            number(1)?,
            number(2)?,
            number(3)?,
            number(4)?,
            volume.max(0.0).round() as u64,
        ));
    }

    PriceSeries::new(bars).map_err(|error| integrity(error.to_string()))
}

pub fn write_series(path: &Path, series: &PriceSeries) -> Result<(), ArchiveError> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(&mut file);
        writer.write_record(ARCHIVE_HEADER)?;
        for bar in series.bars() {
            writer.write_record([
                format_archive(bar.ts),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])?;
        }
        writer.flush()?;
    }
    file.as_file_mut().sync_all()?;
    file.persist(path).map_err(|error| ArchiveError::Io(error.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use time::macros::datetime;

    fn series() -> PriceSeries {
        PriceSeries::new(vec![
            Bar::new(datetime!(2020-03-02 06:00 UTC), 0.65, 0.66, 0.64, 0.655, 1100),
            Bar::new(datetime!(2020-03-03 06:00 UTC), 0.66, 0.67, 0.65, 0.665, 1200),
        ])
        .expect("valid series")
    }

    #[test]
    fn writes_canonical_header_and_timestamps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Day_AUD_20200300.csv");

        write_series(&path, &series()).expect("write");

        let text = fs::read_to_string(&path).expect("read back");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Time,Open,High,Low,Close,Volume"));
        assert_eq!(lines.next(), Some("2020-03-02T06:00:00+0000,0.65,0.66,0.64,0.655,1100"));
        assert_eq!(read_series(&path).expect("parse"), series());
    }

    #[test]
    fn duplicate_index_is_an_integrity_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Day_AUD_20200300.csv");
        write_series(&path, &series()).expect("write");
        let mut file = fs::OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(b"2020-03-03T06:00:00+0000,1,1,1,1,1\n").expect("append");

        assert!(matches!(read_series(&path), Err(ArchiveError::Integrity { .. })));
    }

    #[test]
    fn unparseable_time_is_an_integrity_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Hour_AUD_20200300.csv");
        fs::write(&path, "Time,Open,High,Low,Close,Volume\nyesterday,1,1,1,1,1\n").expect("write");

        assert!(matches!(read_series(&path), Err(ArchiveError::Integrity { .. })));
    }

    #[test]
    fn lists_only_matching_contract_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "Hour_AUD_20200300.csv",
            "Hour_AUD_20200600.csv",
            "Day_AUD_20200300.csv",
            "AUD_20200300.csv",
            "Hour_AUDX_20200300.csv",
        ] {
            fs::write(dir.path().join(name), "").expect("touch");
        }
        let store = ArchiveStore::new(dir.path());

        let hourly = store.contract_files(Resolution::Hour, "AUD").expect("list");
        let names: Vec<_> = hourly
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(names, ["Hour_AUD_20200300.csv", "Hour_AUD_20200600.csv"]);

        let legacy = store.legacy_files("AUD").expect("list");
        assert_eq!(legacy.len(), 1);
    }
}
