//! Contract identifier and archive filename codec.
//!
//! Archive files are named `{Resolution}_{InstrumentCode}_{YYYY}{MM}00.csv`.
//! Instrument codes may contain underscores (`CRUDE_W`), so parsing takes the
//! resolution from the first underscore group and the date code from the last.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use time::Date;

use crate::domain::{ContractId, MonthCode, Resolution};
use crate::registry::Registry;
use crate::{CoreError, ValidationError};

const ARCHIVE_EXTENSION: &str = ".csv";
const DATE_CODE_LEN: usize = 8;

/// Identity of one archive file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveFileKey {
    pub resolution: Resolution,
    pub instrument: String,
    pub year: i32,
    pub month: MonthCode,
}

impl ArchiveFileKey {
    pub fn new(resolution: Resolution, instrument: impl Into<String>, year: i32, month: MonthCode) -> Self {
        Self {
            resolution,
            instrument: instrument.into(),
            year,
            month,
        }
    }

    pub fn filename(&self) -> String {
        format!(
            "{}_{}_{:04}{:02}00{ARCHIVE_EXTENSION}",
            self.resolution,
            self.instrument,
            self.year,
            self.month.number()
        )
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.filename())
    }

    /// Parse a file name (or path) back into its key.
    pub fn parse(filename: &str) -> Result<Self, ValidationError> {
        let name = file_name(filename);
        let resolution = resolution_token(name)?;
        let (instrument, contract_date) = decode_instrument_and_date_from_filename(name, true)?;
        let month = MonthCode::from_number(u8::from(contract_date.month()))?;

        Ok(Self {
            resolution,
            instrument,
            year: contract_date.year(),
            month,
        })
    }

    /// First day of the contract month.
    pub fn contract_date(&self) -> Result<Date, ValidationError> {
        Date::from_calendar_date(self.year, self.month.to_time_month(), 1)
            .map_err(|_| ValidationError::InvalidYear { value: self.year })
    }
}

impl Display for ArchiveFileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.filename())
    }
}

/// Month and absolute year of a contract identifier.
///
/// The month is `None` when the letter is not a futures month letter; callers
/// must check it.
pub fn decode_contract_id(id: &str) -> Result<(Option<MonthCode>, i32), ValidationError> {
    let contract = ContractId::parse(id)?;
    Ok((contract.month(), contract.year()))
}

pub fn encode_save_path(
    instrument: &str,
    month: MonthCode,
    year: i32,
    resolution: Resolution,
    dir: &Path,
) -> PathBuf {
    ArchiveFileKey::new(resolution, instrument, year, month).path_in(dir)
}

/// Resolution token before the first underscore of the file name.
pub fn decode_resolution_from_path(path: &Path) -> Result<Resolution, ValidationError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ValidationError::MalformedFilename {
            value: path.display().to_string(),
        })?;
    resolution_token(name)
}

/// Contract identifier for an instrument's contract month.
pub fn encode_contract_id(
    registry: &Registry,
    instrument: &str,
    year: i32,
    month: MonthCode,
) -> Result<ContractId, CoreError> {
    let config = registry.instrument(instrument)?;
    Ok(ContractId::new(config.code.as_str(), month, year)?)
}

/// Instrument code and contract month (first of the month) from a file name.
///
/// With `split_freq` the name carries a resolution prefix, and the instrument
/// code sits between the first and last underscore. Without it (legacy
/// names) the code is everything before the last underscore.
pub fn decode_instrument_and_date_from_filename(
    filename: &str,
    split_freq: bool,
) -> Result<(String, Date), ValidationError> {
    let name = file_name(filename);
    let malformed = || ValidationError::MalformedFilename {
        value: filename.to_owned(),
    };

    let stem = name.strip_suffix(ARCHIVE_EXTENSION).ok_or_else(malformed)?;
    let (head, date_code) = stem.rsplit_once('_').ok_or_else(malformed)?;
    let instrument = if split_freq {
        head.split_once('_').map(|(_, code)| code).ok_or_else(malformed)?
    } else {
        head
    };

    if instrument.is_empty()
        || date_code.len() != DATE_CODE_LEN
        || !date_code.bytes().all(|byte| byte.is_ascii_digit())
    {
        return Err(malformed());
    }

    let year: i32 = date_code[..4].parse().map_err(|_| malformed())?;
    let month: u8 = date_code[4..6].parse().map_err(|_| malformed())?;
    let month = MonthCode::from_number(month)?;
    let date = Date::from_calendar_date(year, month.to_time_month(), 1).map_err(|_| malformed())?;

    Ok((instrument.to_owned(), date))
}

/// Archive file name for a contract identifier, resolving its root symbol.
pub fn filename_from_contract_id(
    contract: &ContractId,
    registry: &Registry,
    resolution: Resolution,
) -> Result<String, CoreError> {
    let instrument = registry.instrument_for_root(contract.root())?;
    let (month, year) = contract.month_year()?;
    Ok(ArchiveFileKey::new(resolution, instrument, year, month).filename())
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn resolution_token(name: &str) -> Result<Resolution, ValidationError> {
    let token = name.split('_').next().unwrap_or(name);
    Resolution::from_str(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn month(number: u8) -> MonthCode {
        MonthCode::from_number(number).expect("valid month")
    }

    #[test]
    fn encodes_save_path_with_padded_month() {
        let path = encode_save_path("AUD", month(3), 2020, Resolution::Hour, Path::new("/d"));
        assert_eq!(path, PathBuf::from("/d/Hour_AUD_20200300.csv"));
    }

    #[test]
    fn resolution_comes_from_the_first_token() {
        let path = encode_save_path("CRUDE_W", month(12), 2019, Resolution::Day, Path::new("/d"));
        assert_eq!(decode_resolution_from_path(&path).expect("day"), Resolution::Day);
    }

    #[test]
    fn legacy_names_have_no_resolution() {
        let err = decode_resolution_from_path(Path::new("/d/AUD_20240300.csv")).expect_err("legacy");
        assert!(matches!(err, ValidationError::UnknownResolution { .. }));
    }

    #[test]
    fn file_key_round_trips_codes_with_underscores() {
        let key = ArchiveFileKey::new(Resolution::Hour, "GAS_US", 2021, month(1));
        let parsed = ArchiveFileKey::parse(&key.filename()).expect("round trip");
        assert_eq!(parsed, key);
    }

    #[test]
    fn decodes_instrument_with_and_without_resolution_prefix() {
        let (code, date) =
            decode_instrument_and_date_from_filename("Day_CRUDE_W_20230600.csv", true).expect("split");
        assert_eq!(code, "CRUDE_W");
        assert_eq!(date, date!(2023 - 06 - 01));

        let (code, _) =
            decode_instrument_and_date_from_filename("CRUDE_W_20230600.csv", false).expect("legacy");
        assert_eq!(code, "CRUDE_W");
    }

    #[test]
    fn rejects_short_date_codes() {
        assert!(decode_instrument_and_date_from_filename("Day_AUD_202306.csv", true).is_err());
        assert!(decode_instrument_and_date_from_filename("Day_AUD_20231300.csv", true).is_err());
    }

    #[test]
    fn contract_id_round_trips_through_registry() {
        let registry = Registry::builtin().expect("builtin");
        let id = encode_contract_id(&registry, "GOLD", 1999, month(8)).expect("encode");
        assert_eq!(id.to_string(), "GCQ99");

        let (decoded_month, decoded_year) = decode_contract_id(&id.to_string()).expect("decode");
        assert_eq!(decoded_month, Some(month(8)));
        assert_eq!(decoded_year, 1999);
    }

    #[test]
    fn filename_from_contract_id_uses_inverse_map() {
        let registry = Registry::builtin().expect("builtin");
        let id = ContractId::parse("A6H20").expect("id");
        let name = filename_from_contract_id(&id, &registry, Resolution::Hour).expect("name");
        assert_eq!(name, "Hour_AUD_20200300.csv");

        let unknown = ContractId::parse("QQH20").expect("id");
        assert!(matches!(
            filename_from_contract_id(&unknown, &registry, Resolution::Day),
            Err(CoreError::Config(_))
        ));
    }
}
