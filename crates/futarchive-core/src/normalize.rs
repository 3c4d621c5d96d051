//! Provider payload normalization.
//!
//! The provider returns two table shapes: the historical-download CSV (with a
//! header row and a trailing footer line) and the headerless timeseries
//! payload used for recent prices. Both carry exchange-local (US/Central)
//! times and are normalized into a UTC [`PriceSeries`] with the canonical
//! `Open, High, Low, Close, Volume` fields.

use chrono::TimeZone;
use chrono_tz::US::Central;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, Time};

use crate::domain::{Bar, PriceSeries, Resolution};
use crate::ValidationError;

/// Text the provider puts in a body instead of data when a download fails.
pub const ERROR_SENTINEL: &str = "Error retrieving data";

const DOWNLOAD_DAY: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DOWNLOAD_HOUR: &[BorrowedFormatItem<'static>] =
    format_description!("[month]/[day]/[year] [hour]:[minute]");
const SERIES_DAY: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const SERIES_HOUR: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("provider reported an error retrieving data")]
    ProviderSentinel,

    #[error("payload has no '{column}' column")]
    MissingColumn { column: String },

    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("local time {value} does not exist in US/Central")]
    NonexistentLocalTime { value: String },

    #[error("malformed csv payload: {message}")]
    Csv { message: String },

    #[error(transparent)]
    Series(#[from] ValidationError),
}

/// Column layout of a raw provider table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLayout {
    /// Historical-download CSV with named columns.
    Download { header: Vec<String> },
    /// Headerless timeseries rows addressed by position.
    Timeseries,
}

/// Unparsed provider rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    layout: RawLayout,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(layout: RawLayout, rows: Vec<Vec<String>>) -> Self {
        Self { layout, rows }
    }

    /// Parse a historical-download body, dropping its footer line.
    pub fn from_download_csv(body: &str) -> Result<Self, NormalizeError> {
        if body.contains(ERROR_SENTINEL) {
            return Err(NormalizeError::ProviderSentinel);
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());
        let header = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_owned)
            .collect();
        let mut rows = read_rows(reader)?;
        rows.pop();

        Ok(Self::new(RawLayout::Download { header }, rows))
    }

    /// Parse a headerless timeseries body.
    pub fn from_timeseries_csv(body: &str) -> Result<Self, NormalizeError> {
        if body.contains(ERROR_SENTINEL) {
            return Err(NormalizeError::ProviderSentinel);
        }

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());
        Ok(Self::new(RawLayout::Timeseries, read_rows(reader)?))
    }

    pub fn layout(&self) -> &RawLayout {
        &self.layout
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn read_rows(mut reader: csv::Reader<&[u8]>) -> Result<Vec<Vec<String>>, NormalizeError> {
    reader
        .records()
        .map(|record| {
            record
                .map(|record| record.iter().map(str::to_owned).collect())
                .map_err(csv_error)
        })
        .collect()
}

fn csv_error(error: csv::Error) -> NormalizeError {
    NormalizeError::Csv {
        message: error.to_string(),
    }
}

/// Positions of time, open, high, low, close, volume in a row.
struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    format: &'static [BorrowedFormatItem<'static>],
}

impl Columns {
    fn for_table(layout: &RawLayout, resolution: Resolution) -> Result<Self, NormalizeError> {
        match layout {
            RawLayout::Download { header } => {
                let find = |names: &[&str]| {
                    header
                        .iter()
                        .position(|column| names.iter().any(|name| column.eq_ignore_ascii_case(name)))
                        .ok_or_else(|| NormalizeError::MissingColumn {
                            column: names[0].to_owned(),
                        })
                };
                Ok(Self {
                    time: find(&["Time"])?,
                    open: find(&["Open"])?,
                    high: find(&["High"])?,
                    low: find(&["Low"])?,
                    close: find(&["Last", "Close"])?,
                    volume: find(&["Volume"])?,
                    format: match resolution {
                        Resolution::Day => DOWNLOAD_DAY,
                        Resolution::Hour => DOWNLOAD_HOUR,
                    },
                })
            }
            RawLayout::Timeseries => Ok(match resolution {
                Resolution::Day => Self {
                    time: 1,
                    open: 2,
                    high: 3,
                    low: 4,
                    close: 5,
                    volume: 7,
                    format: SERIES_DAY,
                },
                Resolution::Hour => Self {
                    time: 0,
                    open: 2,
                    high: 3,
                    low: 4,
                    close: 5,
                    volume: 6,
                    format: SERIES_HOUR,
                },
            }),
        }
    }
}

/// Convert a raw table into a UTC series sorted by time.
///
/// Duplicate timestamps after conversion are an error, not merged.
pub fn normalize(table: &RawTable, resolution: Resolution) -> Result<PriceSeries, NormalizeError> {
    let columns = Columns::for_table(&table.layout, resolution)?;
    let bars = table
        .rows
        .iter()
        .enumerate()
        .map(|(row, cells)| parse_bar(row + 1, cells, &columns))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PriceSeries::from_unsorted(bars)?)
}

fn parse_bar(row: usize, cells: &[String], columns: &Columns) -> Result<Bar, NormalizeError> {
    let cell = |index: usize| {
        cells
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| NormalizeError::InvalidRow {
                row,
                message: format!("missing column {index}"),
            })
    };
    let price = |index: usize| {
        let value = cell(index)?;
        value.parse::<f64>().map_err(|_| NormalizeError::InvalidRow {
            row,
            message: format!("'{value}' is not a price"),
        })
    };

    let raw_time = cell(columns.time)?;
    let local = parse_local(raw_time, columns.format).ok_or_else(|| NormalizeError::InvalidRow {
        row,
        message: format!("'{raw_time}' is not a valid time"),
    })?;

    Ok(Bar::new(
        central_to_utc(local)?,
        price(columns.open)?,
        price(columns.high)?,
        price(columns.low)?,
        price(columns.close)?,
        parse_volume(row, cell(columns.volume)?)?,
    ))
}

fn parse_local(value: &str, format: &[BorrowedFormatItem<'_>]) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(value, format).ok().or_else(|| {
        time::Date::parse(value, format)
            .ok()
            .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
    })
}

fn parse_volume(row: usize, value: &str) -> Result<u64, NormalizeError> {
    if value.is_empty() {
        return Ok(0);
    }
    if let Ok(volume) = value.parse::<u64>() {
        return Ok(volume);
    }
    match value.parse::<f64>() {
        Ok(volume) if volume.is_finite() && volume >= 0.0 => Ok(volume.round() as u64),
        _ => Err(NormalizeError::InvalidRow {
            row,
            message: format!("'{value}' is not a volume"),
        }),
    }
}

/// Interpret a wall-clock time as US/Central and convert it to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant.
pub fn central_to_utc(local: PrimitiveDateTime) -> Result<OffsetDateTime, NormalizeError> {
    let nonexistent = || NormalizeError::NonexistentLocalTime {
        value: local.to_string(),
    };
    let naive = chrono::NaiveDate::from_ymd_opt(
        local.year(),
        u32::from(u8::from(local.month())),
        u32::from(local.day()),
    )
    .and_then(|date| {
        date.and_hms_opt(
            u32::from(local.hour()),
            u32::from(local.minute()),
            u32::from(local.second()),
        )
    })
    .ok_or_else(nonexistent)?;

    let zoned = Central
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(nonexistent)?;

    OffsetDateTime::from_unix_timestamp(zoned.timestamp()).map_err(|_| nonexistent())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn download_csv_drops_footer_and_renames_last() {
        let body = "Time,Open,High,Low,Last,Change,%Chg,Volume\n\
            2020-03-03,0.66,0.67,0.65,0.665,0.01,1.5%,1200\n\
            2020-03-02,0.65,0.66,0.64,0.655,0.01,1.5%,1100\n\
            \"Downloaded from Barchart.com as of 03-04-2020 09:00am CST\"\n";

        let table = RawTable::from_download_csv(body).expect("table");
        assert_eq!(table.len(), 2);

        let series = normalize(&table, Resolution::Day).expect("series");
        let bars = series.bars();
        assert_eq!(bars[0].ts, datetime!(2020-03-02 06:00 UTC));
        assert_eq!(bars[0].close, 0.655);
        assert_eq!(bars[1].volume, 1200);
    }

    #[test]
    fn hourly_download_uses_us_style_dates_and_dst() {
        let body = "Time,Open,High,Low,Last,Volume\n\
            07/01/2020 09:00,1,2,0.5,1.5,10\n\
            footer\n";
        let table = RawTable::from_download_csv(body).expect("table");
        let series = normalize(&table, Resolution::Hour).expect("series");
        assert_eq!(series.bars()[0].ts, datetime!(2020-07-01 14:00 UTC));
    }

    #[test]
    fn sentinel_body_is_a_failed_fetch() {
        let err = RawTable::from_download_csv("Error retrieving data").expect_err("sentinel");
        assert_eq!(err, NormalizeError::ProviderSentinel);
    }

    #[test]
    fn timeseries_rows_are_positional() {
        let body = "A6H20,2020-03-02,0.65,0.66,0.64,0.655,1100,900\n\
            A6H20,2020-03-03,0.66,0.67,0.65,0.665,1200,950\n";
        let table = RawTable::from_timeseries_csv(body).expect("table");
        let series = normalize(&table, Resolution::Day).expect("series");
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[0].volume, 900);

        let hourly = "2020-03-02 09:00,1,0.65,0.66,0.64,0.655,120\n";
        let table = RawTable::from_timeseries_csv(hourly).expect("table");
        let series = normalize(&table, Resolution::Hour).expect("series");
        assert_eq!(series.bars()[0].ts, datetime!(2020-03-02 15:00 UTC));
        assert_eq!(series.bars()[0].volume, 120);
    }

    #[test]
    fn duplicate_rows_fail_normalization() {
        let body = "2020-03-02 09:00,1,0.65,0.66,0.64,0.655,120\n\
            2020-03-02 09:00,1,0.65,0.66,0.64,0.655,120\n";
        let table = RawTable::from_timeseries_csv(body).expect("table");
        assert!(matches!(
            normalize(&table, Resolution::Hour),
            Err(NormalizeError::Series(ValidationError::DuplicateTimestamp { .. }))
        ));
    }

    #[test]
    fn spring_forward_gap_is_rejected_and_fall_back_takes_earlier() {
        let gap = datetime!(2020-03-08 02:30);
        assert!(matches!(
            central_to_utc(gap),
            Err(NormalizeError::NonexistentLocalTime { .. })
        ));

        let ambiguous = datetime!(2020-11-01 01:30);
        assert_eq!(
            central_to_utc(ambiguous).expect("ambiguous"),
            datetime!(2020-11-01 06:30 UTC)
        );
    }
}
