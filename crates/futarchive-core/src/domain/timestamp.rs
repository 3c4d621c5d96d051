//! Archive timestamp format: `YYYY-MM-DDTHH:MM:SS±HHMM`, always written in UTC.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

const ARCHIVE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
);

/// Render a timestamp for the archive `Time` column, converted to UTC.
pub fn format_archive(ts: OffsetDateTime) -> String {
    ts.to_offset(UtcOffset::UTC)
        .format(ARCHIVE_FORMAT)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Parse an archive `Time` value, normalizing any offset to UTC.
pub fn parse_archive(input: &str) -> Result<OffsetDateTime, ValidationError> {
    OffsetDateTime::parse(input.trim(), ARCHIVE_FORMAT)
        .map(|ts| ts.to_offset(UtcOffset::UTC))
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_with_compact_offset() {
        let ts = datetime!(2020-03-02 06:00:00 UTC);
        assert_eq!(format_archive(ts), "2020-03-02T06:00:00+0000");
    }

    #[test]
    fn parses_and_converts_non_utc_offsets() {
        let parsed = parse_archive("2020-03-02T00:00:00-0600").expect("must parse");
        assert_eq!(parsed, datetime!(2020-03-02 06:00:00 UTC));
        assert_eq!(parsed.offset(), UtcOffset::UTC);
    }

    #[test]
    fn rejects_other_layouts() {
        assert!(parse_archive("2020-03-02 06:00:00").is_err());
        assert!(parse_archive("not a date").is_err());
    }
}
