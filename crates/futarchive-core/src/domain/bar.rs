use time::OffsetDateTime;

use crate::domain::timestamp::format_archive;
use crate::ValidationError;

/// One OHLCV bar with a UTC timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub ts: OffsetDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub const fn new(
        ts: OffsetDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Price series whose timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Wrap bars that are already in order; duplicates and reversals are rejected.
    pub fn new(bars: Vec<Bar>) -> Result<Self, ValidationError> {
        check_strictly_increasing(&bars)?;
        Ok(Self { bars })
    }

    /// Sort bars by timestamp, then reject duplicates.
    pub fn from_unsorted(mut bars: Vec<Bar>) -> Result<Self, ValidationError> {
        bars.sort_by_key(|bar| bar.ts);
        Self::new(bars)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<OffsetDateTime> {
        self.bars.first().map(|bar| bar.ts)
    }

    pub fn last_timestamp(&self) -> Option<OffsetDateTime> {
        self.bars.last().map(|bar| bar.ts)
    }

    /// Bars with `start <= ts <= end`.
    pub fn between(&self, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            bars: self
                .bars
                .iter()
                .filter(|bar| bar.ts >= start && bar.ts <= end)
                .cloned()
                .collect(),
        }
    }

    /// Append a later series. Leaves `self` untouched when the result would
    /// break ordering or repeat a timestamp.
    pub fn append(&mut self, other: PriceSeries) -> Result<(), ValidationError> {
        if let (Some(last), Some(first)) = (self.last_timestamp(), other.first_timestamp()) {
            if first == last {
                return Err(ValidationError::DuplicateTimestamp {
                    value: format_archive(first),
                });
            }
            if first < last {
                return Err(ValidationError::UnorderedSeries {
                    index: self.bars.len(),
                });
            }
        }
        self.bars.extend(other.bars);
        Ok(())
    }
}

fn check_strictly_increasing(bars: &[Bar]) -> Result<(), ValidationError> {
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].ts == pair[0].ts {
            return Err(ValidationError::DuplicateTimestamp {
                value: format_archive(pair[1].ts),
            });
        }
        if pair[1].ts < pair[0].ts {
            return Err(ValidationError::UnorderedSeries { index: index + 1 });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn bar(ts: OffsetDateTime) -> Bar {
        Bar::new(ts, 1.0, 2.0, 0.5, 1.5, 10)
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let ts = datetime!(2024-01-02 00:00 UTC);
        let err = PriceSeries::new(vec![bar(ts), bar(ts)]).expect_err("must fail");
        assert!(matches!(err, ValidationError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn sorts_unsorted_input() {
        let series = PriceSeries::from_unsorted(vec![
            bar(datetime!(2024-01-03 00:00 UTC)),
            bar(datetime!(2024-01-02 00:00 UTC)),
        ])
        .expect("valid");
        assert_eq!(series.first_timestamp(), Some(datetime!(2024-01-02 00:00 UTC)));
    }

    #[test]
    fn append_refuses_overlap_and_keeps_original() {
        let mut series = PriceSeries::new(vec![
            bar(datetime!(2024-01-02 00:00 UTC)),
            bar(datetime!(2024-01-03 00:00 UTC)),
        ])
        .expect("valid");
        let overlap = PriceSeries::new(vec![bar(datetime!(2024-01-03 00:00 UTC))]).expect("valid");

        assert!(series.append(overlap).is_err());
        assert_eq!(series.len(), 2);

        let later = PriceSeries::new(vec![bar(datetime!(2024-01-04 00:00 UTC))]).expect("valid");
        series.append(later).expect("append later bars");
        assert_eq!(series.len(), 3);
    }
}
