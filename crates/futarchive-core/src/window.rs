use std::fmt::{Display, Formatter};

use time::{Date, Duration};

use crate::domain::MonthCode;
use crate::ValidationError;

/// Lookback used when neither the instrument nor the caller sets one.
pub const DEFAULT_DAYS_COUNT: u32 = 120;

/// Inclusive date range requested from the provider for one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Date,
    pub end: Date,
}

impl DateWindow {
    /// Window ending on the last day of the contract month (or `today`, if
    /// earlier) and starting `days_count` days before that.
    pub fn for_contract(
        month: MonthCode,
        year: i32,
        days_count: u32,
        today: Date,
    ) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidYear { value: year };
        let month = month.to_time_month();
        let last_day = time::util::days_in_year_month(year, month);
        let month_end = Date::from_calendar_date(year, month, last_day).map_err(|_| invalid())?;

        let end = month_end.min(today);
        let start = end
            .checked_sub(Duration::days(i64::from(days_count)))
            .ok_or_else(invalid)?;

        Ok(Self { start, end })
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn month(number: u8) -> MonthCode {
        MonthCode::from_number(number).expect("valid month")
    }

    #[test]
    fn past_contract_ends_on_last_day_of_month() {
        let window = DateWindow::for_contract(month(2), 2020, 120, date!(2024 - 06 - 01)).expect("window");
        assert_eq!(window.end, date!(2020 - 02 - 29));
        assert_eq!(window.start, date!(2019 - 11 - 01));
    }

    #[test]
    fn future_contract_is_clamped_to_today() {
        let today = date!(2024 - 06 - 10);
        let window = DateWindow::for_contract(month(12), 2024, 30, today).expect("window");
        assert_eq!(window.end, today);
        assert_eq!(window.start, date!(2024 - 05 - 11));
    }
}
