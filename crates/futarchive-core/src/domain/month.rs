use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Futures month letters, January through December.
pub const MONTH_LETTERS: [char; 12] = ['F', 'G', 'H', 'J', 'K', 'M', 'N', 'Q', 'U', 'V', 'X', 'Z'];

/// Calendar month of a futures contract, rendered as its month letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MonthCode(u8);

impl MonthCode {
    pub fn from_number(month: u8) -> Result<Self, ValidationError> {
        if (1..=12).contains(&month) {
            Ok(Self(month))
        } else {
            Err(ValidationError::InvalidMonth { value: month })
        }
    }

    /// Case-insensitive letter lookup. `None` for letters outside the alphabet.
    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        MONTH_LETTERS
            .iter()
            .position(|candidate| *candidate == upper)
            .map(|index| Self(index as u8 + 1))
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    pub const fn letter(self) -> char {
        MONTH_LETTERS[(self.0 - 1) as usize]
    }

    pub fn to_time_month(self) -> time::Month {
        time::Month::try_from(self.0).unwrap_or(time::Month::January)
    }
}

impl Display for MonthCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl TryFrom<u8> for MonthCode {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_number(value)
    }
}

impl From<MonthCode> for u8 {
    fn from(value: MonthCode) -> Self {
        value.0
    }
}

/// Parse a roll cycle such as `HMUZ` into month codes, preserving order.
pub fn parse_cycle(cycle: &str) -> Option<Vec<MonthCode>> {
    cycle.trim().chars().map(MonthCode::from_letter).collect()
}
