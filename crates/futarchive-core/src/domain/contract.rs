use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::MonthCode;
use crate::ValidationError;

/// Two-digit years above this value resolve to the 1900s.
pub const YEAR_PIVOT: u8 = 30;

/// External contract identifier: root symbol, month letter, 2-digit year (`A6H20`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId {
    root: String,
    letter: char,
    year_suffix: u8,
}

impl ContractId {
    /// Split an identifier into root, month letter, and year suffix.
    ///
    /// The month letter is kept as written; an unrecognized letter is only
    /// reported when [`ContractId::month`] is asked for it.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let malformed = || ValidationError::MalformedContractId {
            value: input.to_owned(),
        };

        let chars: Vec<char> = trimmed.chars().collect();
        if chars.len() < 4 {
            return Err(malformed());
        }

        let (head, year) = chars.split_at(chars.len() - 2);
        if !year.iter().all(char::is_ascii_digit) {
            return Err(malformed());
        }
        let (root, letter) = head.split_at(head.len() - 1);
        let letter = letter[0];
        if !letter.is_ascii_alphabetic() || root.iter().any(|ch| ch.is_whitespace()) {
            return Err(malformed());
        }

        let year_suffix = year
            .iter()
            .fold(0_u8, |acc, digit| acc * 10 + digit.to_digit(10).unwrap_or(0) as u8);

        Ok(Self {
            root: root.iter().collect::<String>().to_ascii_uppercase(),
            letter: letter.to_ascii_uppercase(),
            year_suffix,
        })
    }

    /// Build an identifier from its parts; the year keeps its last two digits.
    pub fn new(root: impl Into<String>, month: MonthCode, year: i32) -> Result<Self, ValidationError> {
        if year < 0 {
            return Err(ValidationError::InvalidYear { value: year });
        }
        let root = root.into().trim().to_ascii_uppercase();
        if root.is_empty() {
            return Err(ValidationError::MalformedContractId { value: root });
        }

        Ok(Self {
            root,
            letter: month.letter(),
            year_suffix: (year % 100) as u8,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub const fn letter(&self) -> char {
        self.letter
    }

    pub const fn year_suffix(&self) -> u8 {
        self.year_suffix
    }

    /// Calendar month, or `None` when the letter is not a futures month letter.
    pub fn month(&self) -> Option<MonthCode> {
        MonthCode::from_letter(self.letter)
    }

    /// Absolute year using the fixed pivot.
    pub const fn year(&self) -> i32 {
        expand_year(self.year_suffix)
    }

    /// Month and year, failing on an unrecognized month letter.
    pub fn month_year(&self) -> Result<(MonthCode, i32), ValidationError> {
        let month = self.month().ok_or(ValidationError::UnknownMonthLetter {
            letter: self.letter,
        })?;
        Ok((month, self.year()))
    }
}

/// Resolve a 2-digit contract year into an absolute year.
pub const fn expand_year(suffix: u8) -> i32 {
    if suffix > YEAR_PIVOT {
        1900 + suffix as i32
    } else {
        2000 + suffix as i32
    }
}

impl Display for ContractId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{:02}", self.root, self.letter, self.year_suffix)
    }
}

impl TryFrom<String> for ContractId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ContractId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContractId> for String {
    fn from(value: ContractId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_month_and_year() {
        let id = ContractId::parse("A6H20").expect("valid id");
        assert_eq!(id.root(), "A6");
        assert_eq!(id.month().map(MonthCode::number), Some(3));
        assert_eq!(id.year(), 2020);
        assert_eq!(id.to_string(), "A6H20");
    }

    #[test]
    fn applies_year_pivot() {
        assert_eq!(ContractId::parse("GCZ31").expect("id").year(), 1931);
        assert_eq!(ContractId::parse("GCZ30").expect("id").year(), 2030);
        assert_eq!(ContractId::parse("GCZ99").expect("id").year(), 1999);
        assert_eq!(ContractId::parse("GCZ00").expect("id").year(), 2000);
    }

    #[test]
    fn unknown_month_letter_is_absent_not_an_error() {
        let id = ContractId::parse("XXA24").expect("structurally valid");
        assert_eq!(id.month(), None);
        assert!(matches!(
            id.month_year(),
            Err(ValidationError::UnknownMonthLetter { letter: 'A' })
        ));
    }

    #[test]
    fn rejects_missing_year_digits() {
        assert!(ContractId::parse("A6H2").is_err());
        assert!(ContractId::parse("A6HX0").is_err());
        assert!(ContractId::parse("H20").is_err());
    }

    #[test]
    fn builds_from_parts_with_two_digit_suffix() {
        let month = MonthCode::from_number(1).expect("month");
        let id = ContractId::new("gc", month, 2000).expect("valid");
        assert_eq!(id.to_string(), "GCF00");
        assert_eq!(id.year(), 2000);
    }
}
