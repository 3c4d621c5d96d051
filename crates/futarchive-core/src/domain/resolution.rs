use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::ValidationError;

/// Sampling granularity of an archived price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Day,
    Hour,
}

impl Resolution {
    /// Order in which a run visits resolutions for each contract.
    pub const ALL: [Self; 2] = [Self::Hour, Self::Day];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "Day",
            Self::Hour => "Hour",
        }
    }

    pub const fn period(self) -> &'static str {
        match self {
            Self::Day => "daily",
            Self::Hour => "hourly",
        }
    }

    /// Offset after the last archived bar at which an incremental fetch resumes.
    pub fn restart_offset(self) -> Duration {
        match self {
            Self::Day => Duration::hours(25),
            Self::Hour => Duration::hours(1),
        }
    }

    /// Resolutions to visit for a run, hourly only when `daily` is false.
    pub fn for_run(daily: bool) -> &'static [Self] {
        if daily {
            &Self::ALL
        } else {
            &Self::ALL[..1]
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Day" => Ok(Self::Day),
            "Hour" => Ok(Self::Hour),
            other => Err(ValidationError::UnknownResolution {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_tokens_only() {
        assert_eq!(Resolution::from_str("Day").expect("day"), Resolution::Day);
        assert_eq!(Resolution::from_str("Hour").expect("hour"), Resolution::Hour);
        assert!(Resolution::from_str("hour").is_err());
        assert!(Resolution::from_str("Min").is_err());
    }

    #[test]
    fn hourly_only_runs_skip_daily() {
        assert_eq!(Resolution::for_run(false), &[Resolution::Hour]);
        assert_eq!(Resolution::for_run(true), &[Resolution::Hour, Resolution::Day]);
    }
}
