//! # Domain Models
//!
//! Canonical domain types for futures contract archives.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MonthCode`] | Calendar month with its futures letter (F..Z) |
//! | [`Resolution`] | Series granularity (Day, Hour) |
//! | [`ContractId`] | External identifier such as `A6H20` |
//! | [`Bar`] | OHLCV bar with UTC timestamp |
//! | [`PriceSeries`] | Strictly increasing bar sequence |
//!
//! Construction validates invariants; a [`PriceSeries`] cannot hold a
//! duplicate or out-of-order timestamp.

mod bar;
mod contract;
mod month;
mod resolution;
pub mod timestamp;

pub use bar::{Bar, PriceSeries};
pub use contract::{expand_year, ContractId, YEAR_PIVOT};
pub use month::{parse_cycle, MonthCode, MONTH_LETTERS};
pub use resolution::Resolution;
