//! Instrument and exchange lookup tables.
//!
//! A [`Registry`] is built once at startup (from the built-in tables or a
//! configuration file) and passed by reference into every core operation.
//! Instrument order is significant: it drives the round-robin of the
//! contract universe builder, so the table keeps insertion order.

use std::collections::BTreeMap;
use std::fmt::Formatter;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use time::macros::format_description;
use time::Date;

use crate::domain::{parse_cycle, MonthCode};
use crate::ConfigError;

/// Root code marking an instrument that is configured but never downloaded.
pub const EXCLUDED_CODE: &str = "none";

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Per-instrument configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Futures root symbol, or [`EXCLUDED_CODE`].
    pub code: String,
    /// Roll cycle as month letters in trading order, e.g. `HMUZ`.
    pub cycle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_count: Option<u32>,
}

impl InstrumentConfig {
    pub fn new(code: impl Into<String>, cycle: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            cycle: cycle.into(),
            exchange: Some(exchange.into()),
            days_count: None,
        }
    }

    pub fn with_days_count(mut self, days_count: u32) -> Self {
        self.days_count = Some(days_count);
        self
    }

    pub fn is_excluded(&self) -> bool {
        self.code.trim().eq_ignore_ascii_case(EXCLUDED_CODE)
    }

    /// Number of contract months per year.
    pub fn cycle_len(&self) -> usize {
        self.cycle.trim().chars().count()
    }

    pub fn months(&self, instrument: &str) -> Result<Vec<MonthCode>, ConfigError> {
        parse_cycle(&self.cycle).ok_or_else(|| ConfigError::InvalidCycle {
            instrument: instrument.to_owned(),
            cycle: self.cycle.clone(),
        })
    }
}

/// Data availability cutover dates for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Earliest date with hourly data.
    #[serde(with = "iso_date")]
    pub tick_date: Date,
    /// Earliest date with daily data.
    #[serde(with = "iso_date")]
    pub eod_date: Date,
}

impl ExchangeConfig {
    pub const fn new(tick_date: Date, eod_date: Date) -> Self {
        Self { tick_date, eod_date }
    }

    /// Build from `YYYY-MM-DD` strings.
    pub fn parse(exchange: &str, tick_date: &str, eod_date: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            tick_date: parse_exchange_date(exchange, tick_date)?,
            eod_date: parse_exchange_date(exchange, eod_date)?,
        })
    }
}

fn parse_exchange_date(exchange: &str, value: &str) -> Result<Date, ConfigError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        ConfigError::InvalidExchangeDate {
            exchange: exchange.to_owned(),
            value: value.to_owned(),
        }
    })
}

/// Instrument table that keeps the order entries were written in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentTable(Vec<(String, InstrumentConfig)>);

impl InstrumentTable {
    pub fn new(entries: Vec<(String, InstrumentConfig)>) -> Self {
        Self(entries)
    }

    pub fn into_inner(self) -> Vec<(String, InstrumentConfig)> {
        self.0
    }
}

impl<'de> Deserialize<'de> for InstrumentTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = InstrumentTable;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a map of instrument code to instrument config")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((code, config)) = access.next_entry::<String, InstrumentConfig>()? {
                    entries.push((code, config));
                }
                Ok(InstrumentTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Immutable instrument + exchange lookup tables.
#[derive(Debug, Clone)]
pub struct Registry {
    instruments: Vec<(String, InstrumentConfig)>,
    exchanges: BTreeMap<String, ExchangeConfig>,
    roots: BTreeMap<String, String>,
}

impl Registry {
    /// Validate and index the tables.
    ///
    /// Root symbols must be unique across non-excluded instruments, and every
    /// roll cycle must use recognized month letters. Exchange references are
    /// checked lazily by the availability policy so that one misconfigured
    /// instrument does not stop a run.
    pub fn new(
        instruments: Vec<(String, InstrumentConfig)>,
        exchanges: BTreeMap<String, ExchangeConfig>,
    ) -> Result<Self, ConfigError> {
        let mut roots: BTreeMap<String, String> = BTreeMap::new();

        for (code, config) in &instruments {
            if config.is_excluded() {
                continue;
            }
            config.months(code)?;

            let root = config.code.trim().to_ascii_uppercase();
            if let Some(first) = roots.get(&root) {
                return Err(ConfigError::DuplicateRoot {
                    root,
                    first: first.clone(),
                    second: code.clone(),
                });
            }
            roots.insert(root, code.clone());
        }

        Ok(Self {
            instruments,
            exchanges,
            roots,
        })
    }

    /// Default tables used when no configuration file supplies its own.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(builtin_instruments(), builtin_exchanges()?)
    }

    /// Instruments in configured order.
    pub fn instruments(&self) -> impl Iterator<Item = (&str, &InstrumentConfig)> {
        self.instruments
            .iter()
            .map(|(code, config)| (code.as_str(), config))
    }

    pub fn instrument_codes(&self) -> Vec<String> {
        self.instruments.iter().map(|(code, _)| code.clone()).collect()
    }

    pub fn instrument(&self, code: &str) -> Result<&InstrumentConfig, ConfigError> {
        self.instruments
            .iter()
            .find(|(candidate, _)| candidate == code)
            .map(|(_, config)| config)
            .ok_or_else(|| ConfigError::UnknownInstrument {
                instrument: code.to_owned(),
            })
    }

    /// Instrument code for a root symbol, case-insensitive.
    pub fn instrument_for_root(&self, root: &str) -> Result<&str, ConfigError> {
        self.roots
            .get(&root.trim().to_ascii_uppercase())
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownRoot {
                root: root.to_owned(),
            })
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        self.exchanges.get(name)
    }

    pub fn exchanges(&self) -> &BTreeMap<String, ExchangeConfig> {
        &self.exchanges
    }
}

// (instrument code, root symbol, roll cycle, exchange)
const BUILTIN_INSTRUMENTS: &[(&str, &str, &str, &str)] = &[
    ("AUD", "A6", "HMUZ", "CME"),
    ("GBP", "B6", "HMUZ", "CME"),
    ("CAD", "D6", "HMUZ", "CME"),
    ("EUR", "E6", "HMUZ", "CME"),
    ("JPY", "J6", "HMUZ", "CME"),
    ("CHF", "S6", "HMUZ", "CME"),
    ("GOLD", "GC", "GJMQVZ", "COMEX"),
    ("SILVER", "SI", "HKNUZ", "COMEX"),
    ("COPPER", "HG", "HKNUZ", "COMEX"),
    ("CRUDE_W", "CL", "FGHJKMNQUVXZ", "NYMEX"),
    ("GAS_US", "NG", "FGHJKMNQUVXZ", "NYMEX"),
    ("SP500", "ES", "HMUZ", "CME"),
    ("US10", "ZN", "HMUZ", "CBOT"),
    ("US5", "ZF", "HMUZ", "CBOT"),
    ("US2", "ZT", "HMUZ", "CBOT"),
    ("CORN", "ZC", "HKNUZ", "CBOT"),
    ("SOYBEAN", "ZS", "FHKNQUX", "CBOT"),
    ("WHEAT", "ZW", "HKNUZ", "CBOT"),
    ("FTSE100", "X", "HMUZ", "ICE"),
];

/// Default instrument table, in round-robin order.
pub fn builtin_instruments() -> Vec<(String, InstrumentConfig)> {
    BUILTIN_INSTRUMENTS
        .iter()
        .map(|(code, root, cycle, exchange)| {
            ((*code).to_owned(), InstrumentConfig::new(*root, *cycle, *exchange))
        })
        .collect()
}

pub fn builtin_exchanges() -> Result<BTreeMap<String, ExchangeConfig>, ConfigError> {
    [
        ("CBOT", "2000-01-01", "1990-01-01"),
        ("CME", "2009-11-24", "1990-01-01"),
        ("COMEX", "2000-01-01", "1990-01-01"),
        ("ICE", "2000-01-01", "1990-01-01"),
        ("NYMEX", "2000-01-01", "1990-01-01"),
    ]
    .into_iter()
    .map(|(name, tick, eod)| Ok((name.to_owned(), ExchangeConfig::parse(name, tick, eod)?)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn builtin_tables_index_every_root() {
        let registry = Registry::builtin().expect("builtin tables are valid");
        assert_eq!(registry.instrument_for_root("a6").expect("root"), "AUD");
        assert_eq!(registry.instrument_for_root("CL").expect("root"), "CRUDE_W");
        assert_eq!(
            registry.exchange("CME").map(|exchange| exchange.tick_date),
            Some(date!(2009 - 11 - 24))
        );
    }

    #[test]
    fn rejects_duplicate_roots() {
        let err = Registry::new(
            vec![
                (String::from("AUD"), InstrumentConfig::new("A6", "HMUZ", "CME")),
                (String::from("AUD_2"), InstrumentConfig::new("a6", "HMUZ", "CME")),
            ],
            BTreeMap::new(),
        )
        .expect_err("duplicate root");
        assert!(matches!(err, ConfigError::DuplicateRoot { .. }));
    }

    #[test]
    fn excluded_instruments_do_not_claim_roots() {
        let registry = Registry::new(
            vec![
                (String::from("OLD"), InstrumentConfig::new("none", "HMUZ", "CME")),
                (String::from("NEW"), InstrumentConfig::new("NONE", "HMUZ", "CME")),
            ],
            BTreeMap::new(),
        )
        .expect("excluded instruments may share the sentinel");
        assert!(registry.instrument_for_root("none").is_err());
    }

    #[test]
    fn rejects_invalid_cycle_letters() {
        let err = Registry::new(
            vec![(String::from("BAD"), InstrumentConfig::new("BD", "HMAZ", "CME"))],
            BTreeMap::new(),
        )
        .expect_err("invalid cycle");
        assert!(matches!(err, ConfigError::InvalidCycle { .. }));
    }

    #[test]
    fn instrument_table_keeps_yaml_order() {
        let yaml = "ZED: {code: ZZ, cycle: H}\nALPHA: {code: AA, cycle: M, exchange: CME, days_count: 30}\n";
        let table: InstrumentTable = serde_yaml::from_str(yaml).expect("valid yaml");
        let entries = table.into_inner();
        assert_eq!(entries[0].0, "ZED");
        assert_eq!(entries[1].0, "ALPHA");
        assert_eq!(entries[1].1.days_count, Some(30));
        assert_eq!(entries[0].1.exchange, None);
    }

    #[test]
    fn exchange_dates_parse_from_yaml() {
        let yaml = "tick_date: 2009-11-24\neod_date: 1990-01-01\n";
        let exchange: ExchangeConfig = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(exchange.eod_date, date!(1990 - 01 - 01));
    }
}
