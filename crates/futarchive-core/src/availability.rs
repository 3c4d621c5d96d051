use time::Date;

use crate::domain::Resolution;
use crate::registry::Registry;
use crate::ConfigError;

/// True when `start` predates the instrument's exchange cutover for `resolution`,
/// so the provider cannot have data at that granularity.
pub fn is_before_available_resolution(
    resolution: Resolution,
    start: Date,
    instrument: &str,
    registry: &Registry,
) -> Result<bool, ConfigError> {
    let config = registry.instrument(instrument)?;
    let exchange_name = config
        .exchange
        .as_deref()
        .ok_or_else(|| ConfigError::MissingExchange {
            instrument: instrument.to_owned(),
        })?;
    let exchange = registry
        .exchange(exchange_name)
        .ok_or_else(|| ConfigError::UnknownExchange {
            exchange: exchange_name.to_owned(),
        })?;

    Ok(match resolution {
        Resolution::Hour => start < exchange.tick_date,
        Resolution::Day => start < exchange.eod_date,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use time::macros::date;

    use super::*;
    use crate::registry::{ExchangeConfig, InstrumentConfig};

    fn registry() -> Registry {
        let mut exchanges = BTreeMap::new();
        exchanges.insert(
            String::from("CME"),
            ExchangeConfig::new(date!(2009 - 11 - 24), date!(1990 - 01 - 01)),
        );
        let mut orphan = InstrumentConfig::new("OR", "HMUZ", "CME");
        orphan.exchange = None;

        Registry::new(
            vec![
                (String::from("AUD"), InstrumentConfig::new("A6", "HMUZ", "CME")),
                (String::from("FTSE100"), InstrumentConfig::new("X", "HMUZ", "ICE")),
                (String::from("ORPHAN"), orphan),
            ],
            exchanges,
        )
        .expect("registry")
    }

    #[test]
    fn hourly_data_starts_at_tick_date() {
        let registry = registry();
        assert!(is_before_available_resolution(Resolution::Hour, date!(2008 - 01 - 01), "AUD", &registry)
            .expect("configured"));
        assert!(!is_before_available_resolution(Resolution::Hour, date!(2010 - 01 - 01), "AUD", &registry)
            .expect("configured"));
    }

    #[test]
    fn daily_data_starts_at_eod_date() {
        let registry = registry();
        assert!(!is_before_available_resolution(Resolution::Day, date!(2008 - 01 - 01), "AUD", &registry)
            .expect("configured"));
        assert!(is_before_available_resolution(Resolution::Day, date!(1989 - 12 - 31), "AUD", &registry)
            .expect("configured"));
    }

    #[test]
    fn missing_or_unknown_exchange_is_a_config_error() {
        let registry = registry();
        assert!(matches!(
            is_before_available_resolution(Resolution::Hour, date!(2020 - 01 - 01), "ORPHAN", &registry),
            Err(ConfigError::MissingExchange { .. })
        ));
        assert!(matches!(
            is_before_available_resolution(Resolution::Hour, date!(2020 - 01 - 01), "FTSE100", &registry),
            Err(ConfigError::UnknownExchange { .. })
        ));
    }
}
