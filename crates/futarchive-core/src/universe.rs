//! Contract universe builder.
//!
//! Each selected instrument gets a private queue of contract identifiers
//! (every year in range, cycle months in order). Queues are drained from the
//! end while cycling over all configured instruments, so a quota-limited run
//! reaches the most recent contracts of every instrument first.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::domain::ContractId;
use crate::registry::{InstrumentConfig, Registry};
use crate::{ConfigError, CoreError};

/// Contracts popped per visit, weighted by how often the instrument rolls.
pub fn batch_size(cycle_len: usize) -> usize {
    if cycle_len > 10 {
        3
    } else if cycle_len > 7 {
        2
    } else {
        1
    }
}

/// Interleaved work-list of contract identifiers for `[start_year, end_year)`.
///
/// `instruments` restricts the queues to the given codes; the round-robin
/// still walks every configured instrument. Output order is the pop order and
/// is reproducible for a fixed registry and range.
pub fn build_contract_list(
    registry: &Registry,
    start_year: i32,
    end_year: i32,
    instruments: Option<&[String]>,
) -> Result<Vec<ContractId>, CoreError> {
    if end_year < start_year {
        return Err(ConfigError::EmptyYearRange {
            start: start_year,
            end: end_year,
        }
        .into());
    }

    let selected: Vec<String> = match instruments {
        Some(codes) => codes.to_vec(),
        None => registry.instrument_codes(),
    };

    let mut queues: HashMap<String, Vec<ContractId>> = HashMap::new();
    for code in &selected {
        let config = registry.instrument(code)?;
        if config.is_excluded() || queues.contains_key(code) {
            continue;
        }
        queues.insert(code.clone(), instrument_queue(code, config, start_year, end_year)?);
    }

    let total: usize = queues.values().map(Vec::len).sum();
    info!(count = total, start_year, end_year, "built contract queues");

    let mut contracts = Vec::with_capacity(total);
    while contracts.len() < total {
        let before = contracts.len();

        for (code, config) in registry.instruments() {
            let Some(queue) = queues.get_mut(code) else {
                continue;
            };
            for _ in 0..batch_size(config.cycle_len()) {
                match queue.pop() {
                    Some(contract) => contracts.push(contract),
                    None => break,
                }
            }
            if contracts.len() >= total {
                break;
            }
        }

        if contracts.len() == before {
            break;
        }
    }

    debug!(contracts = ?contracts.iter().map(ToString::to_string).collect::<Vec<_>>(), "contract list");
    Ok(contracts)
}

fn instrument_queue(
    code: &str,
    config: &InstrumentConfig,
    start_year: i32,
    end_year: i32,
) -> Result<Vec<ContractId>, CoreError> {
    let months = config.months(code)?;
    let mut queue = Vec::with_capacity(months.len() * (end_year - start_year).max(0) as usize);
    for year in start_year..end_year {
        for month in &months {
            queue.push(ContractId::new(config.code.trim(), *month, year)?);
        }
    }
    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_tracks_cycle_length() {
        assert_eq!(batch_size(12), 3);
        assert_eq!(batch_size(11), 3);
        assert_eq!(batch_size(10), 2);
        assert_eq!(batch_size(8), 2);
        assert_eq!(batch_size(7), 1);
        assert_eq!(batch_size(4), 1);
    }

    #[test]
    fn single_instrument_pops_latest_first() {
        let registry = Registry::new(
            vec![(String::from("AUD"), InstrumentConfig::new("A6", "HMUZ", "CME"))],
            Default::default(),
        )
        .expect("registry");

        let list = build_contract_list(&registry, 2020, 2022, None).expect("list");
        let ids: Vec<String> = list.iter().map(ToString::to_string).collect();
        assert_eq!(
            ids,
            ["A6Z21", "A6U21", "A6M21", "A6H21", "A6Z20", "A6U20", "A6M20", "A6H20"]
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let registry = Registry::builtin().expect("builtin");
        assert!(build_contract_list(&registry, 2022, 2020, None).is_err());
    }

    #[test]
    fn empty_range_yields_nothing() {
        let registry = Registry::builtin().expect("builtin");
        let list = build_contract_list(&registry, 2020, 2020, None).expect("list");
        assert!(list.is_empty());
    }
}
