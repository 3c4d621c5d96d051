//! Behavior-driven tests for the contract universe builder.

use std::path::Path;

use futarchive_core::{build_contract_list, AppConfig, ContractId, CoreError, ConfigError};

fn ids(list: &[ContractId]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

fn config(yaml: &str) -> AppConfig {
    AppConfig::from_yaml(yaml, Path::new("test.yaml")).expect("valid config")
}

const MIXED: &str = r#"
instruments:
  AUD: { code: A6, cycle: HMUZ, exchange: CME }
  RETIRED: { code: none, cycle: HMUZ, exchange: CME }
  CRUDE_W: { code: CL, cycle: FGHJKMNQUVXZ, exchange: NYMEX }
"#;

#[test]
fn when_instruments_roll_at_different_rates_system_interleaves_newest_first() {
    // Given: A quarterly instrument, an excluded one, and a monthly one
    let registry = config(MIXED).registry().expect("registry");

    // When: The system builds the 2020 work-list
    let list = build_contract_list(&registry, 2020, 2021, None).expect("work-list");

    // Then: Each visit pops one quarterly and three monthly contracts, latest first
    assert_eq!(
        ids(&list),
        [
            "A6Z20", "CLZ20", "CLX20", "CLV20", //
            "A6U20", "CLU20", "CLQ20", "CLN20", //
            "A6M20", "CLM20", "CLK20", "CLJ20", //
            "A6H20", "CLH20", "CLG20", "CLF20",
        ]
    );
}

#[test]
fn when_built_twice_system_returns_identical_order() {
    // Given: The built-in registry
    let registry = AppConfig::default().registry().expect("registry");

    // When: The system builds the same work-list twice
    let first = build_contract_list(&registry, 2019, 2022, None).expect("work-list");
    let second = build_contract_list(&registry, 2019, 2022, None).expect("work-list");

    // Then: The order is reproducible
    assert_eq!(ids(&first), ids(&second));
    assert!(!first.is_empty());
}

#[test]
fn when_instrument_filter_given_system_lists_only_those_contracts() {
    // Given: The mixed registry
    let registry = config(MIXED).registry().expect("registry");

    // When: The system builds a work-list restricted to AUD
    let filter = [String::from("AUD")];
    let list = build_contract_list(&registry, 2020, 2022, Some(&filter[..])).expect("work-list");

    // Then: Only AUD contracts appear
    assert_eq!(list.len(), 8);
    assert!(list.iter().all(|contract| contract.root() == "A6"));
}

#[test]
fn when_filter_names_unknown_instrument_system_returns_config_error() {
    // Given: The built-in registry
    let registry = AppConfig::default().registry().expect("registry");

    // When: The system is asked for an instrument it does not know
    let filter = [String::from("BITCOIN")];
    let result = build_contract_list(&registry, 2020, 2021, Some(&filter[..]));

    // Then: A configuration error names it
    assert!(matches!(
        result,
        Err(CoreError::Config(ConfigError::UnknownInstrument { .. }))
    ));
}

#[test]
fn when_two_instruments_share_a_root_system_rejects_configuration() {
    // Given: Two instruments mapped to the same root symbol
    let yaml = r#"
instruments:
  AUD: { code: A6, cycle: HMUZ, exchange: CME }
  AUD_MINI: { code: a6, cycle: HMUZ, exchange: CME }
"#;

    // When: The system builds the registry
    let result = config(yaml).registry();

    // Then: The duplicate root is reported
    assert!(matches!(result, Err(ConfigError::DuplicateRoot { .. })));
}
