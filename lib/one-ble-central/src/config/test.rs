use std::time::Duration;

use assert2::{assert, let_assert};
use rusty_fork::rusty_fork_test;

use super::{CentralConfig, ConfigParsingError};

#[test]
fn test_defaults() {
    let config = CentralConfig::default();

    assert!(config.ready_delay == Duration::from_millis(50));
    assert!(config.event_capacity == 64);
    assert!(config.restoration_id.is_none());
    assert!(config.connect_timeout.is_none());
}

#[test]
#[cfg(feature = "config_yaml")]
fn test_parse_merges_yaml_in_order() {
    let base = indoc::indoc! {"
        restorationId: 'wallet-central'
        connectTimeout: 10000
        readTimeout: 2000
    "};
    let overrides = indoc::indoc! {"
        readTimeout: 500
        readyDelay: 20
    "};

    let config = CentralConfig::from_yaml([base, overrides]).unwrap();

    assert!(config.restoration_id.as_deref() == Some("wallet-central"));
    assert!(config.connect_timeout == Some(Duration::from_secs(10)));
    assert!(config.read_timeout == Some(Duration::from_millis(500)));
    assert!(config.ready_delay == Duration::from_millis(20));
    assert!(config.write_timeout.is_none());
    assert!(config.event_capacity == 64);
}

#[test]
#[cfg(feature = "config_yaml")]
fn test_parse_rejects_invalid_value() {
    let config = indoc::indoc! {"
        eventCapacity: 'many'
    "};

    let_assert!(
        Err(ConfigParsingError::GeneralParsingError(_)) = CentralConfig::from_yaml([config])
    );
}

#[test]
fn test_from_files_rejects_unknown_extension() {
    let_assert!(
        Err(ConfigParsingError::GeneralParsingError(_)) =
            CentralConfig::from_files(&["central.toml"])
    );
}

rusty_fork_test! {
    #[test]
    #[cfg(all(feature = "config_yaml", feature = "config_env"))]
    fn test_env_overrides_yaml() {
        let config = indoc::indoc! {"
            scanTimeout: 3000
        "};
        unsafe {
            std::env::set_var("BLE_scanTimeout", "1500");
            std::env::set_var("BLE_restorationId", "from-env");
        }

        let config = CentralConfig::from_yaml([config]).unwrap();

        assert!(config.scan_timeout == Some(Duration::from_millis(1500)));
        assert!(config.restoration_id.as_deref() == Some("from-env"));
    }
}
