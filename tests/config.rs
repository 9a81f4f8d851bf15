use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use acquisition_organizer::config::{Config, ConfigLoader, ConfigOverrides};
use acquisition_organizer::error::OrganizerError;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("acq-org.json");
    fs::write(
        &path,
        r#"{ "base_path": "/srv/acquisitions", "ledger_file": "ledger.csv", "record_without_source": false }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(resolved.base_path, Utf8PathBuf::from("/srv/acquisitions"));
    assert_eq!(
        resolved.ledger_path(),
        Utf8PathBuf::from("/srv/acquisitions/ledger.csv")
    );
    assert!(!resolved.record_without_source);
    assert_eq!(resolved.log_dir, Utf8PathBuf::from("logs"));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, OrganizerError::ConfigRead(_));
}

#[test]
fn unknown_keys_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("acq-org.json");
    fs::write(&path, r#"{ "base": "data" }"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, OrganizerError::ConfigParse(_));
}

#[test]
fn ledger_file_must_be_a_file_name() {
    let config = Config {
        ledger_file: Some("../metadata.csv".to_string()),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, OrganizerError::ConfigParse(_));
}

#[test]
fn overrides_beat_file_values() {
    let resolved = ConfigLoader::resolve_config(Config {
        base_path: Some("from-file".to_string()),
        ..Config::default()
    })
    .unwrap();

    let resolved = ConfigLoader::apply_overrides(
        resolved,
        ConfigOverrides {
            base_path: Some("from-cli".to_string()),
            log_dir: None,
        },
    );

    assert_eq!(resolved.base_path, Utf8PathBuf::from("from-cli"));
    assert_eq!(resolved.log_dir, Utf8PathBuf::from("logs"));
}
