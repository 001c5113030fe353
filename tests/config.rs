//! Config file loading: recursive `{include: ...}` resolution and the
//! single-key-mapping / sequence-root validation rules.

use abridge::config;
use abridge::ErrorType;
use std::fs;
use tempfile::tempdir;

fn single_key(entry: &serde_yaml::Value) -> String {
    entry
        .as_mapping()
        .expect("entry must be a mapping")
        .iter()
        .next()
        .expect("entry must have one key")
        .0
        .as_str()
        .expect("key must be a string")
        .to_string()
}

#[test]
fn include_expands_in_place() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("subject.yaml"),
        "- subject:\n    - tables:\n        - table: test1\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.yaml"),
        "- include: subject.yaml\n- not-null-columns: []\n",
    )
    .unwrap();

    let entries = config::load(&dir.path().join("main.yaml")).expect("include should resolve");
    assert_eq!(entries.len(), 2);
    assert_eq!(single_key(&entries[0]), "subject");
    assert_eq!(single_key(&entries[1]), "not-null-columns");
}

#[test]
fn include_list_concatenates() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.yaml"), "- not-null-columns: []\n").unwrap();
    fs::write(dir.path().join("b.yaml"), "- relations: []\n").unwrap();
    fs::write(
        dir.path().join("main.yaml"),
        "- include: [a.yaml, b.yaml]\n",
    )
    .unwrap();

    let entries = config::load(&dir.path().join("main.yaml")).unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn missing_include_target_is_an_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.yaml"), "- include: nope.yaml\n").unwrap();

    let err = config::load(&dir.path().join("main.yaml")).unwrap_err();
    assert!(matches!(err.error_type, ErrorType::Include { .. }));
}

#[test]
fn non_sequence_root_is_a_data_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.yaml"), "subject: []\n").unwrap();

    let err = config::load(&dir.path().join("main.yaml")).unwrap_err();
    assert!(matches!(err.error_type, ErrorType::DataError { .. }));
}

#[test]
fn missing_file_is_a_config_file_loader_error() {
    let err = config::load(std::path::Path::new("/no/such/path.yaml")).unwrap_err();
    assert!(matches!(err.error_type, ErrorType::ConfigFileLoader { .. }));
}
