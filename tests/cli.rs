//! CLI-level tests against the `abridge` binary, following the teacher's
//! `assert_cmd`/`predicates`-driven `tests/commands.rs` style.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

async fn make_source_db(dir: &std::path::Path) -> std::path::PathBuf {
    let db_path = dir.join("src.db");
    let db = libsql::Builder::new_local(db_path.to_str().unwrap())
        .build()
        .await
        .expect("failed to create source database");
    let conn = db.connect().expect("failed to connect");
    conn.execute_batch(
        "CREATE TABLE test1 (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO test1 (id, name) VALUES (1, 'a'), (2, 'b');",
    )
    .await
    .expect("failed to seed source database");
    db_path
}

#[tokio::test]
async fn generates_sql_script_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = make_source_db(dir.path()).await;
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "- subject:\n    - tables:\n        - table: test1\n",
    )
    .unwrap();

    let src_url = format!("sqlite://{}", db_path.display());

    Command::cargo_bin("abridge")
        .unwrap()
        .args([config_path.to_str().unwrap(), &src_url, "-f", "-", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("INSERT INTO"))
        .stdout(predicate::str::contains("BEGIN;"))
        .stdout(predicate::str::contains("COMMIT;"));
}

#[tokio::test]
async fn missing_destination_flag_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = make_source_db(dir.path()).await;
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "- subject:\n    - tables:\n        - table: test1\n",
    )
    .unwrap();

    let src_url = format!("sqlite://{}", db_path.display());

    Command::cargo_bin("abridge")
        .unwrap()
        .args([config_path.to_str().unwrap(), &src_url])
        .assert()
        .code(1);
}

#[tokio::test]
async fn explain_mode_prints_trail_without_generating() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = make_source_db(dir.path()).await;
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "- subject:\n    - tables:\n        - table: test1\n",
    )
    .unwrap();

    let src_url = format!("sqlite://{}", db_path.display());

    Command::cargo_bin("abridge")
        .unwrap()
        .args([config_path.to_str().unwrap(), &src_url, "-e"])
        .assert()
        .success()
        .stdout(predicate::str::contains("test1"));
}
