mod common;

use common::{parity_fuzz_cmd, LINKED_SPEC, SINGLE_OP_SPEC};
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn reports_no_orphans_for_a_fully_linked_spec() {
    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, LINKED_SPEC).unwrap();

    parity_fuzz_cmd()
        .args(["lint-spec", "--spec"])
        .arg(&spec_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 operations, 1 links, 0 orphans"));
}

#[test]
fn flags_an_operation_with_no_links_as_an_orphan() {
    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, SINGLE_OP_SPEC).unwrap();

    parity_fuzz_cmd()
        .args(["lint-spec", "--spec"])
        .arg(&spec_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("orphans: get-widget"));
}

#[test]
fn json_output_is_valid_and_carries_the_same_counts() {
    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, LINKED_SPEC).unwrap();

    let output = parity_fuzz_cmd()
        .args(["lint-spec", "--spec"])
        .arg(&spec_path)
        .args(["--output", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["operations"], 2);
    assert_eq!(report["links"], 1);
}
