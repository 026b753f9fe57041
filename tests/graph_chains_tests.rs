mod common;

use common::{parity_fuzz_cmd, LINKED_SPEC, SINGLE_OP_SPEC};
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn prints_the_explicit_link_edge_between_two_operations() {
    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, LINKED_SPEC).unwrap();

    parity_fuzz_cmd()
        .args(["graph-chains", "--spec"])
        .arg(&spec_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("create-order --GetOrder--> get-order"));
}

#[test]
fn reports_orphans_when_no_links_connect_the_only_operation() {
    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, SINGLE_OP_SPEC).unwrap();

    parity_fuzz_cmd()
        .args(["graph-chains", "--spec"])
        .arg(&spec_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("no explicit links declared"))
        .stdout(predicate::str::contains("orphans: get-widget"));
}

#[test]
fn generated_flag_prints_a_discovered_chain_signature() {
    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, LINKED_SPEC).unwrap();

    parity_fuzz_cmd()
        .args(["graph-chains", "--spec"])
        .arg(&spec_path)
        .arg("--generated")
        .assert()
        .success()
        .stdout(predicate::str::contains("create-order>get-order"));
}
