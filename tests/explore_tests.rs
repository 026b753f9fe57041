mod common;

use common::{parity_fuzz_cmd, write_config, write_rule_file, SINGLE_OP_SPEC};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn records_a_mismatch_bundle_when_targets_return_different_status_codes() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/widgets/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "w1"})))
        .mount(&server_a)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/widgets/.*$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server_b)
        .await;

    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, SINGLE_OP_SPEC).unwrap();
    let rules_path = write_rule_file(dir.path());
    let config_path = write_config(dir.path(), &server_a.uri(), &server_b.uri(), &rules_path);
    let out_dir = dir.path().join("out");

    parity_fuzz_cmd()
        .args(["explore", "--spec"])
        .arg(&spec_path)
        .arg("--config")
        .arg(&config_path)
        .args(["--target-a", "a", "--target-b", "b", "--out"])
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("mismatches=1"));

    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out_dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["mismatches"], 1);
    assert_eq!(summary["cases_sent"], 1);

    let mismatches_dir = out_dir.join("mismatches");
    assert!(mismatches_dir.is_dir());
    assert_eq!(std::fs::read_dir(&mismatches_dir).unwrap().count(), 1);
}

#[tokio::test]
async fn no_bundle_is_written_when_both_targets_agree() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;

    for server in [&server_a, &server_b] {
        Mock::given(method("GET"))
            .and(path_regex(r"^/widgets/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "w1"})))
            .mount(server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("spec.yaml");
    std::fs::write(&spec_path, SINGLE_OP_SPEC).unwrap();
    let rules_path = write_rule_file(dir.path());
    let config_path = write_config(dir.path(), &server_a.uri(), &server_b.uri(), &rules_path);
    let out_dir = dir.path().join("out");

    parity_fuzz_cmd()
        .args(["explore", "--spec"])
        .arg(&spec_path)
        .arg("--config")
        .arg(&config_path)
        .args(["--target-a", "a", "--target-b", "b", "--out"])
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("mismatches=0"));

    assert!(!out_dir.join("mismatches").exists());
}
