mod common;

use common::{parity_fuzz_cmd, write_config, write_rule_file, SINGLE_OP_SPEC};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn replay_classifies_a_fixed_mismatch_once_targets_agree() {
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
    let explore_out = dir.path().join("explore-out");

    parity_fuzz_cmd()
        .args(["explore", "--spec"])
        .arg(&spec_path)
        .arg("--config")
        .arg(&config_path)
        .args(["--target-a", "a", "--target-b", "b", "--out"])
        .arg(&explore_out)
        .assert()
        .success();

    // target b now agrees with target a: the recorded mismatch should replay as fixed.
    server_b.reset().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/widgets/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "w1"})))
        .mount(&server_b)
        .await;

    let replay_out = dir.path().join("replay-out");
    parity_fuzz_cmd()
        .args(["replay", "--config"])
        .arg(&config_path)
        .args(["--target-a", "a", "--target-b", "b", "--in"])
        .arg(explore_out.join("mismatches"))
        .arg("--out")
        .arg(&replay_out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Fixed"));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(replay_out.join("replay_summary.json")).unwrap()).unwrap();
    assert_eq!(summary["results"][0]["classification"], "fixed");
}

#[tokio::test]
async fn replay_classifies_an_unchanged_mismatch_as_still_mismatch() {
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
    let explore_out = dir.path().join("explore-out");

    parity_fuzz_cmd()
        .args(["explore", "--spec"])
        .arg(&spec_path)
        .arg("--config")
        .arg(&config_path)
        .args(["--target-a", "a", "--target-b", "b", "--out"])
        .arg(&explore_out)
        .assert()
        .success();

    let replay_out = dir.path().join("replay-out");
    parity_fuzz_cmd()
        .args(["replay", "--config"])
        .arg(&config_path)
        .args(["--target-a", "a", "--target-b", "b", "--in"])
        .arg(explore_out.join("mismatches"))
        .arg("--out")
        .arg(&replay_out)
        .assert()
        .success()
        .stdout(predicate::str::contains("StillMismatch"));
}
