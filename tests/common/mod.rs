//! Shared test utilities: a cached path to the `parity-fuzz` binary and a
//! couple of small fixture builders reused across the CLI test files.

use std::sync::OnceLock;

static BIN_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn parity_fuzz_cmd() -> assert_cmd::Command {
    let path = BIN_PATH.get_or_init(|| assert_cmd::cargo::cargo_bin("parity-fuzz"));
    assert_cmd::Command::new(path)
}

pub const LINKED_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: orders
  version: '1.0'
paths:
  /orders:
    post:
      operationId: create-order
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name:
                  type: string
      responses:
        '201':
          description: created
          links:
            GetOrder:
              operationId: get-order
              parameters:
                id: $response.body#/id
  /orders/{id}:
    get:
      operationId: get-order
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
      responses:
        '200':
          description: ok
"#;

pub const SINGLE_OP_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: widgets
  version: '1.0'
paths:
  /widgets/{id}:
    get:
      operationId: get-widget
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
      responses:
        '200':
          description: ok
"#;

pub fn write_rule_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("rules.json");
    std::fs::write(&path, r#"{"version": "1", "default_rules": {}}"#).unwrap();
    path
}

pub fn write_config(dir: &std::path::Path, target_a_url: &str, target_b_url: &str, rules_path: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    let contents = format!(
        "targets:\n  a:\n    base_url: \"{target_a_url}\"\n  b:\n    base_url: \"{target_b_url}\"\ncomparison_rules: \"{}\"\n",
        rules_path.display()
    );
    std::fs::write(&path, contents).unwrap();
    path
}
