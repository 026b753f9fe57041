//! Case Generator (§4.4): enumerates operations, produces schema-valid
//! single-request cases, and discovers chain templates from explicit links.

pub mod chain;
pub mod synthetic;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{Body, RequestCase};
use crate::spec::{OperationInfo, SpecDocument};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub max_cases: usize,
    pub exclude: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_cases: usize::MAX,
            exclude: Vec::new(),
        }
    }
}

/// Indexes the raw `paths.<path>.<method>` operation objects by operation
/// id, so parameter/request-body schemas can be read without depending on
/// `openapiv3`'s typed model.
#[must_use]
pub fn raw_operation_index(doc: &SpecDocument) -> BTreeMap<String, &Value> {
    let mut index = BTreeMap::new();
    let Some(paths) = doc.raw().get("paths").and_then(Value::as_object) else {
        return index;
    };
    for path_item in paths.values() {
        let Some(path_obj) = path_item.as_object() else { continue };
        for method in ["get", "post", "put", "patch", "delete", "head", "options"] {
            let Some(op) = path_obj.get(method) else { continue };
            if let Some(operation_id) = op.get("operationId").and_then(Value::as_str) {
                index.insert(operation_id.to_string(), op);
            }
        }
    }
    index
}

/// True if any of the operation's declared parameters is a required path
/// parameter — such an operation can never be a chain "free entry" point.
#[must_use]
pub fn operation_requires_path_params(raw_operation: &Value) -> bool {
    let Some(params) = raw_operation.get("parameters").and_then(Value::as_array) else {
        return false;
    };
    params.iter().any(|p| {
        p.get("in").and_then(Value::as_str) == Some("path") && p.get("required").and_then(Value::as_bool).unwrap_or(false)
    })
}

/// Builds a positive-mode request for `op`, filling every path parameter
/// (required for a valid rendered path) and every required query/header
/// parameter and request body, via schema-aware synthesis.
#[must_use]
pub fn synthesize_request(op: &OperationInfo, raw_operation: Option<&Value>) -> RequestCase {
    let mut request = RequestCase::new(op.operation_id.clone(), op.method, op.path.clone());

    let Some(raw) = raw_operation else {
        return request;
    };
    let root = Value::Null;

    if let Some(params) = raw.get("parameters").and_then(Value::as_array) {
        for param in params {
            let Some(name) = param.get("name").and_then(Value::as_str) else { continue };
            let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
            let required = param.get("required").and_then(Value::as_bool).unwrap_or(false);
            if location != "path" && !required {
                continue;
            }
            let schema = param.get("schema").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
            let value = synthetic::synthesize(&root, &schema);
            let rendered = value_to_param_string(&value);
            match location {
                "path" => request.set_path_param(name, rendered),
                "header" => request.add_header(name, rendered),
                _ => request.add_query_param(name, rendered),
            }
        }
    }

    if let Some(body_schema) = request_body_schema(raw) {
        let value = synthetic::synthesize(&root, body_schema);
        request.body = Some(Body::Structured(value));
        request.media_type = Some("application/json".to_string());
    }

    request
}

fn request_body_schema(raw_operation: &Value) -> Option<&Value> {
    raw_operation
        .get("requestBody")?
        .get("content")?
        .get("application/json")?
        .get("schema")
}

fn value_to_param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Produces one positive-mode case per non-excluded operation, capped at
/// `config.max_cases`.
#[must_use]
pub fn generate_single_cases(doc: &SpecDocument, config: &GeneratorConfig) -> Vec<RequestCase> {
    let raw_index = raw_operation_index(doc);
    doc.enumerate_operations()
        .into_iter()
        .filter(|op| !config.exclude.contains(&op.operation_id))
        .take(config.max_cases)
        .map(|op| {
            let raw = raw_index.get(&op.operation_id).copied();
            synthesize_request(&op, raw)
        })
        .collect()
}

/// Operations not involved in any explicit link — not reachable by chain
/// discovery and needing a dedicated single-request case for coverage.
#[must_use]
pub fn orphan_operations(doc: &SpecDocument) -> Vec<OperationInfo> {
    doc.enumerate_operations()
        .into_iter()
        .filter(|op| chain::is_chain_orphan(doc, &op.operation_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
openapi: 3.0.0
info:
  title: t
  version: '1.0'
paths:
  /users/{id}:
    get:
      operationId: get-user
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
            format: uuid
        - name: verbose
          in: query
          required: false
          schema:
            type: boolean
      responses:
        '200':
          description: ok
  /users:
    post:
      operationId: create-user
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
"#;

    #[test]
    fn single_case_binds_required_path_parameter() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let cases = generate_single_cases(&doc, &GeneratorConfig::default());
        let get_user = cases.iter().find(|c| c.operation_id == "get-user").unwrap();
        assert!(get_user.validate_bound().is_ok());
        assert!(!get_user.rendered_path.contains('{'));
    }

    #[test]
    fn single_case_omits_optional_query_parameter() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let cases = generate_single_cases(&doc, &GeneratorConfig::default());
        let get_user = cases.iter().find(|c| c.operation_id == "get-user").unwrap();
        assert!(!get_user.query_params.contains_key("verbose"));
    }

    #[test]
    fn single_case_fills_request_body_from_schema() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let cases = generate_single_cases(&doc, &GeneratorConfig::default());
        let create_user = cases.iter().find(|c| c.operation_id == "create-user").unwrap();
        match &create_user.body {
            Some(Body::Structured(value)) => assert!(value.get("name").is_some()),
            other => panic!("expected a structured body, got {other:?}"),
        }
    }

    #[test]
    fn exclude_list_filters_out_operations() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let config = GeneratorConfig {
            max_cases: usize::MAX,
            exclude: vec!["get-user".to_string()],
        };
        let cases = generate_single_cases(&doc, &config);
        assert!(!cases.iter().any(|c| c.operation_id == "get-user"));
    }

    #[test]
    fn max_cases_caps_output() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let config = GeneratorConfig {
            max_cases: 1,
            exclude: Vec::new(),
        };
        let cases = generate_single_cases(&doc, &config);
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn both_operations_are_orphans_with_no_links() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        assert_eq!(orphan_operations(&doc).len(), 2);
    }
}
