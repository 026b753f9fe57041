//! OpenAPI document loading, operation enumeration, and explicit-link
//! extraction (§4.4).
//!
//! Link expressions are read from a raw JSON view of the document rather
//! than a strongly-typed `Link` struct: their parameter values are
//! arbitrary runtime expressions (`$response.body#/id`,
//! `$response.header.Location`), so there is no fixed schema to model —
//! the same "accept any JSON-pointer or header name without prior
//! declaration" requirement the Case Generator has for consuming them.

pub mod linter;
pub mod parser;

use std::collections::BTreeMap;
use std::path::Path;

use openapiv3::OpenAPI;
use serde_json::Value;

use crate::error::Error;
use crate::model::Method;

/// One operation declared by the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub operation_id: String,
    pub method: Method,
    pub path: String,
}

/// A parsed explicit OpenAPI `link`: which upstream operation/status it
/// hangs off, which downstream operation it targets, and the expression
/// bound to each downstream parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub source_operation_id: String,
    pub source_status: String,
    pub link_name: String,
    pub target_operation_id: String,
    pub parameters: BTreeMap<String, String>,
    pub request_body: Option<String>,
}

/// A loaded document: the strongly-typed form for operation enumeration,
/// plus a raw JSON view for dynamic link parsing.
pub struct SpecDocument {
    pub openapi: OpenAPI,
    raw: Value,
}

impl SpecDocument {
    /// Reads and parses an OpenAPI document from disk.
    ///
    /// # Errors
    ///
    /// Returns a specification error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_spec(format!("failed to read spec '{}': {e}", path.display())))?;
        Self::from_str(&content)
    }

    /// Parses an OpenAPI document already read into memory.
    ///
    /// # Errors
    ///
    /// Returns a specification error if the content cannot be parsed.
    pub fn from_str(content: &str) -> Result<Self, Error> {
        let openapi = parser::parse_openapi(content)?;
        let raw = parse_content_as_value(content)
            .ok_or_else(|| Error::invalid_spec("spec content is neither valid YAML nor JSON"))?;
        Ok(Self { openapi, raw })
    }

    /// The raw JSON view of the document, for components that navigate
    /// schemas dynamically (the Case Generator, Schema Validator).
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Every operation id, its method, and its path template.
    #[must_use]
    pub fn enumerate_operations(&self) -> Vec<OperationInfo> {
        let mut operations = Vec::new();
        for (path, path_item) in &self.openapi.paths.paths {
            let Some(item) = path_item.as_item() else { continue };
            for (method, op) in [
                (Method::Get, &item.get),
                (Method::Post, &item.post),
                (Method::Put, &item.put),
                (Method::Patch, &item.patch),
                (Method::Delete, &item.delete),
                (Method::Head, &item.head),
                (Method::Options, &item.options),
            ] {
                let Some(operation) = op else { continue };
                let Some(operation_id) = &operation.operation_id else { continue };
                operations.push(OperationInfo {
                    operation_id: operation_id.clone(),
                    method,
                    path: path.clone(),
                });
            }
        }
        operations
    }

    /// Parses every explicit `links` entry under every response of every
    /// operation.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        let mut links = Vec::new();
        let Some(paths) = self.raw.get("paths").and_then(Value::as_object) else {
            return links;
        };
        for path_item in paths.values() {
            let Some(path_obj) = path_item.as_object() else { continue };
            for method in ["get", "post", "put", "patch", "delete", "head", "options"] {
                let Some(op) = path_obj.get(method) else { continue };
                let Some(source_operation_id) = op.get("operationId").and_then(Value::as_str) else { continue };
                let Some(responses) = op.get("responses").and_then(Value::as_object) else { continue };
                for (status, response) in responses {
                    let Some(link_entries) = response.get("links").and_then(Value::as_object) else { continue };
                    for (link_name, link_def) in link_entries {
                        if let Some(link) = parse_link(source_operation_id, status, link_name, link_def) {
                            links.push(link);
                        }
                    }
                }
            }
        }
        links
    }
}

fn parse_link(source_operation_id: &str, status: &str, link_name: &str, def: &Value) -> Option<Link> {
    let target_operation_id = def.get("operationId").and_then(Value::as_str)?.to_string();
    let parameters = def
        .get("parameters")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let request_body = def.get("requestBody").and_then(Value::as_str).map(str::to_string);
    Some(Link {
        source_operation_id: source_operation_id.to_string(),
        source_status: status.to_string(),
        link_name: link_name.to_string(),
        target_operation_id,
        parameters,
        request_body,
    })
}

fn parse_content_as_value(content: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return Some(value);
    }
    serde_yaml::from_str::<serde_yaml::Value>(content)
        .ok()
        .and_then(|v| serde_json::to_value(v).ok())
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
  /orders:
    post:
      operationId: create-order
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
      responses:
        '200':
          description: ok
"#;

    #[test]
    fn enumerates_operations_with_method_and_path() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let ops = doc.enumerate_operations();
        assert!(ops.iter().any(|o| o.operation_id == "create-order" && o.method == Method::Post));
        assert!(ops.iter().any(|o| o.operation_id == "get-order" && o.path == "/orders/{id}"));
    }

    #[test]
    fn extracts_explicit_link_with_parameter_expression() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let links = doc.links();
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.source_operation_id, "create-order");
        assert_eq!(link.target_operation_id, "get-order");
        assert_eq!(link.parameters.get("id").unwrap(), "$response.body#/id");
    }

    #[test]
    fn no_links_section_yields_empty_vec() {
        let doc = SpecDocument::from_str(
            "openapi: 3.0.0\ninfo:\n  title: t\n  version: '1.0'\npaths: {}\n",
        )
        .unwrap();
        assert!(doc.links().is_empty());
    }
}
