//! Response-body validation against the OpenAPI schema declared for an
//! `(operation, status)` pair (§4.5).
//!
//! Schemas are walked as raw JSON rather than through `openapiv3`'s typed
//! `Schema`, the same dynamic-navigation approach used for link parsing in
//! [`crate::spec`]: `$ref`, `allOf`/`anyOf`/`oneOf`, and
//! `additionalProperties` are all just JSON keys, and walking them
//! generically avoids re-deriving a second typed schema model on top of
//! `openapiv3`'s.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::Error;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchemaValidationResult {
    pub valid: bool,
    pub violations: Vec<String>,
    pub extra_fields: Vec<String>,
}

/// Looks up the response schema for `status` on `operation`, trying the
/// exact code, then its wildcard class (`2XX`, `3XX`, …), then `default`.
/// Status keys are matched case-insensitively.
#[must_use]
pub fn find_response_schema<'a>(operation: &'a Value, status: u16) -> Option<&'a Value> {
    let responses = operation.get("responses")?.as_object()?;
    let exact = status.to_string();
    let class = format!("{}XX", status / 100);

    for (key, response) in responses {
        let upper = key.to_uppercase();
        if upper == exact || upper == class {
            return response.get("content")?.get("application/json")?.get("schema");
        }
    }
    responses
        .get("default")?
        .get("content")?
        .get("application/json")?
        .get("schema")
}

/// Resolves a single `$ref` against `root`, honoring only the
/// `#/components/schemas/NAME` form used by OpenAPI documents.
fn resolve_ref<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
        return schema;
    };
    let Some(name) = reference.strip_prefix("#/components/schemas/") else {
        return schema;
    };
    root.get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(|s| s.get(name))
        .unwrap_or(schema)
}

/// Resolves `$ref` repeatedly, stopping at a cycle and returning the
/// innermost unresolved form rather than looping forever.
fn resolve_ref_chain<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    let mut seen = BTreeSet::new();
    let mut current = schema;
    while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
        if !seen.insert(reference.to_string()) {
            return current;
        }
        let resolved = resolve_ref(root, current);
        if std::ptr::eq(resolved, current) {
            return current;
        }
        current = resolved;
    }
    current
}

/// Flattens `allOf`/`anyOf`/`oneOf` into the set of property names defined
/// anywhere in the composition, for extra-field detection. `anyOf`/`oneOf`
/// branches each contribute their own properties (a field valid under any
/// branch is not "extra").
fn collect_defined_fields(root: &Value, schema: &Value, out: &mut BTreeSet<String>, additional_properties: &mut Option<bool>) {
    let schema = resolve_ref_chain(root, schema);

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        out.extend(props.keys().cloned());
    }
    if let Some(ap) = schema.get("additionalProperties") {
        if let Some(b) = ap.as_bool() {
            // `false` anywhere in the composition tightens the result; once
            // set, a later `true` does not loosen it again.
            if !b || additional_properties.is_none() {
                *additional_properties = Some(b);
            }
        }
    }
    for keyword in ["allOf", "anyOf", "oneOf"] {
        if let Some(branches) = schema.get(keyword).and_then(Value::as_array) {
            for branch in branches {
                collect_defined_fields(root, branch, out, additional_properties);
            }
        }
    }
}

/// Validates `body` against `schema` (a JSON Schema subset as used by
/// OpenAPI: `type`, `required`, `properties`, `additionalProperties`,
/// `allOf`/`anyOf`/`oneOf`, `$ref`).
///
/// # Errors
///
/// Returns an error only if `schema` is not a JSON object (a malformed
/// document, not a body-shape mismatch).
pub fn validate(root: &Value, schema: &Value, body: &Value) -> Result<SchemaValidationResult, Error> {
    if !schema.is_object() {
        return Err(Error::invalid_spec("response schema is not a JSON object"));
    }

    let mut violations = Vec::new();
    let mut extra_fields = Vec::new();
    validate_value(root, schema, body, "$", &mut violations, &mut extra_fields);

    Ok(SchemaValidationResult {
        valid: violations.is_empty() && extra_fields.is_empty(),
        violations,
        extra_fields,
    })
}

fn validate_value(root: &Value, schema: &Value, value: &Value, path: &str, violations: &mut Vec<String>, extra_fields: &mut Vec<String>) {
    let schema = resolve_ref_chain(root, schema);

    if let Some(expected_type) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected_type, value) {
            violations.push(format!("{path}: expected type '{expected_type}', got '{}'", json_type_name(value)));
            return;
        }
    }

    if value.is_object() {
        validate_object(root, schema, value, path, violations, extra_fields);
    } else if let (Some(items_schema), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            validate_value(root, items_schema, item, &format!("{path}[{i}]"), violations, extra_fields);
        }
    }
}

fn validate_object(root: &Value, schema: &Value, value: &Value, path: &str, violations: &mut Vec<String>, extra_fields: &mut Vec<String>) {
    let Some(object) = value.as_object() else { return };

    let mut defined = BTreeSet::new();
    let mut additional_properties = None;
    collect_defined_fields(root, schema, &mut defined, &mut additional_properties);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                violations.push(format!("{path}: missing required field '{field}'"));
            }
        }
    }

    if additional_properties == Some(false) {
        for key in object.keys() {
            if !defined.contains(key) {
                extra_fields.push(format!("{path}.{key}"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, field_schema) in properties {
            if let Some(field_value) = object.get(field) {
                validate_value(root, field_schema, field_value, &format!("{path}.{field}"), violations, extra_fields);
            }
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
