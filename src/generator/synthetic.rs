//! Schema-aware synthetic value generation (§4.4.1), used both for
//! positive-mode request bodies/parameters and for the values the chain
//! discovery state machine fabricates for an upstream response so a
//! downstream link's parameter constraint is satisfiable.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use uuid::Uuid;

/// Resolves `$ref` repeatedly against `root`, stopping at a cycle and
/// returning the innermost unresolved form rather than looping.
fn resolve_ref_chain<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    let mut seen = BTreeSet::new();
    let mut current = schema;
    loop {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return current;
        };
        if !seen.insert(reference.to_string()) {
            return current;
        }
        let Some(name) = reference.strip_prefix("#/components/schemas/") else {
            return current;
        };
        let Some(resolved) = root.get("components").and_then(|c| c.get("schemas")).and_then(|s| s.get(name)) else {
            return current;
        };
        current = resolved;
    }
}

/// Produces a value satisfying `schema`, following the priority order:
/// `enum` → `const` → `format` placeholder → type default → UUID fallback.
#[must_use]
pub fn synthesize(root: &Value, schema: &Value) -> Value {
    let schema = resolve_ref_chain(root, schema);

    if let Some(enum_values) = schema.get("enum").and_then(Value::as_array) {
        if let Some(first) = enum_values.first() {
            return first.clone();
        }
    }
    if let Some(const_value) = schema.get("const") {
        return const_value.clone();
    }
    if let Some(format) = schema.get("format").and_then(Value::as_str) {
        if let Some(placeholder) = format_placeholder(format) {
            return placeholder;
        }
    }
    if let Some(type_name) = schema.get("type").and_then(Value::as_str) {
        return type_default(root, schema, type_name);
    }
    // Tuple validation (a list of sub-schemas) or an untyped schema: fall
    // back to the UUID placeholder rather than guessing a shape.
    json!(Uuid::new_v4().to_string())
}

fn format_placeholder(format: &str) -> Option<Value> {
    match format {
        "uuid" => Some(json!(Uuid::new_v4().to_string())),
        "date-time" => Some(json!("2024-01-01T00:00:00Z")),
        "date" => Some(json!("2024-01-01")),
        "uri" | "url" => Some(json!("https://example.com/resource")),
        "email" => Some(json!("user@example.com")),
        _ => None,
    }
}

fn type_default(root: &Value, schema: &Value, type_name: &str) -> Value {
    match type_name {
        "integer" => schema
            .get("minimum")
            .and_then(Value::as_i64)
            .map_or(json!(1), |min| json!(min.max(1))),
        "number" => json!(1.0),
        "boolean" => json!(true),
        "string" => json!(Uuid::new_v4().to_string()),
        "array" => {
            let item_schema = schema.get("items").cloned().unwrap_or(json!({}));
            json!([synthesize(root, &item_schema)])
        }
        "object" => synthesize_object(root, schema),
        "null" => Value::Null,
        _ => json!(Uuid::new_v4().to_string()),
    }
}

fn synthesize_object(root: &Value, schema: &Value) -> Value {
    let mut object = serde_json::Map::new();
    let properties = schema.get("properties").and_then(Value::as_object);
    let required: BTreeSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    if let Some(properties) = properties {
        for (name, prop_schema) in properties {
            if required.contains(name.as_str()) {
                object.insert(name.clone(), synthesize(root, prop_schema));
            }
        }
    }
    Value::Object(object)
}
