//! Tolerant OpenAPI document loading (§4.4.1): malformed-boolean coercion,
//! 3.0/3.1 sniffing, and YAML/JSON fallback in either direction.

use openapiv3::OpenAPI;
use regex::Regex;

use crate::error::Error;

const BOOLEAN_PROPERTIES: &[&str] = &[
    "deprecated",
    "required",
    "readOnly",
    "writeOnly",
    "nullable",
    "uniqueItems",
    "allowEmptyValue",
    "explode",
    "allowReserved",
    "exclusiveMinimum",
    "exclusiveMaximum",
];

/// Coerces numeric `0`/`1` booleans on known boolean fields to `false`/`true`,
/// for both YAML and JSON content. Multi-digit numbers on the same field
/// names (`minimum: 10`) are left untouched.
fn preprocess_for_compatibility(content: &str) -> String {
    let is_json = content.trim_start().starts_with('{');
    if is_json {
        return fix_json_boolean_values(content.to_string());
    }

    let mut result = fix_yaml_boolean_values(content.to_string());
    if result.contains('"') {
        result = fix_json_boolean_values(result);
    }
    result
}

fn fix_yaml_boolean_values(mut content: String) -> String {
    for property in BOOLEAN_PROPERTIES {
        let pattern_0 =
            Regex::new(&format!(r"\b{property}: 0\b")).expect("hardcoded pattern is valid");
        let pattern_1 =
            Regex::new(&format!(r"\b{property}: 1\b")).expect("hardcoded pattern is valid");
        content = pattern_0.replace_all(&content, format!("{property}: false")).to_string();
        content = pattern_1.replace_all(&content, format!("{property}: true")).to_string();
    }
    content
}

fn fix_json_boolean_values(mut content: String) -> String {
    for property in BOOLEAN_PROPERTIES {
        let pattern_0 =
            Regex::new(&format!(r#""{property}"\s*:\s*0\b"#)).expect("hardcoded pattern is valid");
        let pattern_1 =
            Regex::new(&format!(r#""{property}"\s*:\s*1\b"#)).expect("hardcoded pattern is valid");
        content = pattern_0.replace_all(&content, format!(r#""{property}":false"#)).to_string();
        content = pattern_1.replace_all(&content, format!(r#""{property}":true"#)).to_string();
    }
    content
}

fn looks_like_openapi_31(content: &str) -> bool {
    content.contains("openapi: 3.1")
        || content.contains("openapi: \"3.1")
        || content.contains("openapi: '3.1")
        || content.contains(r#""openapi":"3.1"#)
        || content.contains(r#""openapi": "3.1"#)
}

/// Parses an OpenAPI document, tolerating common malformations and
/// transparently handling 3.1 documents via a compatibility downgrade.
///
/// # Errors
///
/// Returns a specification error if the content is not valid YAML/JSON or
/// not a recognizable OpenAPI document.
pub fn parse_openapi(content: &str) -> Result<OpenAPI, Error> {
    let preprocessed = preprocess_for_compatibility(content);

    if looks_like_openapi_31(content) {
        match parse_as_openapi_31(&preprocessed) {
            Ok(spec) => return Ok(spec),
            #[cfg(not(feature = "openapi31"))]
            Err(e) => return Err(e),
            #[cfg(feature = "openapi31")]
            Err(_) => {}
        }
    }

    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        parse_json_with_fallback(&preprocessed)
    } else {
        parse_yaml_with_fallback(&preprocessed)
    }
}

fn parse_json_with_fallback(content: &str) -> Result<OpenAPI, Error> {
    match serde_json::from_str::<OpenAPI>(content) {
        Ok(spec) => Ok(spec),
        Err(json_err) => serde_yaml::from_str::<OpenAPI>(content)
            .map_err(|_| Error::invalid_spec(format!("failed to parse spec as JSON: {json_err}"))),
    }
}

fn parse_yaml_with_fallback(content: &str) -> Result<OpenAPI, Error> {
    match serde_yaml::from_str::<OpenAPI>(content) {
        Ok(spec) => Ok(spec),
        Err(yaml_err) => {
            serde_json::from_str::<OpenAPI>(content).map_err(|_| Error::Yaml(yaml_err))
        }
    }
}

#[cfg(feature = "openapi31")]
fn parse_as_openapi_31(preprocessed: &str) -> Result<OpenAPI, Error> {
    let oas3_spec = match oas3::from_yaml(preprocessed) {
        Ok(spec) => spec,
        Err(_) => oas3::from_json(preprocessed)
            .map_err(|e| Error::invalid_spec(format!("failed to parse 3.1 spec as YAML or JSON: {e}")))?,
    };

    let json = oas3::to_json(&oas3_spec)
        .map_err(|e| Error::invalid_spec(format!("failed to downgrade 3.1 spec: {e}")))?;

    serde_json::from_str::<OpenAPI>(&json).map_err(|e| {
        Error::invalid_spec(format!(
            "OpenAPI 3.1 spec uses features incompatible with the 3.0 compatibility path: {e}"
        ))
    })
}

#[cfg(not(feature = "openapi31"))]
fn parse_as_openapi_31(_preprocessed: &str) -> Result<OpenAPI, Error> {
    Err(Error::invalid_spec(
        "OpenAPI 3.1 support is not enabled; rebuild with --features openapi31",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_openapi_30() {
        let spec = parse_openapi("openapi: 3.0.0\ninfo:\n  title: t\n  version: '1.0'\npaths: {}\n").unwrap();
        assert_eq!(spec.openapi, "3.0.0");
    }

    #[test]
    fn rejects_invalid_yaml() {
        assert!(parse_openapi("not: valid: yaml: at: all:").is_err());
    }

    #[test]
    fn coerces_numeric_booleans_in_yaml() {
        let out = preprocess_for_compatibility("deprecated: 0\nrequired: 1\n");
        assert!(out.contains("deprecated: false"));
        assert!(out.contains("required: true"));
    }

    #[test]
    fn preserves_multi_digit_numbers_on_same_field_names() {
        let out = preprocess_for_compatibility("minimum: 10\nmaximum: 100\nexclusiveMinimum: 18\n");
        assert!(out.contains("minimum: 10"));
        assert!(out.contains("maximum: 100"));
        assert!(out.contains("exclusiveMinimum: 18"));
    }

    #[test]
    fn coerces_numeric_booleans_in_json() {
        let out = preprocess_for_compatibility(r#"{"deprecated":0,"required":1,"other":10}"#);
        assert!(out.contains(r#""deprecated":false"#));
        assert!(out.contains(r#""required":true"#));
        assert!(out.contains(r#""other":10"#));
    }
}
