//! On-disk rule file format (§4.14, §6): `{version, default_rules,
//! operation_rules}`, loaded once at startup and expanded into a
//! [`RuleLibrary`].

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::Error;

use super::{RuleLibrary, RuleSpec, RuleSpecSet};

/// A rule as written in the file: either a direct spec, or a
/// `{binary_rule: RULE}` wrapper. The wrapper is unwrapped to its inner rule
/// — this crate's comparator only ever evaluates structured JSON bodies, so
/// a rule meant for a binary-bodied operation behaves identically to one
/// meant for a JSON-bodied one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawRule {
    Wrapped { binary_rule: Box<RawRule> },
    Direct(RuleSpec),
}

impl From<RawRule> for RuleSpec {
    fn from(raw: RawRule) -> Self {
        match raw {
            RawRule::Wrapped { binary_rule } => Self::from(*binary_rule),
            RawRule::Direct(spec) => spec,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawBody {
    #[serde(default)]
    field_rules: IndexMap<String, RawRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawRuleSet {
    status_code: Option<RawRule>,
    #[serde(default)]
    headers: IndexMap<String, RawRule>,
    #[serde(default)]
    body: RawBody,
}

impl From<RawRuleSet> for RuleSpecSet {
    fn from(raw: RawRuleSet) -> Self {
        Self {
            status_code: raw.status_code.map(RuleSpec::from),
            headers: raw.headers.into_iter().map(|(k, v)| (k, RuleSpec::from(v))).collect(),
            field_rules: raw.body.field_rules.into_iter().map(|(k, v)| (k, RuleSpec::from(v))).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    version: String,
    #[serde(default)]
    default_rules: RawRuleSet,
    #[serde(default)]
    operation_rules: IndexMap<String, RawRuleSet>,
}

/// Reads and expands a rule file into a ready-to-use [`RuleLibrary`].
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read, is not valid
/// JSON, declares an unsupported `version`, or expands a predefined rule
/// with an unknown name or a missing parameter.
pub fn load_rule_library(path: &Path) -> Result<RuleLibrary, Error> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::invalid_config(format!("failed to read rule file '{}': {e}", path.display())))?;
    let file: RuleFile = serde_json::from_str(&raw)?;
    if file.version != "1" {
        return Err(Error::invalid_config(format!(
            "unsupported rule file version '{}' in '{}'",
            file.version,
            path.display()
        )));
    }
    RuleLibrary::build(file.default_rules.into(), file.operation_rules.into_iter().map(|(k, v)| (k, v.into())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_and_operation_rules_with_binary_wrapper_unwrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{
  "version": "1",
  "default_rules": {
    "status_code": {"expr": "a == b"},
    "body": {
      "field_rules": {
        "$.id": {"binary_rule": {"predefined": "exact_match"}}
      }
    }
  },
  "operation_rules": {
    "get-user": {
      "headers": {
        "x-trace-id": {"expr": "true", "presence": "optional"}
      }
    }
  }
}"#,
        )
        .unwrap();

        let library = load_rule_library(&path).unwrap();
        assert!(library.default.status_code.is_some());
        assert_eq!(library.default.field_rules.get("$.id").unwrap().expr, "a == b");
        let overridden = library.for_operation("get-user");
        assert!(overridden.headers.contains_key("x-trace-id"));
    }

    #[test]
    fn rejects_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"version": "2", "default_rules": {}}"#).unwrap();
        let err = load_rule_library(&path).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::Configuration));
    }
}
