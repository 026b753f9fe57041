//! Rule library: presence modes, the per-operation rule set shape, and
//! predefined-template expansion to raw expressions (§3, §4.2).

pub mod file;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// When a rule's field is compared, given its presence on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Both present or both absent; compare only when both present.
    #[default]
    Parity,
    /// Both sides must carry the field; its absence on either is a mismatch.
    Required,
    /// Neither side may carry the field; its presence on either is a mismatch.
    Forbidden,
    /// Compare only if both sides happen to have it; otherwise silently skip.
    Optional,
}

/// A rule as written by a user: either a named predefined template with
/// parameters, or a raw expression string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Predefined {
        predefined: String,
        #[serde(flatten)]
        params: BTreeMap<String, Value>,
        #[serde(default)]
        presence: Presence,
    },
    Expression {
        expr: String,
        #[serde(default)]
        presence: Presence,
    },
}

/// A rule after predefined-template expansion: the runtime only ever sees
/// this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub expr: String,
    pub presence: Presence,
}

/// Per-operation-id (or default) rule configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSpecSet {
    pub status_code: Option<RuleSpec>,
    #[serde(default)]
    pub headers: IndexMap<String, RuleSpec>,
    #[serde(default)]
    pub field_rules: IndexMap<String, RuleSpec>,
}

/// Expanded rule set, ready for the comparator to evaluate directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub status_code: Option<Rule>,
    #[serde(default)]
    pub headers: IndexMap<String, Rule>,
    #[serde(default)]
    pub field_rules: IndexMap<String, Rule>,
}

/// The full comparison configuration: a default rule set plus per-operation
/// overrides. Per §3's invariant, an operation's block fully replaces the
/// default block it overrides — no deep merge of nested maps.
#[derive(Debug, Clone, Default)]
pub struct RuleLibrary {
    pub default: RuleSet,
    pub by_operation: IndexMap<String, RuleSet>,
}

impl RuleLibrary {
    /// Builds an expanded library from raw specs, resolving every
    /// predefined template along the way.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on an unknown predefined name or a
    /// missing required parameter.
    pub fn build(
        default: RuleSpecSet,
        by_operation: IndexMap<String, RuleSpecSet>,
    ) -> Result<Self, Error> {
        let default = expand_rule_set(default)?;
        let by_operation = by_operation
            .into_iter()
            .map(|(op, spec)| Ok((op, expand_rule_set(spec)?)))
            .collect::<Result<IndexMap<_, _>, Error>>()?;
        Ok(Self { default, by_operation })
    }

    /// Resolves the effective rule set for `operation_id`: the operation's
    /// override if present, else the default.
    #[must_use]
    pub fn for_operation(&self, operation_id: &str) -> &RuleSet {
        self.by_operation.get(operation_id).unwrap_or(&self.default)
    }
}

fn expand_rule_set(spec: RuleSpecSet) -> Result<RuleSet, Error> {
    let status_code = spec.status_code.map(expand_rule).transpose()?;
    let headers = spec
        .headers
        .into_iter()
        .map(|(k, v)| Ok((k, expand_rule(v)?)))
        .collect::<Result<IndexMap<_, _>, Error>>()?;
    let field_rules = spec
        .field_rules
        .into_iter()
        .map(|(k, v)| Ok((k, expand_rule(v)?)))
        .collect::<Result<IndexMap<_, _>, Error>>()?;
    Ok(RuleSet {
        status_code,
        headers,
        field_rules,
    })
}

fn expand_rule(spec: RuleSpec) -> Result<Rule, Error> {
    match spec {
        RuleSpec::Expression { expr, presence } => Ok(Rule { expr, presence }),
        RuleSpec::Predefined {
            predefined,
            params,
            presence,
        } => {
            let expr = expand_predefined(&predefined, &params)?;
            Ok(Rule { expr, presence })
        }
    }
}

fn param<'a>(params: &'a BTreeMap<String, Value>, predefined: &str, name: &str) -> Result<&'a Value, Error> {
    params
        .get(name)
        .ok_or_else(|| Error::missing_rule_parameter(predefined, name))
}

fn param_literal(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => json_quote(s),
        other => other.to_string(),
    }
}

fn json_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Expands a named predefined template into its raw expression form.
///
/// # Errors
///
/// Returns an error for an unknown template name or a missing required
/// parameter.
pub fn expand_predefined(name: &str, params: &BTreeMap<String, Value>) -> Result<String, Error> {
    match name {
        "exact_match" => Ok("a == b".to_string()),
        "ignore" => Ok("true".to_string()),
        "numeric_tolerance" => {
            let tol = param_literal(param(params, name, "tolerance")?);
            Ok(format!("abs(a - b) <= {tol}"))
        }
        "epoch_seconds_tolerance" => {
            let tol = param_literal(param(params, name, "amount")?);
            Ok(format!("abs(a - b) <= {tol}"))
        }
        "epoch_millis_tolerance" => {
            let tol = param_literal(param(params, name, "amount")?);
            Ok(format!("abs(a - b) <= {tol}"))
        }
        "uuid_format" => Ok("isUuid(a) && isUuid(b)".to_string()),
        "iso_timestamp_format" => Ok("isIsoTimestamp(a) && isIsoTimestamp(b)".to_string()),
        "iso_date_format" => Ok("isIsoDate(a) && isIsoDate(b)".to_string()),
        "url_format" => Ok("isUrl(a) && isUrl(b)".to_string()),
        "both_positive" => Ok("a > 0 && b > 0".to_string()),
        "both_non_negative" => Ok("a >= 0 && b >= 0".to_string()),
        "both_in_range" => {
            let min = param_literal(param(params, name, "min")?);
            let max = param_literal(param(params, name, "max")?);
            Ok(format!("a >= {min} && a <= {max} && b >= {min} && b <= {max}"))
        }
        "string_prefix" => {
            let prefix = param_literal(param(params, name, "prefix")?);
            Ok(format!("startsWith(a, {prefix}) && startsWith(b, {prefix})"))
        }
        "string_suffix" => {
            let suffix = param_literal(param(params, name, "suffix")?);
            Ok(format!("endsWith(a, {suffix}) && endsWith(b, {suffix})"))
        }
        "string_contains" => {
            let needle = param_literal(param(params, name, "needle")?);
            Ok(format!("contains(a, {needle}) && contains(b, {needle})"))
        }
        "string_length_match" => Ok("size(a) == size(b)".to_string()),
        "string_nonempty" => Ok("size(a) > 0 && size(b) > 0".to_string()),
        "unordered_array" => Ok("sameElements(a, b)".to_string()),
        "array_length" => Ok("size(a) == size(b)".to_string()),
        "array_length_tolerance" => {
            let tol = param_literal(param(params, name, "tolerance")?);
            Ok(format!("abs(size(a) - size(b)) <= {tol}"))
        }
        "same_keys" => Ok("sameKeys(a, b)".to_string()),
        "type_match" => Ok("type(a) == type(b)".to_string()),
        "both_null" => Ok("a == null && b == null".to_string()),
        "same_nullity" => Ok("(a == null) == (b == null)".to_string()),
        "binary_exact_match" => Ok("a == b".to_string()),
        "binary_length_match" => Ok("size(a) == size(b)".to_string()),
        other => Err(Error::unknown_predefined(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn numeric_tolerance_substitutes_literal() {
        let expr = expand_predefined("numeric_tolerance", &params(&[("tolerance", json!(0.5))])).unwrap();
        assert_eq!(expr, "abs(a - b) <= 0.5");
    }

    #[test]
    fn string_prefix_quotes_string_parameter() {
        let expr = expand_predefined("string_prefix", &params(&[("prefix", json!("usr_"))])).unwrap();
        assert_eq!(expr, "startsWith(a, \"usr_\") && startsWith(b, \"usr_\")");
    }

    #[test]
    fn quoting_escapes_embedded_quotes_and_backslashes() {
        let expr = expand_predefined("string_contains", &params(&[("needle", json!("a\"b\\c"))])).unwrap();
        assert!(expr.contains("\\\"b\\\\c"));
    }

    #[test]
    fn unknown_predefined_is_a_configuration_error() {
        let err = expand_predefined("not_real", &BTreeMap::new()).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::Configuration));
    }

    #[test]
    fn missing_required_parameter_is_an_error() {
        let err = expand_predefined("numeric_tolerance", &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn operation_override_fully_replaces_default_block_no_merge() {
        let mut by_operation = IndexMap::new();
        let mut headers = IndexMap::new();
        headers.insert(
            "x-trace-id".to_string(),
            RuleSpec::Expression {
                expr: "true".to_string(),
                presence: Presence::Optional,
            },
        );
        by_operation.insert(
            "get-user".to_string(),
            RuleSpecSet {
                status_code: None,
                headers,
                field_rules: IndexMap::new(),
            },
        );
        let mut default_headers = IndexMap::new();
        default_headers.insert(
            "x-request-id".to_string(),
            RuleSpec::Expression {
                expr: "true".to_string(),
                presence: Presence::Parity,
            },
        );
        let default = RuleSpecSet {
            status_code: None,
            headers: default_headers,
            field_rules: IndexMap::new(),
        };
        let library = RuleLibrary::build(default, by_operation).unwrap();
        let resolved = library.for_operation("get-user");
        assert!(!resolved.headers.contains_key("x-request-id"));
        assert!(resolved.headers.contains_key("x-trace-id"));
    }
}
