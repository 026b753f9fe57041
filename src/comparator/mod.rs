//! Rule-driven response comparison (§4.7): schema validation, then status
//! code, then headers, then body, short-circuiting at the first failing
//! phase.

use std::collections::BTreeMap;

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::Error;
use crate::evaluator::EvaluatorClient;
use crate::model::ResponseCase;
use crate::rules::{Presence, Rule, RuleLibrary, RuleSet};
use crate::schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchType {
    None,
    SchemaViolation,
    StatusCode,
    Headers,
    Body,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Difference {
    pub path: String,
    pub target_a_value: Value,
    pub target_b_value: Value,
    pub rule: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PhaseResult {
    pub checked: bool,
    pub matched: bool,
    pub differences: Vec<Difference>,
}

impl PhaseResult {
    fn skipped() -> Self {
        Self {
            checked: false,
            matched: true,
            differences: Vec::new(),
        }
    }

    fn passed() -> Self {
        Self {
            checked: true,
            matched: true,
            differences: Vec::new(),
        }
    }

    fn failed(differences: Vec<Difference>) -> Self {
        Self {
            checked: true,
            matched: differences.is_empty(),
            differences,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ComparisonResult {
    pub matched: bool,
    pub mismatch_type: MismatchType,
    pub summary: String,
    pub schema: PhaseResult,
    pub status_code: PhaseResult,
    pub headers: PhaseResult,
    pub body: PhaseResult,
}

impl ComparisonResult {
    fn ok(summary: impl Into<String>, schema: PhaseResult, status_code: PhaseResult, headers: PhaseResult, body: PhaseResult) -> Self {
        Self {
            matched: true,
            mismatch_type: MismatchType::None,
            summary: summary.into(),
            schema,
            status_code,
            headers,
            body,
        }
    }
}

enum PresenceOutcome {
    Compare,
    Skip,
    Mismatch(&'static str),
}

enum EvalOutcome {
    Matched(bool),
    ExprError(String),
}

fn apply_presence(presence: Presence, present_a: bool, present_b: bool) -> PresenceOutcome {
    match (presence, present_a, present_b) {
        (Presence::Parity, true, true) | (Presence::Required, true, true) | (Presence::Optional, true, true) => PresenceOutcome::Compare,
        (Presence::Parity, false, false) | (Presence::Forbidden, false, false) | (Presence::Optional, _, _) => PresenceOutcome::Skip,
        (Presence::Parity, _, _) => PresenceOutcome::Mismatch("presence parity violated: field present on only one side"),
        (Presence::Required, _, _) => PresenceOutcome::Mismatch("required field missing on at least one side"),
        (Presence::Forbidden, _, _) => PresenceOutcome::Mismatch("forbidden field present on at least one side"),
    }
}

/// Compares two targets' responses for one operation, using its resolved
/// rule set (operation-specific override, or the library default).
pub struct Comparator<'a> {
    rules: &'a RuleLibrary,
    evaluator: &'a EvaluatorClient,
}

impl<'a> Comparator<'a> {
    #[must_use]
    pub fn new(rules: &'a RuleLibrary, evaluator: &'a EvaluatorClient) -> Self {
        Self { rules, evaluator }
    }

    /// Runs the full phased comparison for `operation_id`.
    ///
    /// `schema` is `(document_root, raw_operation)` when a spec is
    /// available; schema validation is skipped entirely without it.
    ///
    /// # Errors
    ///
    /// Returns an error only if an evaluator subprocess crash propagates
    /// (a fatal condition, not a recorded difference).
    pub async fn compare(
        &self,
        operation_id: &str,
        response_a: &ResponseCase,
        response_b: &ResponseCase,
        schema: Option<(&Value, &Value)>,
    ) -> Result<ComparisonResult, Error> {
        if response_a.is_infrastructure_skip() || response_b.is_infrastructure_skip() {
            return Ok(ComparisonResult::ok(
                "skipped: transport failure on at least one target",
                PhaseResult::skipped(),
                PhaseResult::skipped(),
                PhaseResult::skipped(),
                PhaseResult::skipped(),
            ));
        }

        let rule_set = self.rules.for_operation(operation_id);

        let schema_phase = self.validate_schema_phase(response_a, response_b, schema)?;
        if !schema_phase.matched {
            return Ok(Self::build_result(MismatchType::SchemaViolation, schema_phase, PhaseResult::skipped(), PhaseResult::skipped(), PhaseResult::skipped()));
        }

        let status_phase = self.status_code_phase(rule_set, response_a.status_code, response_b.status_code).await?;
        if !status_phase.matched {
            return Ok(Self::build_result(MismatchType::StatusCode, schema_phase, status_phase, PhaseResult::skipped(), PhaseResult::skipped()));
        }
        if !status_phase.checked {
            // Both sides returned the same error class: infrastructure noise.
            return Ok(ComparisonResult::ok("skipped: both targets returned an error-class status", schema_phase, status_phase, PhaseResult::skipped(), PhaseResult::skipped()));
        }

        let headers_phase = self.headers_phase(rule_set, response_a, response_b).await?;
        if !headers_phase.matched {
            return Ok(Self::build_result(MismatchType::Headers, schema_phase, status_phase, headers_phase, PhaseResult::skipped()));
        }

        let body_phase = self.body_phase(rule_set, response_a, response_b).await?;
        if !body_phase.matched {
            return Ok(Self::build_result(MismatchType::Body, schema_phase, status_phase, headers_phase, body_phase));
        }

        Ok(ComparisonResult::ok("match", schema_phase, status_phase, headers_phase, body_phase))
    }

    fn build_result(mismatch_type: MismatchType, schema: PhaseResult, status_code: PhaseResult, headers: PhaseResult, body: PhaseResult) -> ComparisonResult {
        let summary = format!("mismatch: {}", match mismatch_type {
            MismatchType::None => "none",
            MismatchType::SchemaViolation => "schema_violation",
            MismatchType::StatusCode => "status_code",
            MismatchType::Headers => "headers",
            MismatchType::Body => "body",
        });
        ComparisonResult {
            matched: false,
            mismatch_type,
            summary,
            schema,
            status_code,
            headers,
            body,
        }
    }

    fn validate_schema_phase(&self, response_a: &ResponseCase, response_b: &ResponseCase, schema: Option<(&Value, &Value)>) -> Result<PhaseResult, Error> {
        let Some((root, raw_operation)) = schema else {
            return Ok(PhaseResult::skipped());
        };
        let mut differences = Vec::new();
        for (label, response) in [("a", response_a), ("b", response_b)] {
            let Some(schema) = schema::find_response_schema(raw_operation, response.status_code) else { continue };
            let Some(body) = response.structured_body() else { continue };
            let result = schema::validate(root, schema, body)?;
            if !result.valid {
                differences.push(Difference {
                    path: "$".to_string(),
                    target_a_value: if label == "a" { body.clone() } else { Value::Null },
                    target_b_value: if label == "b" { body.clone() } else { Value::Null },
                    rule: format!(
                        "schema_violation[{label}]: {}",
                        result.violations.iter().chain(result.extra_fields.iter()).cloned().collect::<Vec<_>>().join("; ")
                    ),
                });
            }
        }
        Ok(PhaseResult::failed(differences))
    }

    async fn status_code_phase(&self, rule_set: &RuleSet, status_a: u16, status_b: u16) -> Result<PhaseResult, Error> {
        if let Some(rule) = &rule_set.status_code {
            let rule_label = match self.evaluate(rule, Value::from(status_a), Value::from(status_b)).await? {
                EvalOutcome::Matched(true) => return Ok(PhaseResult::passed()),
                EvalOutcome::Matched(false) => rule.expr.clone(),
                EvalOutcome::ExprError(msg) => format!("error: {msg}"),
            };
            return Ok(PhaseResult::failed(vec![Difference {
                path: "$.status_code".to_string(),
                target_a_value: Value::from(status_a),
                target_b_value: Value::from(status_b),
                rule: rule_label,
            }]));
        }

        if status_a == status_b {
            return Ok(PhaseResult::passed());
        }
        if (500..600).contains(&status_a) && (500..600).contains(&status_b) {
            // Both error-class: infrastructure noise, not a recorded mismatch.
            return Ok(PhaseResult {
                checked: false,
                matched: true,
                differences: Vec::new(),
            });
        }
        Ok(PhaseResult::failed(vec![Difference {
            path: "$.status_code".to_string(),
            target_a_value: Value::from(status_a),
            target_b_value: Value::from(status_b),
            rule: "exact_match".to_string(),
        }]))
    }

    async fn headers_phase(&self, rule_set: &RuleSet, response_a: &ResponseCase, response_b: &ResponseCase) -> Result<PhaseResult, Error> {
        let mut differences = Vec::new();
        for (name, rule) in &rule_set.headers {
            let value_a = response_a.header_first(name);
            let value_b = response_b.header_first(name);
            match apply_presence(rule.presence, value_a.is_some(), value_b.is_some()) {
                PresenceOutcome::Skip => {}
                PresenceOutcome::Mismatch(reason) => differences.push(Difference {
                    path: format!("$.headers.{name}"),
                    target_a_value: value_a.map_or(Value::Null, |v| Value::String(v.to_string())),
                    target_b_value: value_b.map_or(Value::Null, |v| Value::String(v.to_string())),
                    rule: reason.to_string(),
                }),
                PresenceOutcome::Compare => {
                    let a = Value::String(value_a.unwrap_or_default().to_string());
                    let b = Value::String(value_b.unwrap_or_default().to_string());
                    if let Some(rule_label) = self.rejected(rule, a.clone(), b.clone()).await? {
                        differences.push(Difference {
                            path: format!("$.headers.{name}"),
                            target_a_value: a,
                            target_b_value: b,
                            rule: rule_label,
                        });
                    }
                }
            }
        }
        Ok(PhaseResult::failed(differences))
    }

    async fn body_phase(&self, rule_set: &RuleSet, response_a: &ResponseCase, response_b: &ResponseCase) -> Result<PhaseResult, Error> {
        if !(200..300).contains(&response_a.status_code) || !(200..300).contains(&response_b.status_code) {
            return Ok(PhaseResult::skipped());
        }
        let (Some(body_a), Some(body_b)) = (response_a.structured_body(), response_b.structured_body()) else {
            return Ok(PhaseResult::skipped());
        };

        let mut differences = Vec::new();
        for (path_expr, rule) in &rule_set.field_rules {
            let path = match JsonPath::parse(path_expr) {
                Ok(path) => path,
                Err(e) => {
                    differences.push(Difference {
                        path: path_expr.clone(),
                        target_a_value: Value::Null,
                        target_b_value: Value::Null,
                        rule: format!("error: invalid JSONPath '{path_expr}': {e}"),
                    });
                    continue;
                }
            };
            let matches_a = path.query(body_a).all();
            let matches_b = path.query(body_b).all();

            if matches_a.len() == 1 && matches_b.len() == 1 {
                let a = matches_a[0].clone();
                let b = matches_b[0].clone();
                match apply_presence(rule.presence, true, true) {
                    PresenceOutcome::Skip => {}
                    PresenceOutcome::Mismatch(reason) => differences.push(Difference {
                        path: path_expr.clone(),
                        target_a_value: a,
                        target_b_value: b,
                        rule: reason.to_string(),
                    }),
                    PresenceOutcome::Compare => {
                        if let Some(rule_label) = self.rejected(rule, a.clone(), b.clone()).await? {
                            differences.push(Difference {
                                path: path_expr.clone(),
                                target_a_value: a,
                                target_b_value: b,
                                rule: rule_label,
                            });
                        }
                    }
                }
            } else if matches_a.is_empty() && matches_b.is_empty() {
                if let PresenceOutcome::Mismatch(reason) = apply_presence(rule.presence, false, false) {
                    differences.push(Difference {
                        path: path_expr.clone(),
                        target_a_value: Value::Null,
                        target_b_value: Value::Null,
                        rule: reason.to_string(),
                    });
                }
            } else if matches_a.len() != matches_b.len() {
                differences.push(Difference {
                    path: path_expr.clone(),
                    target_a_value: Value::from(matches_a.len()),
                    target_b_value: Value::from(matches_b.len()),
                    rule: "wildcard_count_mismatch".to_string(),
                });
            } else {
                for (i, (a, b)) in matches_a.iter().zip(matches_b.iter()).enumerate() {
                    if let Some(rule_label) = self.rejected(rule, (*a).clone(), (*b).clone()).await? {
                        differences.push(Difference {
                            path: format!("{path_expr}[{i}]"),
                            target_a_value: (*a).clone(),
                            target_b_value: (*b).clone(),
                            rule: rule_label,
                        });
                        break;
                    }
                }
            }
        }
        Ok(PhaseResult::failed(differences))
    }

    /// Evaluates `rule`'s expression, translating an expression-evaluation
    /// failure into [`EvalOutcome::ExprError`] rather than a fatal error.
    /// Only a genuine evaluator subprocess crash (restart budget exhausted)
    /// propagates as `Err`.
    async fn evaluate(&self, rule: &Rule, a: Value, b: Value) -> Result<EvalOutcome, Error> {
        let mut data = BTreeMap::new();
        data.insert("a".to_string(), a);
        data.insert("b".to_string(), b);
        match self.evaluator.evaluate(&rule.expr, data).await {
            Ok(result) => Ok(EvalOutcome::Matched(result)),
            Err(e) if e.to_string().contains("failed to evaluate") => Ok(EvalOutcome::ExprError(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Runs `evaluate` and, if it didn't match, returns the rule label to
    /// record as a difference (`None` means the rule passed).
    async fn rejected(&self, rule: &Rule, a: Value, b: Value) -> Result<Option<String>, Error> {
        match self.evaluate(rule, a, b).await? {
            EvalOutcome::Matched(true) => Ok(None),
            EvalOutcome::Matched(false) => Ok(Some(rule.expr.clone())),
            EvalOutcome::ExprError(msg) => Ok(Some(format!("error: {msg}"))),
        }
    }
}
