//! Classifies a bundle's re-execution against its originally recorded
//! mismatch (§4.10).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::comparator::{ComparisonResult, MismatchType};

/// A bundle's outcome after re-running its request(s) under the current
/// rule set. `Error` is decided by the caller before `classify` is even
/// invoked: when re-execution itself fails (a transport error, a crashed
/// evaluator) there is no new `ComparisonResult` to classify against the
/// old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayClassification {
    Fixed,
    StillMismatch,
    DifferentMismatch,
    Error,
}

fn body_diff_paths(result: &ComparisonResult) -> BTreeSet<&str> {
    result.body.differences.iter().map(|d| d.path.as_str()).collect()
}

/// Classifies `replayed` against `original`. `step_original`/`step_replayed`
/// are the mismatching step index for chain bundles (`None` for
/// single-request bundles); a chain that now mismatches at a different step
/// is a different mismatch even if the `mismatch_type` is unchanged.
#[must_use]
pub fn classify(
    original: &ComparisonResult,
    replayed: &ComparisonResult,
    step_original: Option<usize>,
    step_replayed: Option<usize>,
) -> ReplayClassification {
    if replayed.matched {
        return ReplayClassification::Fixed;
    }
    if replayed.mismatch_type != original.mismatch_type {
        return ReplayClassification::DifferentMismatch;
    }
    if step_original != step_replayed {
        return ReplayClassification::DifferentMismatch;
    }
    if original.mismatch_type == MismatchType::Body
        && body_diff_paths(original) != body_diff_paths(replayed)
    {
        return ReplayClassification::DifferentMismatch;
    }
    ReplayClassification::StillMismatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{Difference, PhaseResult};
    use serde_json::json;

    fn base(mismatch_type: MismatchType, matched: bool) -> ComparisonResult {
        ComparisonResult {
            matched,
            mismatch_type,
            summary: String::new(),
            schema: PhaseResult::default(),
            status_code: PhaseResult::default(),
            headers: PhaseResult::default(),
            body: PhaseResult::default(),
        }
    }

    #[test]
    fn matched_replay_is_fixed() {
        let original = base(MismatchType::StatusCode, false);
        let replayed = base(MismatchType::None, true);
        assert_eq!(classify(&original, &replayed, None, None), ReplayClassification::Fixed);
    }

    #[test]
    fn same_mismatch_type_and_step_is_still_mismatch() {
        let original = base(MismatchType::StatusCode, false);
        let replayed = base(MismatchType::StatusCode, false);
        assert_eq!(
            classify(&original, &replayed, Some(1), Some(1)),
            ReplayClassification::StillMismatch
        );
    }

    #[test]
    fn different_mismatch_type_is_different_mismatch() {
        let original = base(MismatchType::StatusCode, false);
        let replayed = base(MismatchType::Headers, false);
        assert_eq!(
            classify(&original, &replayed, None, None),
            ReplayClassification::DifferentMismatch
        );
    }

    #[test]
    fn different_chain_step_is_different_mismatch() {
        let original = base(MismatchType::StatusCode, false);
        let replayed = base(MismatchType::StatusCode, false);
        assert_eq!(
            classify(&original, &replayed, Some(0), Some(2)),
            ReplayClassification::DifferentMismatch
        );
    }

    #[test]
    fn same_body_diff_paths_is_still_mismatch() {
        let mut original = base(MismatchType::Body, false);
        original.body.differences.push(Difference {
            path: "/id".to_string(),
            target_a_value: json!(1),
            target_b_value: json!(2),
            rule: "eq".to_string(),
        });
        let mut replayed = base(MismatchType::Body, false);
        replayed.body.differences.push(Difference {
            path: "/id".to_string(),
            target_a_value: json!(3),
            target_b_value: json!(4),
            rule: "eq".to_string(),
        });
        assert_eq!(
            classify(&original, &replayed, None, None),
            ReplayClassification::StillMismatch
        );
    }

    #[test]
    fn different_body_diff_paths_is_different_mismatch() {
        let mut original = base(MismatchType::Body, false);
        original.body.differences.push(Difference {
            path: "/id".to_string(),
            target_a_value: json!(1),
            target_b_value: json!(2),
            rule: "eq".to_string(),
        });
        let mut replayed = base(MismatchType::Body, false);
        replayed.body.differences.push(Difference {
            path: "/name".to_string(),
            target_a_value: json!("a"),
            target_b_value: json!("b"),
            rule: "eq".to_string(),
        });
        assert_eq!(
            classify(&original, &replayed, None, None),
            ReplayClassification::DifferentMismatch
        );
    }
}
