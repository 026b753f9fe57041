//! Writes mismatch bundles and run/replay summaries to disk (§4.8).

use std::path::{Path, PathBuf};

use jsonptr::assign::Assign;
use serde_json::Value;
use serde_json_path::JsonPath;
use uuid::Uuid;

use crate::atomic::{write_bundle_file, RunOutputLock};
use crate::comparator::ComparisonResult;
use crate::constants::{
    BUNDLE_CASE_FILE, BUNDLE_CHAIN_FILE, BUNDLE_DIFF_FILE, BUNDLE_METADATA_FILE,
    BUNDLE_TARGET_A_FILE, BUNDLE_TARGET_B_FILE, REDACTED_SENTINEL, REPLAY_SUMMARY_FILE,
    RUN_SUMMARY_FILE,
};
use crate::error::Error;
use crate::model::{Body, ChainCase, ChainExecution, ChainStepExecution, RequestCase, ResponseCase};

use super::{BundleMetadata, ReplaySummary, RunSummary, SingleExchange};

/// Replaces `.`/`..`/path separators so an operation id can never escape the
/// mismatches directory when used as a filename component.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "op".to_string(),
        _ => cleaned,
    }
}

#[must_use]
pub fn bundle_dir_name(timestamp: chrono::DateTime<chrono::Utc>, operation_id: &str, case_id: Uuid) -> String {
    let stamp = timestamp.format("%Y%m%dT%H%M%S%6f");
    let short_id = &case_id.simple().to_string()[..8];
    format!("{stamp}__{}__{short_id}", sanitize_component(operation_id))
}

/// Creates a fresh bundle directory under `parent`, appending a numeric
/// suffix to `name` if it already exists.
fn create_bundle_dir(parent: &Path, name: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(parent)?;
    let mut candidate = parent.join(name);
    let mut suffix = 1u32;
    while candidate.exists() {
        candidate = parent.join(format!("{name}-{suffix}"));
        suffix += 1;
    }
    std::fs::create_dir_all(&candidate)?;
    Ok(candidate)
}

/// Replaces the value at every JSONPath in `redact_paths` with the redaction
/// sentinel, in place. Unparseable paths and paths matching nothing are
/// silently skipped: redaction is best-effort over whatever the body
/// actually contains.
fn redact_body_fields(body: &mut Value, redact_paths: &[String]) {
    for raw in redact_paths {
        let Ok(path) = JsonPath::parse(raw) else { continue };
        let pointers: Vec<String> = path
            .query_located(body)
            .locations()
            .map(|loc| loc.to_json_pointer())
            .collect();
        for pointer in pointers {
            let Ok(ptr) = jsonptr::Pointer::parse(&pointer) else { continue };
            let _ = body.assign(ptr, Value::String(REDACTED_SENTINEL.to_string()));
        }
    }
}

/// Collects the string form of every value the redaction JSONPaths match in
/// `body`, for feeding into [`crate::logging::SecretContext`]: the same
/// `secrets.redact_fields` list drives both this module's structural bundle
/// redaction and the log line's text-based redaction, per the shared
/// redaction-list design.
#[must_use]
pub fn resolve_secret_values(body: &Value, redact_paths: &[String]) -> Vec<String> {
    let mut values = Vec::new();
    for raw in redact_paths {
        let Ok(path) = JsonPath::parse(raw) else { continue };
        for matched in path.query(body).all() {
            match matched {
                Value::String(s) => values.push(s.clone()),
                other => values.push(other.to_string()),
            }
        }
    }
    values
}

fn redact_request(request: &RequestCase, redact_paths: &[String]) -> RequestCase {
    let mut cloned = request.clone();
    if let Some(Body::Structured(value)) = &mut cloned.body {
        redact_body_fields(value, redact_paths);
    }
    cloned
}

fn redact_response(response: &ResponseCase, redact_paths: &[String]) -> ResponseCase {
    let mut cloned = response.clone();
    if let Some(Body::Structured(value)) = &mut cloned.body {
        redact_body_fields(value, redact_paths);
    }
    cloned
}

fn redact_chain_execution(execution: &ChainExecution, redact_paths: &[String]) -> ChainExecution {
    ChainExecution {
        steps: execution
            .steps
            .iter()
            .map(|step| ChainStepExecution {
                request: redact_request(&step.request, redact_paths),
                response: redact_response(&step.response, redact_paths),
                extracted: step.extracted.clone(),
            })
            .collect(),
    }
}

/// Writes a single-request mismatch bundle, returning the bundle directory.
pub async fn write_single_bundle(
    mismatches_dir: &Path,
    request: &RequestCase,
    response_a: &ResponseCase,
    response_b: &ResponseCase,
    diff: &ComparisonResult,
    metadata: &BundleMetadata,
    redact_paths: &[String],
) -> Result<PathBuf, Error> {
    let name = bundle_dir_name(metadata.timestamp, &request.operation_id, request.id);
    let dir = create_bundle_dir(mismatches_dir, &name).map_err(Error::Io)?;

    let redacted_request = redact_request(request, redact_paths);
    write_bundle_file(&dir.join(BUNDLE_CASE_FILE), &redacted_request).await?;
    write_bundle_file(
        &dir.join(BUNDLE_TARGET_A_FILE),
        &SingleExchange {
            request: redacted_request.clone(),
            response: redact_response(response_a, redact_paths),
        },
    )
    .await?;
    write_bundle_file(
        &dir.join(BUNDLE_TARGET_B_FILE),
        &SingleExchange {
            request: redacted_request,
            response: redact_response(response_b, redact_paths),
        },
    )
    .await?;
    write_bundle_file(&dir.join(BUNDLE_DIFF_FILE), diff).await?;
    write_bundle_file(&dir.join(BUNDLE_METADATA_FILE), metadata).await?;

    Ok(dir)
}

/// Writes a chain mismatch bundle, returning the bundle directory.
pub async fn write_chain_bundle(
    mismatches_dir: &Path,
    chain: &ChainCase,
    execution_a: &ChainExecution,
    execution_b: &ChainExecution,
    diff: &ComparisonResult,
    metadata: &BundleMetadata,
    redact_paths: &[String],
) -> Result<PathBuf, Error> {
    let entry_op = chain
        .steps
        .first()
        .map_or("chain", |s| s.request_template.operation_id.as_str());
    let name = bundle_dir_name(metadata.timestamp, entry_op, chain.id);
    let dir = create_bundle_dir(mismatches_dir, &name).map_err(Error::Io)?;

    write_bundle_file(&dir.join(BUNDLE_CHAIN_FILE), chain).await?;
    write_bundle_file(
        &dir.join(BUNDLE_TARGET_A_FILE),
        &redact_chain_execution(execution_a, redact_paths),
    )
    .await?;
    write_bundle_file(
        &dir.join(BUNDLE_TARGET_B_FILE),
        &redact_chain_execution(execution_b, redact_paths),
    )
    .await?;
    write_bundle_file(&dir.join(BUNDLE_DIFF_FILE), diff).await?;
    write_bundle_file(&dir.join(BUNDLE_METADATA_FILE), metadata).await?;

    Ok(dir)
}

/// Writes `summary.json`, holding an exclusive advisory lock on `dir` for
/// the duration: unlike bundle directories (uniquely named, never
/// contended), the run summary is the one artifact file a parallel run
/// against the same output directory could race on.
pub async fn write_run_summary(dir: &Path, summary: &RunSummary) -> Result<(), Error> {
    let locked_dir = dir.to_path_buf();
    let _lock = tokio::task::spawn_blocking(move || RunOutputLock::acquire(&locked_dir))
        .await
        .map_err(|e| Error::runtime(format!("summary lock task panicked: {e}")))?
        .map_err(Error::Io)?;
    write_bundle_file(&dir.join(RUN_SUMMARY_FILE), summary).await
}

/// Writes `replay_summary.json` under the same locking discipline as
/// [`write_run_summary`].
pub async fn write_replay_summary(dir: &Path, summary: &ReplaySummary) -> Result<(), Error> {
    let locked_dir = dir.to_path_buf();
    let _lock = tokio::task::spawn_blocking(move || RunOutputLock::acquire(&locked_dir))
        .await
        .map_err(|e| Error::runtime(format!("summary lock task panicked: {e}")))?
        .map_err(Error::Io)?;
    write_bundle_file(&dir.join(REPLAY_SUMMARY_FILE), summary).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{MismatchType, PhaseResult};
    use crate::model::Method;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_metadata() -> BundleMetadata {
        BundleMetadata {
            tool_version: "0.1.0".to_string(),
            timestamp: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            seed: Some(7),
            target_a_name: "prod".to_string(),
            target_a_base_url: "https://a.example".to_string(),
            target_b_name: "staging".to_string(),
            target_b_base_url: "https://b.example".to_string(),
            rule_file: None,
        }
    }

    fn sample_diff() -> ComparisonResult {
        ComparisonResult {
            matched: false,
            mismatch_type: MismatchType::StatusCode,
            summary: "status code differs".to_string(),
            schema: PhaseResult::default(),
            status_code: PhaseResult {
                checked: true,
                matched: false,
                differences: Vec::new(),
            },
            headers: PhaseResult::default(),
            body: PhaseResult::default(),
        }
    }

    #[test]
    fn sanitize_component_rejects_traversal() {
        assert_eq!(sanitize_component(".."), "op");
        assert_eq!(sanitize_component("."), "op");
        assert_eq!(sanitize_component(""), "op");
        assert_eq!(sanitize_component("get/user"), "get_user");
    }

    #[test]
    fn bundle_dir_name_embeds_timestamp_operation_and_short_id() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-03-04T05:06:07.123456Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let id = Uuid::parse_str("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee").unwrap();
        let name = bundle_dir_name(ts, "get-user", id);
        assert!(name.starts_with("20260304T050607123456__get-user__aaaaaaaa"));
    }

    #[test]
    fn create_bundle_dir_appends_numeric_suffix_on_collision() {
        let tmp = TempDir::new().unwrap();
        let first = create_bundle_dir(tmp.path(), "bundle").unwrap();
        let second = create_bundle_dir(tmp.path(), "bundle").unwrap();
        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "bundle-1");
    }

    #[test]
    fn redact_body_fields_replaces_matched_value() {
        let mut body = json!({"user": {"email": "a@example.com", "id": 1}});
        redact_body_fields(&mut body, &["$.user.email".to_string()]);
        assert_eq!(body["user"]["email"], json!(REDACTED_SENTINEL));
        assert_eq!(body["user"]["id"], json!(1));
    }

    #[test]
    fn resolve_secret_values_collects_matched_strings() {
        let body = json!({"user": {"email": "a@example.com"}, "count": 3});
        let values = resolve_secret_values(&body, &["$.user.email".to_string(), "$.count".to_string()]);
        assert!(values.contains(&"a@example.com".to_string()));
        assert!(values.iter().any(|v| v == "3"));
    }

    #[test]
    fn redact_body_fields_skips_invalid_path_and_no_match() {
        let mut body = json!({"a": 1});
        redact_body_fields(&mut body, &["not a jsonpath".to_string(), "$.missing".to_string()]);
        assert_eq!(body, json!({"a": 1}));
    }

    #[tokio::test]
    async fn write_single_bundle_produces_all_five_files() {
        let tmp = TempDir::new().unwrap();
        let request = RequestCase::new("get-user", Method::Get, "/users/{id}");
        let response_a = ResponseCase {
            status_code: 200,
            headers: Default::default(),
            body: None,
            elapsed_ms: 5,
            protocol_version: "HTTP/1.1".to_string(),
            error: None,
        };
        let response_b = ResponseCase {
            status_code: 500,
            ..response_a.clone()
        };
        let dir = write_single_bundle(
            tmp.path(),
            &request,
            &response_a,
            &response_b,
            &sample_diff(),
            &sample_metadata(),
            &[],
        )
        .await
        .unwrap();

        for file in [
            BUNDLE_CASE_FILE,
            BUNDLE_TARGET_A_FILE,
            BUNDLE_TARGET_B_FILE,
            BUNDLE_DIFF_FILE,
            BUNDLE_METADATA_FILE,
        ] {
            assert!(dir.join(file).exists(), "missing {file}");
        }
    }

    #[tokio::test]
    async fn write_single_bundle_redacts_configured_fields() {
        let tmp = TempDir::new().unwrap();
        let mut request = RequestCase::new("create-user", Method::Post, "/users");
        request.body = Some(Body::Structured(json!({"password": "hunter2"})));
        let response = ResponseCase {
            status_code: 201,
            headers: Default::default(),
            body: Some(Body::Structured(json!({"password": "hunter2"}))),
            elapsed_ms: 5,
            protocol_version: "HTTP/1.1".to_string(),
            error: None,
        };
        let dir = write_single_bundle(
            tmp.path(),
            &request,
            &response,
            &response,
            &sample_diff(),
            &sample_metadata(),
            &["$.password".to_string()],
        )
        .await
        .unwrap();

        let raw = std::fs::read_to_string(dir.join(BUNDLE_TARGET_A_FILE)).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(raw.contains(REDACTED_SENTINEL));
    }

    #[tokio::test]
    async fn write_run_summary_round_trips() {
        let tmp = TempDir::new().unwrap();
        let summary = RunSummary {
            cases_sent: 10,
            mismatches: 2,
            errors: 0,
            bundle_paths: vec!["mismatches/x".to_string()],
        };
        write_run_summary(tmp.path(), &summary).await.unwrap();
        let raw = std::fs::read_to_string(tmp.path().join(RUN_SUMMARY_FILE)).unwrap();
        let parsed: RunSummary = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.cases_sent, 10);
        assert_eq!(parsed.bundle_paths, vec!["mismatches/x".to_string()]);
    }
}
