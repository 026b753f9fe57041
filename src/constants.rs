//! Centralized string and numeric constants.
//!
//! Keeps bundle file names, default ports/timeouts and other repeated
//! literals in one place instead of scattered through the engine.

// Bundle file names (§4.8)
pub const BUNDLE_CASE_FILE: &str = "case.json";
pub const BUNDLE_CHAIN_FILE: &str = "chain.json";
pub const BUNDLE_TARGET_A_FILE: &str = "target_a.json";
pub const BUNDLE_TARGET_B_FILE: &str = "target_b.json";
pub const BUNDLE_DIFF_FILE: &str = "diff.json";
pub const BUNDLE_METADATA_FILE: &str = "metadata.json";
pub const RUN_SUMMARY_FILE: &str = "summary.json";
pub const REPLAY_SUMMARY_FILE: &str = "replay_summary.json";
pub const MISMATCHES_SUBDIR: &str = "mismatches";

// Redaction
pub const REDACTED_SENTINEL: &str = "[REDACTED]";

// Default timeouts and limits
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EVALUATOR_CALLER_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EVALUATOR_ROUND_TRIP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_EVALUATOR_INWORKER_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_EVALUATOR_MAX_RESTARTS: u32 = 3;
pub const DEFAULT_EVALUATOR_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_SEEDS: u32 = 100;
pub const DEFAULT_MIN_HITS_PER_OP: u32 = 1;
pub const DEFAULT_MIN_COVERAGE_PCT: u32 = 100;

// HTTP headers
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";

// Content types
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Checks if a header name is authentication-related and should be redacted
/// from logs unconditionally.
#[must_use]
pub fn is_auth_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "authorization"
            | "proxy-authorization"
            | "x-api-key"
            | "x-api-token"
            | "x-auth-token"
            | "api-key"
            | "cookie"
            | "set-cookie"
    ) || name.to_lowercase().starts_with("x-auth-")
        || name.to_lowercase().starts_with("x-api-")
}

/// Checks whether a content type identifies a JSON body.
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    content_type.to_lowercase().contains("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_detection() {
        assert!(is_auth_header("Authorization"));
        assert!(is_auth_header("X-Api-Key"));
        assert!(is_auth_header("x-auth-foo"));
        assert!(!is_auth_header("Content-Type"));
    }

    #[test]
    fn json_content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/vnd.api+json; charset=utf-8"));
        assert!(!is_json_content_type("text/plain"));
    }
}
