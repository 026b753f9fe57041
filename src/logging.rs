//! Request/response logging with automatic secret redaction (§4.13).
//!
//! [`SecretContext`] is also the redaction authority the artifact writer
//! uses for bundle bodies (§4.8) — one place decides what a secret looks
//! like, whether it is about to hit a log line or a written-to-disk file.

use tracing::{debug, info, trace};

/// Minimum length for a secret to be redacted in body content, to avoid
/// false positives on short, incidentally-matching values.
const MIN_SECRET_LENGTH_FOR_BODY_REDACTION: usize = 8;

/// Resolved secret values to redact wherever they appear in logs or
/// persisted bundles.
#[derive(Debug, Default, Clone)]
pub struct SecretContext {
    secrets: Vec<String>,
}

impl SecretContext {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a context from resolved runtime values — target auth header
    /// values after `${VAR}` interpolation, and any field values extracted
    /// at the JSONPaths named in `secrets.redact_fields`.
    #[must_use]
    pub fn from_resolved_values(values: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
        secrets.sort();
        secrets.dedup();
        Self { secrets }
    }

    #[must_use]
    pub fn is_secret(&self, value: &str) -> bool {
        self.secrets.iter().any(|s| s == value)
    }

    /// Redacts every occurrence of a known secret at least
    /// `MIN_SECRET_LENGTH_FOR_BODY_REDACTION` characters long.
    #[must_use]
    pub fn redact_secrets_in_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for secret in &self.secrets {
            if secret.len() >= MIN_SECRET_LENGTH_FOR_BODY_REDACTION {
                result = result.replace(secret, crate::constants::REDACTED_SENTINEL);
            }
        }
        result
    }

    #[must_use]
    pub const fn has_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }
}

#[must_use]
const fn http_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// Checks whether a header name is always redacted, independent of its
/// value. This is the single source of truth for both request-building
/// sanitization and logging.
#[must_use]
pub fn should_redact_header(header_name: &str) -> bool {
    let lower = header_name.to_lowercase();
    matches!(
        lower.as_str(),
        "authorization"
            | "proxy-authorization"
            | "x-api-key"
            | "x-api-token"
            | "api-key"
            | "api_key"
            | "x-access-token"
            | "x-auth-token"
            | "x-secret-token"
            | "token"
            | "secret"
            | "password"
            | "x-webhook-secret"
            | "cookie"
            | "set-cookie"
            | "x-csrf-token"
            | "x-xsrf-token"
            | "x-amz-security-token"
            | "private-token"
    )
}

#[must_use]
fn should_redact_query_param(param_name: &str) -> bool {
    let lower = param_name.to_lowercase();
    matches!(
        lower.as_str(),
        "api_key"
            | "apikey"
            | "api-key"
            | "key"
            | "token"
            | "access_token"
            | "accesstoken"
            | "auth_token"
            | "authtoken"
            | "bearer_token"
            | "refresh_token"
            | "secret"
            | "api_secret"
            | "client_secret"
            | "password"
            | "passwd"
            | "pwd"
            | "signature"
            | "sig"
            | "session_id"
            | "sessionid"
            | "auth"
            | "authorization"
            | "credentials"
    )
}

/// Redacts sensitive query parameter values from a URL, preserving any
/// fragment.
#[must_use]
pub fn redact_url_query_params(url: &str) -> String {
    let Some(query_start) = url.find('?') else {
        return url.to_string();
    };

    let base_url = &url[..query_start];
    let query_string = &url[query_start + 1..];

    let (query_part, fragment) = query_string
        .find('#')
        .map_or((query_string, None), |frag_start| {
            (&query_string[..frag_start], Some(&query_string[frag_start..]))
        });

    let redacted_params: Vec<String> = query_part
        .split('&')
        .map(|param| {
            param.find('=').map_or_else(
                || param.to_string(),
                |eq_pos| {
                    let name = &param[..eq_pos];
                    if should_redact_query_param(name) {
                        format!("{name}={}", crate::constants::REDACTED_SENTINEL)
                    } else {
                        param.to_string()
                    }
                },
            )
        })
        .collect();

    let mut result = format!("{base_url}?{}", redacted_params.join("&"));
    if let Some(frag) = fragment {
        result.push_str(frag);
    }
    result
}

fn redact_header_value(header_name: &str, value: &str, secret_ctx: Option<&SecretContext>) -> String {
    if should_redact_header(header_name) {
        return crate::constants::REDACTED_SENTINEL.to_string();
    }
    if secret_ctx.is_some_and(|ctx| ctx.is_secret(value)) {
        return crate::constants::REDACTED_SENTINEL.to_string();
    }
    value.to_string()
}

/// Logs an outgoing request at info (method/URL), debug (headers), and
/// trace (body) levels, with secrets redacted at every level.
pub fn log_request(
    target_label: &str,
    method: &str,
    url: &str,
    headers: Option<&reqwest::header::HeaderMap>,
    body: Option<&str>,
    secret_ctx: Option<&SecretContext>,
) {
    let redacted_url = redact_url_query_params(url);
    info!(target: "fuzzer::executor", "[{target_label}] → {} {}", method.to_uppercase(), redacted_url);

    let Some(header_map) = headers else {
        log_body("Request", body, usize::MAX, secret_ctx);
        return;
    };

    debug!(target: "fuzzer::executor", "[{target_label}] request headers:");
    for (name, value) in header_map {
        let header_str = name.as_str();
        let raw_value = String::from_utf8_lossy(value.as_bytes()).to_string();
        let display_value = redact_header_value(header_str, &raw_value, secret_ctx);
        debug!(target: "fuzzer::executor", "  {}: {}", header_str, display_value);
    }
    log_body("Request", body, usize::MAX, secret_ctx);
}

/// Logs a response at info (status/duration), debug (headers), and trace
/// (body, truncated past `max_body_len`) levels.
pub fn log_response(
    target_label: &str,
    status: u16,
    duration_ms: u128,
    headers: Option<&reqwest::header::HeaderMap>,
    body: Option<&str>,
    max_body_len: usize,
    secret_ctx: Option<&SecretContext>,
) {
    info!(
        target: "fuzzer::executor",
        "[{target_label}] ← {} {} ({}ms)",
        status,
        http_status_text(status),
        duration_ms
    );

    let Some(header_map) = headers else {
        log_body("Response", body, max_body_len, secret_ctx);
        return;
    };

    debug!(target: "fuzzer::executor", "[{target_label}] response headers:");
    for (name, value) in header_map {
        let header_str = name.as_str();
        let raw_value = String::from_utf8_lossy(value.as_bytes()).to_string();
        let display_value = redact_header_value(header_str, &raw_value, secret_ctx);
        debug!(target: "fuzzer::executor", "  {}: {}", header_str, display_value);
    }
    log_body("Response", body, max_body_len, secret_ctx);
}

fn log_body(label: &str, body: Option<&str>, max_body_len: usize, secret_ctx: Option<&SecretContext>) {
    let Some(body_content) = body else {
        return;
    };
    let redacted = secret_ctx.map_or_else(|| body_content.to_string(), |ctx| ctx.redact_secrets_in_text(body_content));
    if redacted.len() > max_body_len {
        trace!(target: "fuzzer::executor", "{label} body: {} (truncated at {} chars)", &redacted[..max_body_len], max_body_len);
    } else {
        trace!(target: "fuzzer::executor", "{label} body: {}", redacted);
    }
}

/// Reads the log body truncation limit from `PARITY_FUZZ_LOG_MAX_BODY`,
/// defaulting to 1000 characters.
#[must_use]
pub fn get_max_body_len() -> usize {
    std::env::var("PARITY_FUZZ_LOG_MAX_BODY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1000)
}
