//! Retry/backoff and timeout policy for the executor's HTTP sends (§4.6).
//!
//! Transport-level resilience is transparent to the comparator: it only
//! ever sees the final attempt's result, never the retry history.

use crate::error::Error;
use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Configuration for connect/request timeouts.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Parses the `Retry-After` response header (seconds or HTTP-date) into a
/// delay duration. Returns `None` if absent, malformed, or in the past.
#[must_use]
pub fn parse_retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let retry_after = headers.get("retry-after")?;
    let value = retry_after.to_str().ok()?;
    parse_retry_after_value(value)
}

#[must_use]
pub fn parse_retry_after_value(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    if let Ok(date) = httpdate::parse_http_date(value) {
        let now = SystemTime::now();
        return date.duration_since(now).ok();
    }
    None
}

/// Calculates the retry delay, respecting an optional `Retry-After` value by
/// taking whichever of it and the exponential backoff delay is larger, then
/// capping at `max_delay_ms`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_retry_delay_with_header(
    config: &RetryConfig,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    let calculated_delay = calculate_retry_delay(config, attempt);
    retry_after.map_or(calculated_delay, |server_delay| {
        let delay = calculated_delay.max(server_delay);
        delay.min(Duration::from_millis(config.max_delay_ms))
    })
}

/// Classifies a reqwest error as retryable: connection/timeout failures are
/// always retryable; otherwise defer to the HTTP status classification.
#[must_use]
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() {
        return true;
    }
    error.status().is_none_or(|status| is_retryable_status(status.as_u16()))
}

/// 408 and 429 are retryable; 5xx is retryable except 501 and 505.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        500..=599 => !matches!(status, 501 | 505),
        _ => false,
    }
}

/// Exponential backoff with up to 25% jitter, capped at `max_delay_ms`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn calculate_retry_delay(config: &RetryConfig, attempt: usize) -> Duration {
    let base_delay = config.initial_delay_ms as f64;
    let attempt_i32 = attempt.min(30) as i32;
    let delay_ms = (base_delay * config.backoff_multiplier.powi(attempt_i32)).min(config.max_delay_ms as f64);

    let final_delay_ms = if config.jitter {
        let jitter_factor = fastrand::f64().mul_add(0.25, 1.0);
        delay_ms * jitter_factor
    } else {
        delay_ms
    } as u64;

    Duration::from_millis(final_delay_ms)
}

/// Runs `operation` with bounded retries. `operation` receives the
/// zero-indexed attempt number so it can honor a server-specified
/// `Retry-After` delay before its next call if it chooses to.
///
/// # Errors
///
/// Returns a transport error if `operation` fails non-retryably, or a
/// retry-limit-exceeded error once `max_attempts` is exhausted.
pub async fn execute_with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, Error>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(error) => {
                let is_last_attempt = attempt + 1 >= config.max_attempts;
                if !is_retryable_error(&error) {
                    return Err(Error::transport_error(error.to_string()));
                }
                if is_last_attempt {
                    last_error = Some(error.to_string());
                    break;
                }
                let delay = calculate_retry_delay(config, attempt);
                sleep(delay).await;
                last_error = Some(error.to_string());
            }
        }
    }

    Err(Error::retry_limit_exceeded(
        config.max_attempts.try_into().unwrap_or(u32::MAX),
        last_error.unwrap_or_else(|| "unknown error".to_string()),
    ))
}

/// Builds a reqwest client with connect/request timeouts applied.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed.
pub fn build_timed_client(timeout_config: &TimeoutConfig) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(timeout_config.connect_timeout_ms))
        .timeout(Duration::from_millis(timeout_config.request_timeout_ms))
        .build()
        .map_err(|e| Error::transport_error(format!("failed to build HTTP client: {e}")))
}
