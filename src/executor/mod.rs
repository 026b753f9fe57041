//! Dual-target HTTP executor (§4.6): issues every request to both targets,
//! times each send, and resolves chain link parameters independently per
//! target using that target's own prior extractions.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::TargetConfig;
use crate::error::Error;
use crate::jsonpointer;
use crate::logging::{self, SecretContext};
use crate::model::{Body, ChainCase, ChainExecution, ChainStepExecution, LinkSource, RequestCase, ResponseCase};
use crate::resilience::{self, RetryConfig, TimeoutConfig};

/// `(min_interval, last_send_time)` gate shared by both targets: the next
/// allowed send time is computed under the lock, the sleep happens outside
/// it so ordering holds even under accidental concurrent use.
struct RateLimiterState {
    min_interval: Duration,
    last_send: Option<Instant>,
}

pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(requests_per_second: Option<f64>) -> Self {
        let min_interval = requests_per_second
            .filter(|rps| *rps > 0.0)
            .map_or(Duration::ZERO, |rps| Duration::from_secs_f64(1.0 / rps));
        Self {
            state: Mutex::new(RateLimiterState {
                min_interval,
                last_send: None,
            }),
        }
    }

    async fn wait_turn(&self) {
        let sleep_for = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let sleep_for = state
                .last_send
                .map_or(Duration::ZERO, |last| (last + state.min_interval).saturating_duration_since(now));
            state.last_send = Some(now + sleep_for);
            sleep_for
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }
}

/// One target's HTTP client, built once with its base URL and TLS material.
pub struct TargetClient {
    label: String,
    client: reqwest::Client,
    base_url: String,
    default_headers: BTreeMap<String, String>,
}

impl TargetClient {
    /// Builds a client for `config`, loading any configured client
    /// certificate and CA bundle.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the client cannot be constructed or its
    /// TLS material cannot be read.
    pub fn build(label: impl Into<String>, config: &TargetConfig, timeouts: &TimeoutConfig) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(timeouts.connect_timeout_ms))
            .timeout(Duration::from_millis(timeouts.request_timeout_ms))
            .danger_accept_invalid_certs(!config.verify_ssl);

        if let Some(ca_path) = &config.ca_bundle {
            let pem = std::fs::read(ca_path)
                .map_err(|e| Error::transport_error(format!("failed to read CA bundle '{}': {e}", ca_path.display())))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::transport_error(format!("invalid CA bundle '{}': {e}", ca_path.display())))?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&config.cert, &config.key) {
            let mut pem = std::fs::read(cert_path)
                .map_err(|e| Error::transport_error(format!("failed to read client cert '{}': {e}", cert_path.display())))?;
            let mut key = std::fs::read(key_path)
                .map_err(|e| Error::transport_error(format!("failed to read client key '{}': {e}", key_path.display())))?;
            pem.append(&mut key);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| Error::transport_error(format!("invalid client identity for target: {e}")))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| Error::transport_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            label: label.into(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_headers: config.headers.clone(),
        })
    }

    fn build_url(&self, request: &RequestCase) -> Result<reqwest::Url, Error> {
        let path = request.rendered_path.trim_start_matches('/');
        let mut url = reqwest::Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|e| Error::invalid_path(format!("failed to build request URL: {e}")))?;
        if !request.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, values) in &request.query_params {
                for value in values {
                    pairs.append_pair(name, value);
                }
            }
        }
        Ok(url)
    }

    fn build_headers(&self, request: &RequestCase) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::invalid_path(format!("invalid header name '{name}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::invalid_path(format!("invalid header value for '{name}': {e}")))?;
            headers.insert(header_name, header_value);
        }
        for (name, values) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::invalid_path(format!("invalid header name '{name}': {e}")))?;
            for value in values {
                let header_value = HeaderValue::from_str(value)
                    .map_err(|e| Error::invalid_path(format!("invalid header value for '{name}': {e}")))?;
                headers.append(header_name.clone(), header_value);
            }
        }
        Ok(headers)
    }

    async fn send(
        &self,
        request: &RequestCase,
        retry: &RetryConfig,
        timeout_override: Option<Duration>,
        secret_ctx: Option<&SecretContext>,
    ) -> ResponseCase {
        let url = match self.build_url(request) {
            Ok(url) => url,
            Err(e) => return ResponseCase::transport_error(e.to_string()),
        };
        let headers = match self.build_headers(request) {
            Ok(headers) => headers,
            Err(e) => return ResponseCase::transport_error(e.to_string()),
        };
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);

        let body_bytes = request.body.as_ref().map(body_to_bytes);

        logging::log_request(
            &self.label,
            request.method.as_str(),
            url.as_str(),
            Some(&headers),
            body_bytes.as_deref().map(|b| String::from_utf8_lossy(b)).as_deref(),
            secret_ctx,
        );

        let start = Instant::now();
        let result = resilience::execute_with_retry(retry, |_attempt| {
            let mut builder = self.client.request(method.clone(), url.clone()).headers(headers.clone());
            if let Some(bytes) = &body_bytes {
                builder = builder.body(bytes.clone());
            }
            if let Some(duration) = timeout_override {
                builder = builder.timeout(duration);
            }
            builder.send()
        })
        .await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(response) => self.to_response_case(response, elapsed_ms, secret_ctx).await,
            Err(e) => ResponseCase::transport_error(e.to_string()),
        }
    }

    async fn to_response_case(&self, response: reqwest::Response, elapsed_ms: u64, secret_ctx: Option<&SecretContext>) -> ResponseCase {
        let status_code = response.status().as_u16();
        let protocol_version = format!("{:?}", response.version());
        let mut headers = crate::model::MultiMap::new();
        for (name, value) in response.headers() {
            let value_str = String::from_utf8_lossy(value.as_bytes()).to_string();
            headers.entry(name.as_str().to_lowercase()).or_default().push(value_str);
        }

        let body_bytes = response.bytes().await.ok();
        let body = body_bytes.as_deref().map(bytes_to_body);

        logging::log_response(
            &self.label,
            status_code,
            u128::from(elapsed_ms),
            None,
            body_bytes.as_deref().map(|b| String::from_utf8_lossy(b)).as_deref(),
            logging::get_max_body_len(),
            secret_ctx,
        );

        ResponseCase {
            status_code,
            headers,
            body,
            elapsed_ms,
            protocol_version,
            error: None,
        }
    }
}

fn body_to_bytes(body: &Body) -> Vec<u8> {
    match body {
        Body::Structured(value) => serde_json::to_vec(value).unwrap_or_default(),
        Body::Binary(encoded) => base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).unwrap_or_default(),
    }
}

fn bytes_to_body(bytes: &[u8]) -> Body {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Body::Structured(value),
        Err(_) => Body::Binary(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)),
    }
}

/// Resolves a decoded link field (a body pointer, or `header/NAME[/INDEX]`)
/// against a response already received for this target.
fn extract_field(response: &ResponseCase, field: &str) -> Option<Value> {
    if let Some(rest) = field.strip_prefix("header/") {
        let mut parts = rest.splitn(2, '/');
        let name = parts.next()?;
        let values = response.headers.get(name)?;
        return match parts.next() {
            Some(index_str) => {
                let index: usize = index_str.parse().ok()?;
                values.get(index).cloned().map(Value::from)
            }
            None => values.first().cloned().map(Value::from),
        };
    }
    let body = response.structured_body()?;
    jsonpointer::resolve(body, field).cloned()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Binds a step's request template using this target's prior extractions,
/// by operation-specific parameter if known, falling back to the first
/// unbound path parameter (the same simplification chain discovery applies
/// when it cannot yet know the real request shape at the time it templates
/// a step).
fn bind_step(request_template: &RequestCase, link_source: Option<&LinkSource>, env: &BTreeMap<usize, BTreeMap<String, Value>>) -> RequestCase {
    let mut request = request_template.clone();
    match link_source {
        Some(LinkSource::Single { step, field }) => {
            if let Some(value) = env.get(step).and_then(|fields| fields.get(field)) {
                if let Some(param_name) = request.path_params.keys().next().cloned() {
                    request.set_path_param(param_name, value_to_string(value));
                }
            }
        }
        Some(LinkSource::Multiple { step, parameters }) => {
            if let Some(fields) = env.get(step) {
                for (param_name, field) in parameters {
                    let Some(value) = fields.get(field) else { continue };
                    if request.path_params.contains_key(param_name) {
                        request.set_path_param(param_name.clone(), value_to_string(value));
                    } else {
                        request.add_query_param(param_name, value_to_string(value));
                    }
                }
            }
        }
        None => {}
    }
    request
}

fn fields_needed_from_step(chain: &ChainCase, source_step: usize) -> Vec<String> {
    let mut fields = Vec::new();
    for step in &chain.steps {
        match &step.link_source {
            Some(LinkSource::Single { step: s, field }) if *s == source_step => fields.push(field.clone()),
            Some(LinkSource::Multiple { step: s, parameters }) if *s == source_step => {
                fields.extend(parameters.values().cloned());
            }
            _ => {}
        }
    }
    fields
}

pub struct Executor {
    target_a: TargetClient,
    target_b: TargetClient,
    rate_limiter: RateLimiter,
    retry: RetryConfig,
    operation_timeouts: BTreeMap<String, Duration>,
    secret_ctx: SecretContext,
}

impl Executor {
    #[must_use]
    pub fn new(target_a: TargetClient, target_b: TargetClient, rate_limiter: RateLimiter, retry: RetryConfig, secret_ctx: SecretContext) -> Self {
        Self {
            target_a,
            target_b,
            rate_limiter,
            retry,
            operation_timeouts: BTreeMap::new(),
            secret_ctx,
        }
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, operation_id: impl Into<String>, timeout: Duration) -> Self {
        self.operation_timeouts.insert(operation_id.into(), timeout);
        self
    }

    /// Issues `request` to both targets in sequence, gated by the shared
    /// rate limiter, recording each send's timing independently.
    pub async fn execute(&self, request: &RequestCase) -> (ResponseCase, ResponseCase) {
        let timeout = self.timeout_for(&request.operation_id);
        self.rate_limiter.wait_turn().await;
        let response_a = self.target_a.send(request, &self.retry, timeout, Some(&self.secret_ctx)).await;
        self.rate_limiter.wait_turn().await;
        let response_b = self.target_b.send(request, &self.retry, timeout, Some(&self.secret_ctx)).await;
        (response_a, response_b)
    }

    /// Walks `chain`, maintaining two independent variable environments (one
    /// per target), calling `on_step` after every step's pair of responses;
    /// stops early the moment `on_step` returns `false`.
    pub async fn execute_chain<F>(&self, chain: &ChainCase, mut on_step: F) -> (ChainExecution, ChainExecution)
    where
        F: FnMut(&ResponseCase, &ResponseCase) -> bool,
    {
        let mut execution_a = ChainExecution::new();
        let mut execution_b = ChainExecution::new();
        let mut env_a: BTreeMap<usize, BTreeMap<String, Value>> = BTreeMap::new();
        let mut env_b: BTreeMap<usize, BTreeMap<String, Value>> = BTreeMap::new();

        for (index, step) in chain.steps.iter().enumerate() {
            let request_a = bind_step(&step.request_template, step.link_source.as_ref(), &env_a);
            let request_b = bind_step(&step.request_template, step.link_source.as_ref(), &env_b);

            let timeout = self.timeout_for(&request_a.operation_id);
            let (response_a, response_b) = {
                self.rate_limiter.wait_turn().await;
                let response_a = self.target_a.send(&request_a, &self.retry, timeout, Some(&self.secret_ctx)).await;
                self.rate_limiter.wait_turn().await;
                let response_b = self.target_b.send(&request_b, &self.retry, timeout, Some(&self.secret_ctx)).await;
                (response_a, response_b)
            };

            let needed = fields_needed_from_step(chain, index);
            let extracted_a: BTreeMap<String, Value> = needed
                .iter()
                .filter_map(|field| extract_field(&response_a, field).map(|v| (field.clone(), v)))
                .collect();
            let extracted_b: BTreeMap<String, Value> = needed
                .iter()
                .filter_map(|field| extract_field(&response_b, field).map(|v| (field.clone(), v)))
                .collect();

            let should_continue = on_step(&response_a, &response_b);

            execution_a.steps.push(ChainStepExecution {
                request: request_a,
                response: response_a,
                extracted: extracted_a.clone(),
            });
            execution_b.steps.push(ChainStepExecution {
                request: request_b,
                response: response_b,
                extracted: extracted_b.clone(),
            });

            env_a.insert(index, extracted_a);
            env_b.insert(index, extracted_b);

            if !should_continue {
                break;
            }
        }

        (execution_a, execution_b)
    }

    #[must_use]
    pub fn timeout_for(&self, operation_id: &str) -> Option<Duration> {
        self.operation_timeouts.get(operation_id).copied()
    }
}
