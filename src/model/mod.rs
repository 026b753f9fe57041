//! Request/response/chain data model (§3).
//!
//! These types enforce the spec's invariants at construction time: invalid
//! shapes (both structured and binary body set, a path placeholder with no
//! bound parameter) are a program error caught by `debug_assert!` plus a
//! fallible constructor for the one case a caller can get wrong at runtime
//! (bodies).

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

/// An ordered multi-map: each key may carry more than one value, and
/// insertion order is preserved for stable bundle serialization.
pub type MultiMap = IndexMap<String, Vec<String>>;

fn lowercase_multimap_key(map: &mut MultiMap, key: &str, value: String) {
    let lower = key.to_lowercase();
    map.entry(lower).or_default().push(value);
}

/// Either a structured JSON body or a base64-encoded binary body, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Structured(Value),
    Binary(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

/// A single HTTP request, identified by a fresh id and the operation it targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCase {
    pub id: Uuid,
    pub operation_id: String,
    pub method: Method,
    /// Path template with `{name}` placeholders, e.g. `/users/{id}`.
    pub path_template: String,
    pub path_params: BTreeMap<String, String>,
    /// Derived from `path_template` + `path_params`; recomputed by `bind_path`.
    pub rendered_path: String,
    #[serde(default)]
    pub query_params: MultiMap,
    #[serde(default)]
    pub headers: MultiMap,
    pub body: Option<Body>,
    pub media_type: Option<String>,
}

impl RequestCase {
    #[must_use]
    pub fn new(operation_id: impl Into<String>, method: Method, path_template: impl Into<String>) -> Self {
        let path_template = path_template.into();
        Self {
            id: Uuid::new_v4(),
            operation_id: operation_id.into(),
            method,
            rendered_path: path_template.clone(),
            path_template,
            path_params: BTreeMap::new(),
            query_params: MultiMap::new(),
            headers: MultiMap::new(),
            body: None,
            media_type: None,
        }
    }

    pub fn set_path_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_params.insert(name.into(), value.into());
        self.render_path();
    }

    pub fn add_query_param(&mut self, name: &str, value: impl Into<String>) {
        lowercase_multimap_key(&mut self.query_params, name, value.into());
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        lowercase_multimap_key(&mut self.headers, name, value.into());
    }

    /// Recomputes `rendered_path` from `path_template` and `path_params`.
    pub fn render_path(&mut self) {
        let mut rendered = self.path_template.clone();
        for (name, value) in &self.path_params {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        self.rendered_path = rendered;
    }

    /// Returns the set of `{name}` placeholders still unbound in the path template.
    #[must_use]
    pub fn unbound_placeholders(&self) -> Vec<String> {
        extract_placeholders(&self.path_template)
            .into_iter()
            .filter(|p| !self.path_params.contains_key(p))
            .collect()
    }

    /// Validates the invariant that every placeholder is bound before execution.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unbound placeholder.
    pub fn validate_bound(&self) -> Result<(), Error> {
        let unbound = self.unbound_placeholders();
        if let Some(name) = unbound.first() {
            return Err(Error::invalid_path(format!(
                "path parameter '{name}' is not bound for operation '{}'",
                self.operation_id
            )));
        }
        Ok(())
    }
}

fn extract_placeholders(template: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '{' {
            if let Some(end) = template[i..].find('}') {
                result.push(template[i + 1..i + end].to_string());
            }
        }
    }
    result
}

/// The response half of one HTTP exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCase {
    pub status_code: u16,
    #[serde(default)]
    pub headers: MultiMap,
    pub body: Option<Body>,
    pub elapsed_ms: u64,
    pub protocol_version: String,
    pub error: Option<String>,
}

impl ResponseCase {
    #[must_use]
    pub fn transport_error(error: impl Into<String>) -> Self {
        Self {
            status_code: 0,
            headers: MultiMap::new(),
            body: None,
            elapsed_ms: 0,
            protocol_version: String::new(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_infrastructure_skip(&self) -> bool {
        self.status_code == 0 && self.error.is_some()
    }

    /// Looks up a header case-insensitively, returning only the first value.
    #[must_use]
    pub fn header_first(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn structured_body(&self) -> Option<&Value> {
        match &self.body {
            Some(Body::Structured(v)) => Some(v),
            _ => None,
        }
    }
}

/// Which prior step (and which of its response fields) supplied a parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkSource {
    Single { step: usize, field: String },
    Multiple {
        step: usize,
        parameters: BTreeMap<String, String>,
    },
}

impl LinkSource {
    #[must_use]
    pub fn source_step(&self) -> usize {
        match self {
            Self::Single { step, .. } => *step,
            Self::Multiple { step, .. } => *step,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    pub request_template: RequestCase,
    pub link_source: Option<LinkSource>,
}

impl ChainStep {
    #[must_use]
    pub fn is_entry_point(&self) -> bool {
        self.link_source.is_none()
    }
}

/// A reusable plan for a sequence of linked requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainCase {
    pub id: Uuid,
    pub steps: Vec<ChainStep>,
}

impl ChainCase {
    #[must_use]
    pub fn new(steps: Vec<ChainStep>) -> Self {
        Self {
            id: Uuid::new_v4(),
            steps,
        }
    }

    /// A deterministic operation-id signature used to deduplicate chains
    /// found during coverage-guided exploration.
    #[must_use]
    pub fn signature(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.request_template.operation_id.as_str())
            .collect::<Vec<_>>()
            .join(">")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStepExecution {
    pub request: RequestCase,
    pub response: ResponseCase,
    /// Values extracted from `response` for downstream steps.
    pub extracted: BTreeMap<String, Value>,
}

/// A per-target record of one chain template actually running.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainExecution {
    pub steps: Vec<ChainStepExecution>,
}

impl ChainExecution {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
