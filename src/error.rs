//! The crate's single error type.
//!
//! Every fallible operation in the engine returns `Result<T, Error>`. External
//! error types are wrapped via `#[from]`; everything specific to this crate
//! goes through the `Internal` variant so that call sites read as named intent
//! (`Error::unknown_predefined(...)`) rather than ad-hoc string formatting.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Broad category for an internal error, used for machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Specification,
    RuleEvaluation,
    Transport,
    Evaluator,
    BundleLoad,
    Replay,
    Runtime,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Specification => "specification",
            Self::RuleEvaluation => "rule_evaluation",
            Self::Transport => "transport",
            Self::Evaluator => "evaluator",
            Self::BundleLoad => "bundle_load",
            Self::Replay => "replay",
            Self::Runtime => "runtime",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra detail attached to an `Error::Internal`.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub details: Option<Value>,
    pub suggestion: Option<Cow<'static, str>>,
}

impl ErrorContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<Cow<'static, str>>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct JsonError {
    pub error_type: String,
    pub message: String,
    pub suggestion: Option<String>,
    pub details: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Internal {
        kind: ErrorKind,
        message: Cow<'static, str>,
        context: Option<ErrorContext>,
    },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    fn internal(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal {
            kind,
            message: message.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(self, suggestion: impl Into<Cow<'static, str>>) -> Self {
        match self {
            Self::Internal {
                kind,
                message,
                context,
            } => {
                let ctx = context
                    .unwrap_or_default()
                    .with_suggestion(suggestion.into());
                Self::Internal {
                    kind,
                    message,
                    context: Some(ctx),
                }
            }
            other => other,
        }
    }

    #[must_use]
    pub fn with_details(self, details: Value) -> Self {
        match self {
            Self::Internal {
                kind,
                message,
                context,
            } => {
                let ctx = context.unwrap_or_default().with_details(details);
                Self::Internal {
                    kind,
                    message,
                    context: Some(ctx),
                }
            }
            other => other,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Internal { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> JsonError {
        let (error_type, suggestion, details) = match self {
            Self::Internal { kind, context, .. } => (
                kind.as_str().to_string(),
                context
                    .as_ref()
                    .and_then(|c| c.suggestion.clone())
                    .map(Cow::into_owned),
                context.as_ref().and_then(|c| c.details.clone()),
            ),
            Self::Io(_) => ("io".to_string(), None, None),
            Self::Network(_) => ("network".to_string(), None, None),
            Self::Yaml(_) => ("yaml".to_string(), None, None),
            Self::Json(_) => ("json".to_string(), None, None),
            Self::Anyhow(_) => ("unexpected".to_string(), None, None),
        };
        JsonError {
            error_type,
            message: self.to_string(),
            suggestion,
            details,
        }
    }

    // --- Configuration errors -------------------------------------------------

    #[must_use]
    pub fn invalid_config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::internal(ErrorKind::Configuration, message)
    }

    #[must_use]
    pub fn unresolved_env_var(name: &str) -> Self {
        Self::internal(
            ErrorKind::Configuration,
            format!("environment variable '{name}' referenced in config is not set"),
        )
    }

    #[must_use]
    pub fn unknown_predefined(name: &str) -> Self {
        Self::internal(
            ErrorKind::Configuration,
            format!("unknown predefined rule '{name}'"),
        )
    }

    #[must_use]
    pub fn missing_rule_parameter(predefined: &str, param: &str) -> Self {
        Self::internal(
            ErrorKind::Configuration,
            format!("predefined rule '{predefined}' is missing required parameter '{param}'"),
        )
    }

    #[must_use]
    pub fn unknown_target(name: &str) -> Self {
        Self::internal(ErrorKind::Configuration, format!("unknown target '{name}'"))
    }

    // --- Specification errors --------------------------------------------------

    #[must_use]
    pub fn invalid_spec(message: impl Into<Cow<'static, str>>) -> Self {
        Self::internal(ErrorKind::Specification, message)
    }

    #[must_use]
    pub fn operation_not_found(operation_id: &str) -> Self {
        Self::internal(
            ErrorKind::Specification,
            format!("operation '{operation_id}' not found in specification"),
        )
    }

    // --- Rule evaluation errors --------------------------------------------------

    #[must_use]
    pub fn invalid_jsonpath(path: &str, reason: &str) -> Self {
        Self::internal(
            ErrorKind::RuleEvaluation,
            format!("invalid JSONPath '{path}': {reason}"),
        )
    }

    // --- Evaluator subprocess errors --------------------------------------------------

    #[must_use]
    pub fn evaluator_crashed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::internal(ErrorKind::Evaluator, reason)
    }

    #[must_use]
    pub fn evaluator_restart_exhausted(attempts: u32) -> Self {
        Self::internal(
            ErrorKind::Evaluator,
            format!("evaluator subprocess failed to recover after {attempts} restart attempts"),
        )
    }

    #[must_use]
    pub fn evaluator_response_mismatch(expected: &str, got: &str) -> Self {
        Self::internal(
            ErrorKind::Evaluator,
            format!("evaluator response id mismatch: expected '{expected}', got '{got}'"),
        )
    }

    // --- Bundle load errors --------------------------------------------------

    #[must_use]
    pub fn bundle_load_error(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::internal(
            ErrorKind::BundleLoad,
            format!("failed to load bundle at '{path}': {reason}"),
        )
    }

    #[must_use]
    pub fn bundle_missing_file(path: impl fmt::Display, file: &str) -> Self {
        Self::internal(
            ErrorKind::BundleLoad,
            format!("bundle at '{path}' is missing required file '{file}'"),
        )
    }

    // --- Transport errors --------------------------------------------------

    #[must_use]
    pub fn transport_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::internal(ErrorKind::Transport, message)
    }

    #[must_use]
    pub fn retry_limit_exceeded(attempts: u32, last_error: impl fmt::Display) -> Self {
        Self::internal(
            ErrorKind::Transport,
            format!("request failed after {attempts} attempts: {last_error}"),
        )
    }

    // --- Runtime errors --------------------------------------------------

    #[must_use]
    pub fn invalid_path(message: impl Into<Cow<'static, str>>) -> Self {
        Self::internal(ErrorKind::Runtime, message)
    }

    #[must_use]
    pub fn runtime(message: impl Into<Cow<'static, str>>) -> Self {
        Self::internal(ErrorKind::Runtime, message)
    }

    #[must_use]
    pub fn interrupted() -> Self {
        Self::internal(ErrorKind::Runtime, "run interrupted by signal")
    }
}
