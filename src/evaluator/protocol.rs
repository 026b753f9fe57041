//! Wire protocol for the evaluator subprocess (§4.1).
//!
//! Newline-delimited JSON over stdin/stdout. One request is outstanding at a
//! time; the `id` field lets the caller detect accidental interleaving.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    pub id: String,
    pub expr: String,
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResponse {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalResponse {
    #[must_use]
    pub fn ok(id: impl Into<String>, result: bool) -> Self {
        Self {
            id: id.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_response_ok_round_trips_through_json() {
        let resp = EvalResponse::ok("42", true);
        let line = serde_json::to_string(&resp).unwrap();
        let parsed: EvalResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.id, "42");
        assert_eq!(parsed.result, Some(true));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn eval_response_err_omits_result_field() {
        let resp = EvalResponse::err("1", "boom");
        let line = serde_json::to_string(&resp).unwrap();
        assert!(!line.contains("\"result\""));
    }
}
