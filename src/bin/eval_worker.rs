//! Subprocess entry point for the expression evaluator (§4.1).
//!
//! Reads newline-delimited [`EvalRequest`] JSON from stdin, evaluates each
//! expression against its bound variables, and writes a newline-delimited
//! [`EvalResponse`] to stdout. Compiled programs are cached by
//! `(expr, sorted variable names)` so a chain rule re-evaluated across many
//! cases only pays the parse cost once.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;

use parity_fuzz::evaluator::engine::{self, Expr};
use parity_fuzz::evaluator::protocol::{EvalRequest, EvalResponse, Handshake};

const CACHE_CAPACITY: usize = parity_fuzz::constants::DEFAULT_EVALUATOR_CACHE_CAPACITY;
const EVAL_TIMEOUT: Duration = Duration::from_secs(parity_fuzz::constants::DEFAULT_EVALUATOR_INWORKER_TIMEOUT_SECS);

fn cache_key(req: &EvalRequest) -> String {
    let mut names: Vec<&str> = req.data.keys().map(String::as_str).collect();
    names.sort_unstable();
    format!("{}\0{}", req.expr, names.join(","))
}

fn main() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let handshake = serde_json::to_string(&Handshake { ready: true }).expect("handshake always serializes");
    writeln!(stdout, "{handshake}").expect("stdout write failed at startup");
    stdout.flush().expect("stdout flush failed at startup");

    let mut cache: HashMap<String, Expr> = HashMap::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: EvalRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = EvalResponse::err("unknown", format!("malformed request: {e}"));
                emit(&mut stdout, &response);
                continue;
            }
        };

        let response = handle_request(&request, &mut cache);
        emit(&mut stdout, &response);
    }
}

fn handle_request(request: &EvalRequest, cache: &mut HashMap<String, Expr>) -> EvalResponse {
    let key = cache_key(request);
    let compiled = if let Some(expr) = cache.get(&key) {
        Ok(expr.clone())
    } else {
        engine::compile(&request.expr)
    };

    let expr = match compiled {
        Ok(expr) => expr,
        Err(e) => return EvalResponse::err(request.id.clone(), format!("compile error: {e}")),
    };

    if !cache.contains_key(&key) {
        if cache.len() >= CACHE_CAPACITY {
            // Silent drop: a full cache just means this expression re-parses
            // next time; correctness is unaffected.
        } else {
            cache.insert(key, expr.clone());
        }
    }

    match evaluate_with_deadline(expr, request.data.clone()) {
        Ok(result) => EvalResponse::ok(request.id.clone(), result),
        Err(e) => EvalResponse::err(request.id.clone(), e),
    }
}

/// Runs `engine::evaluate` on a dedicated thread and bounds it to
/// [`EVAL_TIMEOUT`]: a pathological expression (or a future builtin that
/// doesn't terminate promptly) times out here rather than stalling the
/// whole worker, which the caller would otherwise only notice after its own
/// much longer round-trip timeout.
fn evaluate_with_deadline(expr: Expr, data: BTreeMap<String, Value>) -> Result<bool, String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(engine::evaluate(&expr, &data));
    });
    match rx.recv_timeout(EVAL_TIMEOUT) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(format!("evaluation exceeded the {}s in-worker timeout", EVAL_TIMEOUT.as_secs()))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err("evaluation thread panicked".to_string()),
    }
}

fn emit(stdout: &mut impl Write, response: &EvalResponse) {
    let line = serde_json::to_string(response).unwrap_or_else(|_| {
        serde_json::to_string(&EvalResponse::err(&response.id, "failed to serialize response"))
            .expect("fallback response always serializes")
    });
    if writeln!(stdout, "{line}").is_err() {
        std::process::exit(1);
    }
    let _ = stdout.flush();
}
