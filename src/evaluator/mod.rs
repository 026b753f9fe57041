//! Client side of the expression evaluator subprocess boundary (§4.1, §9).
//!
//! The evaluator runs as a second binary (`eval-worker`) built from the same
//! crate, spoken to over newline-delimited JSON on its stdin/stdout. Keeping
//! it a genuine child process (rather than an in-process function call)
//! preserves the crash isolation the design calls for: a malformed
//! expression or an evaluator-side panic takes down the worker, not the run.

pub mod engine;
pub mod protocol;

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::error::Error;
use protocol::{EvalRequest, EvalResponse, Handshake};

const CALLER_TIMEOUT: Duration = Duration::from_secs(crate::constants::DEFAULT_EVALUATOR_CALLER_TIMEOUT_SECS);
const MAX_RESTARTS: u32 = crate::constants::DEFAULT_EVALUATOR_MAX_RESTARTS;
const CACHE_CAPACITY: usize = crate::constants::DEFAULT_EVALUATOR_CACHE_CAPACITY;

fn cache_key(expr: &str, data: &BTreeMap<String, Value>) -> String {
    let mut names: Vec<&str> = data.keys().map(String::as_str).collect();
    names.sort_unstable();
    format!("{expr}\0{}", names.join(","))
}

struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Worker {
    async fn spawn(binary_path: &std::path::Path) -> Result<Self, Error> {
        let mut child = Command::new(binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::evaluator_crashed(format!("failed to spawn eval-worker: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::evaluator_crashed("eval-worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::evaluator_crashed("eval-worker stdout unavailable"))?;
        let mut stdout = BufReader::new(stdout);

        let mut line = String::new();
        let n = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| Error::evaluator_crashed(format!("failed reading handshake: {e}")))?;
        if n == 0 {
            return Err(Error::evaluator_crashed("eval-worker exited before handshake"));
        }
        let handshake: Handshake = serde_json::from_str(line.trim())
            .map_err(|e| Error::evaluator_crashed(format!("malformed handshake: {e}")))?;
        if !handshake.ready {
            return Err(Error::evaluator_crashed("eval-worker reported not ready"));
        }

        Ok(Self { child, stdin, stdout })
    }

    async fn send_receive(&mut self, request: &EvalRequest, worker_timeout: Duration) -> Result<EvalResponse, Error> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::evaluator_crashed(format!("write to eval-worker failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::evaluator_crashed(format!("flush to eval-worker failed: {e}")))?;

        let mut response_line = String::new();
        let read = timeout(worker_timeout, self.stdout.read_line(&mut response_line))
            .await
            .map_err(|_| Error::evaluator_crashed("eval-worker timed out"))?
            .map_err(|e| Error::evaluator_crashed(format!("read from eval-worker failed: {e}")))?;
        if read == 0 {
            return Err(Error::evaluator_crashed("eval-worker closed stdout (EOF)"));
        }
        let response: EvalResponse = serde_json::from_str(response_line.trim())
            .map_err(|e| Error::evaluator_crashed(format!("malformed eval-worker response: {e}")))?;
        if response.id != request.id {
            return Err(Error::evaluator_response_mismatch(&request.id, &response.id));
        }
        Ok(response)
    }

    async fn shut_down(mut self) {
        drop(self.stdin);
        if timeout(Duration::from_millis(500), self.child.wait()).await.is_ok() {
            return;
        }
        let _ = self.child.start_kill();
        let _ = timeout(Duration::from_millis(500), self.child.wait()).await;
    }
}

/// Manages the evaluator subprocess lifecycle: spawn-on-demand, bounded
/// restart on crash, and a cache of recently-seen `(expr, variable set)`
/// pairs so repeated rule evaluation doesn't pay a round trip per case.
///
/// The client does not cache *compiled programs* in this process — the
/// worker process holds the program cache (§4.1) — this struct only tracks
/// which `(expr, vars)` keys have been seen, for diagnostics and to bound
/// memory if a future worker implementation wants client-side caching too.
pub struct EvaluatorClient {
    binary_path: std::path::PathBuf,
    worker: Mutex<Option<Worker>>,
    worker_timeout: Duration,
    consecutive_failures: AtomicU64,
    seen: Mutex<indexmap::IndexSet<String>>,
}

impl EvaluatorClient {
    #[must_use]
    pub fn new(binary_path: std::path::PathBuf) -> Self {
        Self {
            binary_path,
            worker: Mutex::new(None),
            worker_timeout: Duration::from_secs(crate::constants::DEFAULT_EVALUATOR_ROUND_TRIP_TIMEOUT_SECS),
            consecutive_failures: AtomicU64::new(0),
            seen: Mutex::new(indexmap::IndexSet::new()),
        }
    }

    /// Evaluates `expr` with the given variable bindings, spawning the
    /// worker on first use and transparently restarting it (up to a bounded
    /// number of consecutive failures) if it crashes mid-run.
    ///
    /// # Errors
    ///
    /// Returns `Error::Evaluator` if the expression fails to parse/evaluate,
    /// or if the worker cannot be kept alive after exhausting restarts.
    pub async fn evaluate(&self, expr: &str, data: BTreeMap<String, Value>) -> Result<bool, Error> {
        {
            let mut seen = self.seen.lock().await;
            let key = cache_key(expr, &data);
            if seen.len() >= CACHE_CAPACITY && !seen.contains(&key) {
                // Silent drop: capacity is a memory bound, not correctness-critical.
            } else {
                seen.insert(key);
            }
        }

        let request = EvalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            expr: expr.to_string(),
            data,
        };

        let outer = timeout(CALLER_TIMEOUT, self.evaluate_with_restart(&request));
        match outer.await {
            Ok(result) => result,
            Err(_) => Err(Error::evaluator_crashed(format!(
                "evaluator call for expression '{expr}' exceeded the caller timeout"
            ))),
        }
    }

    async fn evaluate_with_restart(&self, request: &EvalRequest) -> Result<bool, Error> {
        loop {
            let mut guard = self.worker.lock().await;
            if guard.is_none() {
                *guard = Some(Worker::spawn(&self.binary_path).await?);
            }
            let worker = guard.as_mut().expect("just populated");
            match worker.send_receive(request, self.worker_timeout).await {
                Ok(response) if response.ok => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    return Ok(response.result.unwrap_or(false));
                }
                Ok(response) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    return Err(Error::evaluator_crashed(format!(
                        "expression '{}' failed to evaluate: {}",
                        request.expr,
                        response.error.unwrap_or_default()
                    )));
                }
                Err(_) => {
                    let dead = guard.take().expect("checked Some above");
                    drop(guard);
                    dead.shut_down().await;
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures as u32 >= MAX_RESTARTS {
                        return Err(Error::evaluator_restart_exhausted(failures as u32));
                    }
                }
            }
        }
    }

    /// Terminates the worker process, if any is running.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.shut_down().await;
        }
    }
}
